//! `/api/inventory` (spec.md §4.2, §6): listing scoped by inventory type
//! (`check_type_permission`) and per-object reads (`check_inventory_permission`),
//! plus object creation/tagging for admins.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use uuid::Uuid;

use clm_authz::inventory::{check_inventory_permission, check_type_permission};
use clm_domain::model::InventoryObject;

use crate::api::admin::guard::AdminGuard;
use crate::api::auth::MaybeUser;
use crate::error::{api_error, ApiError};
use crate::state::AppState;

pub async fn list_types(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "types": state.store.inventory_types.list() }))
}

pub async fn list_objects(State(state): State<AppState>, user: MaybeUser, Path(type_slug): Path<String>) -> Response {
    let allowed = match user.0 {
        None => true,
        Some(uid) => check_type_permission(&state.store, &state.perm_cache, uid, &type_slug, "view"),
    };
    if !allowed {
        return api_error(StatusCode::FORBIDDEN, "not authorized to view this inventory type");
    }
    let Some(inv_type) = state.store.inventory_types.list().into_iter().find(|t| t.slug == type_slug) else {
        return api_error(StatusCode::NOT_FOUND, format!("inventory type '{type_slug}' not found"));
    };
    let objects: Vec<_> = state
        .store
        .inventory_objects
        .list()
        .into_iter()
        .filter(|o| o.type_id == inv_type.id)
        .collect();
    Json(serde_json::json!({ "objects": objects })).into_response()
}

pub async fn get_object(State(state): State<AppState>, user: MaybeUser, Path(id): Path<Uuid>) -> Response {
    let Some(object) = state.store.inventory_objects.get(&id) else {
        return api_error(StatusCode::NOT_FOUND, format!("inventory object {id} not found"));
    };
    let allowed = match user.0 {
        None => true,
        Some(uid) => check_inventory_permission(&state.store, &state.perm_cache, uid, id, "view"),
    };
    if !allowed {
        return api_error(StatusCode::FORBIDDEN, "not authorized to view this object");
    }
    Json(serde_json::json!({ "object": object })).into_response()
}

#[derive(Debug, Deserialize)]
pub struct CreateObjectRequest {
    pub type_id: Uuid,
    pub data: serde_json::Value,
    #[serde(default)]
    pub search_text: String,
    #[serde(default)]
    pub tag_ids: Vec<Uuid>,
}

pub async fn create_object(
    _guard: AdminGuard,
    State(state): State<AppState>,
    user: MaybeUser,
    Json(req): Json<CreateObjectRequest>,
) -> Response {
    if state.store.inventory_types.get(&req.type_id).is_none() {
        return api_error(StatusCode::BAD_REQUEST, format!("inventory type {} not found", req.type_id));
    }
    let object = InventoryObject {
        id: Uuid::new_v4(),
        type_id: req.type_id,
        data: req.data,
        search_text: req.search_text,
        tag_ids: req.tag_ids,
        created_at: chrono::Utc::now(),
    };
    let (user_id, username) = match user.0 {
        None => (None, None),
        Some(uid) => (Some(uid), state.store.users.get(&uid).map(|u| u.username)),
    };
    let result = state.store.transaction(|store| {
        store.inventory_objects.insert(object.id, object.clone())?;
        clm_store::audit::log_action(
            &store.audit_log,
            user_id,
            username.clone(),
            "inventory.create_object",
            Some(format!("inventory_object:{}", object.id)),
            Some(serde_json::json!({ "type_id": object.type_id })),
            None,
        )?;
        Ok(object.clone())
    });
    match result {
        Ok(object) => Json(serde_json::json!({ "object": object })).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

pub async fn delete_object(
    _guard: AdminGuard,
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<Uuid>,
) -> Response {
    let (user_id, username) = match user.0 {
        None => (None, None),
        Some(uid) => (Some(uid), state.store.users.get(&uid).map(|u| u.username)),
    };
    let result = state.store.transaction(|store| {
        let removed = store.inventory_objects.remove(&id)?;
        if removed.is_none() {
            return Ok(false);
        }
        clm_store::audit::log_action(
            &store.audit_log,
            user_id,
            username.clone(),
            "inventory.delete_object",
            Some(format!("inventory_object:{id}")),
            None,
            None,
        )?;
        Ok(true)
    });
    match result {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => api_error(StatusCode::NOT_FOUND, format!("inventory object {id} not found")),
        Err(e) => ApiError(e).into_response(),
    }
}
