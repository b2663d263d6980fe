//! `/api/roles` (spec.md §4.2, §6): CRUD over [`Role`] rows. System roles
//! (`super-admin`) are immutable — no rename, no delete — mirroring
//! `Role::is_system`'s own doc comment.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use uuid::Uuid;

use clm_domain::model::Role;

use crate::api::admin::guard::AdminGuard;
use crate::api::auth::MaybeUser;
use crate::error::{api_error, ApiError};
use crate::state::AppState;

fn requester(state: &AppState, user: MaybeUser) -> (Option<Uuid>, Option<String>) {
    match user.0 {
        None => (None, None),
        Some(uid) => (Some(uid), state.store.users.get(&uid).map(|u| u.username)),
    }
}

pub async fn list_roles(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "roles": state.store.roles.list() }))
}

pub async fn get_role(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.store.roles.get(&id) {
        Some(r) => Json(serde_json::json!({ "role": r })).into_response(),
        None => api_error(StatusCode::NOT_FOUND, format!("role {id} not found")),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateRoleRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permission_codenames: Vec<String>,
}

pub async fn create_role(
    _guard: AdminGuard,
    State(state): State<AppState>,
    user: MaybeUser,
    Json(req): Json<CreateRoleRequest>,
) -> Response {
    let role = Role {
        id: Uuid::new_v4(),
        name: req.name,
        description: req.description,
        is_system: false,
        permission_codenames: req.permission_codenames,
    };
    let (user_id, username) = requester(&state, user);
    let result = state.store.transaction(|store| {
        store.roles.insert(role.id, role.clone())?;
        clm_store::audit::log_action(
            &store.audit_log,
            user_id,
            username.clone(),
            "role.create",
            Some(format!("role:{}", role.id)),
            Some(serde_json::json!({ "name": role.name })),
            None,
        )?;
        Ok(role.clone())
    });
    match result {
        Ok(role) => Json(serde_json::json!({ "role": role })).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub description: Option<String>,
    pub permission_codenames: Option<Vec<String>>,
}

pub async fn update_role(
    _guard: AdminGuard,
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRoleRequest>,
) -> Response {
    let Some(existing) = state.store.roles.get(&id) else {
        return api_error(StatusCode::NOT_FOUND, format!("role {id} not found"));
    };
    if existing.is_system {
        return api_error(StatusCode::FORBIDDEN, "system roles cannot be modified");
    }
    let (user_id, username) = requester(&state, user);
    let result = state.store.transaction(|store| {
        let found = store.roles.update(&id, |r| {
            if let Some(v) = req.description.clone() {
                r.description = v;
            }
            if let Some(v) = req.permission_codenames.clone() {
                r.permission_codenames = v;
            }
        })?;
        if !found {
            return Ok(None);
        }
        clm_store::audit::log_action(
            &store.audit_log,
            user_id,
            username.clone(),
            "role.update",
            Some(format!("role:{id}")),
            None,
            None,
        )?;
        Ok(store.roles.get(&id))
    });
    match result {
        Ok(Some(role)) => {
            state.perm_cache.invalidate_all();
            Json(serde_json::json!({ "role": role })).into_response()
        }
        Ok(None) => api_error(StatusCode::NOT_FOUND, format!("role {id} not found")),
        Err(e) => ApiError(e).into_response(),
    }
}

pub async fn delete_role(
    _guard: AdminGuard,
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<Uuid>,
) -> Response {
    let Some(existing) = state.store.roles.get(&id) else {
        return api_error(StatusCode::NOT_FOUND, format!("role {id} not found"));
    };
    if existing.is_system {
        return api_error(StatusCode::FORBIDDEN, "system roles cannot be deleted");
    }
    let (user_id, username) = requester(&state, user);
    let result = state.store.transaction(|store| {
        if store.users.list().iter().any(|u| u.role_ids.contains(&id)) {
            return Err(clm_domain::Error::Conflict("role is still assigned to one or more users".into()));
        }
        let removed = store.roles.remove(&id)?;
        if removed.is_none() {
            return Ok(false);
        }
        clm_store::audit::log_action(
            &store.audit_log,
            user_id,
            username.clone(),
            "role.delete",
            Some(format!("role:{id}")),
            None,
            None,
        )?;
        Ok(true)
    });
    match result {
        Ok(true) => {
            state.perm_cache.invalidate_all();
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => api_error(StatusCode::NOT_FOUND, format!("role {id} not found")),
        Err(e) => ApiError(e).into_response(),
    }
}
