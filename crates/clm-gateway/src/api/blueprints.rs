//! `/api/blueprints` (spec.md §4.4, §6): CRUD over [`Blueprint`] rows, plus
//! deploy (kick off a [`clm_blueprint`] sequential rollout) and deployment
//! status lookup.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use uuid::Uuid;

use clm_domain::model::{Blueprint, BlueprintServiceEntry};

use crate::api::auth::MaybeUser;
use crate::error::{api_error, ApiError};
use crate::state::AppState;

fn can_manage(state: &AppState, user: MaybeUser) -> bool {
    match user.0 {
        None => true,
        Some(uid) => clm_authz::has_permission(&state.store, &state.perm_cache, uid, "blueprints.manage")
            || crate::api::auth::is_super_admin(state, uid),
    }
}

fn requester(state: &AppState, user: MaybeUser) -> (Option<Uuid>, Option<String>) {
    match user.0 {
        None => (None, None),
        Some(uid) => (Some(uid), state.store.users.get(&uid).map(|u| u.username)),
    }
}

pub async fn list_blueprints(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "blueprints": state.store.blueprints.list() }))
}

pub async fn get_blueprint(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.store.blueprints.get(&id) {
        Some(b) => Json(serde_json::json!({ "blueprint": b })).into_response(),
        None => api_error(StatusCode::NOT_FOUND, format!("blueprint {id} not found")),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateBlueprintRequest {
    pub name: String,
    pub services: Vec<BlueprintServiceEntry>,
}

pub async fn create_blueprint(
    State(state): State<AppState>,
    user: MaybeUser,
    Json(req): Json<CreateBlueprintRequest>,
) -> Response {
    if !can_manage(&state, user) {
        return api_error(StatusCode::FORBIDDEN, "not authorized to manage blueprints");
    }
    let blueprint = Blueprint {
        id: Uuid::new_v4(),
        name: req.name,
        services: req.services,
    };
    let (user_id, username) = requester(&state, user);
    let result = state.store.transaction(|store| {
        store.blueprints.insert(blueprint.id, blueprint.clone())?;
        clm_store::audit::log_action(
            &store.audit_log,
            user_id,
            username.clone(),
            "blueprint.create",
            Some(format!("blueprint:{}", blueprint.id)),
            Some(serde_json::json!({ "name": blueprint.name })),
            None,
        )?;
        Ok(blueprint.clone())
    });
    match result {
        Ok(blueprint) => Json(serde_json::json!({ "blueprint": blueprint })).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

pub async fn delete_blueprint(State(state): State<AppState>, user: MaybeUser, Path(id): Path<Uuid>) -> Response {
    if !can_manage(&state, user) {
        return api_error(StatusCode::FORBIDDEN, "not authorized to manage blueprints");
    }
    let (user_id, username) = requester(&state, user);
    let result = state.store.transaction(|store| {
        let removed = store.blueprints.remove(&id)?;
        if removed.is_none() {
            return Ok(false);
        }
        clm_store::audit::log_action(
            &store.audit_log,
            user_id,
            username.clone(),
            "blueprint.delete",
            Some(format!("blueprint:{id}")),
            None,
            None,
        )?;
        Ok(true)
    });
    match result {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => api_error(StatusCode::NOT_FOUND, format!("blueprint {id} not found")),
        Err(e) => ApiError(e).into_response(),
    }
}

pub async fn deploy(State(state): State<AppState>, user: MaybeUser, Path(id): Path<Uuid>) -> Response {
    if !can_manage(&state, user) {
        return api_error(StatusCode::FORBIDDEN, "not authorized to deploy blueprints");
    }
    let (user_id, username) = requester(&state, user);
    let result = state.store.transaction(|store| {
        let deployment_id = clm_blueprint::start_deployment(state.store.clone(), state.runner.clone(), id, user_id)?;
        clm_store::audit::log_action(
            &store.audit_log,
            user_id,
            username.clone(),
            "blueprint.deploy",
            Some(format!("blueprint:{id}")),
            Some(serde_json::json!({ "deployment_id": deployment_id })),
            None,
        )?;
        Ok(deployment_id)
    });
    match result {
        Ok(deployment_id) => Json(serde_json::json!({ "deployment_id": deployment_id })).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

pub async fn get_deployment(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match clm_blueprint::get_deployment(&state.store, id) {
        Some(deployment) => Json(serde_json::json!({ "deployment": deployment })).into_response(),
        None => api_error(StatusCode::NOT_FOUND, format!("deployment {id} not found")),
    }
}
