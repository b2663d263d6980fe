//! `/api/services` (spec.md §6): deploy, run arbitrary script, stop, and
//! the bulk variants of deploy/stop. Grounded on `clm_jobs::JobRunner`'s
//! dispatch methods — each handler is a permission check plus a direct
//! call through, mirroring `jobs.rs`.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use clm_authz::service::{check_service_permission, check_service_script_permission, filter_services_for_user};

use crate::api::auth::MaybeUser;
use crate::error::{api_error, ApiError};
use crate::state::AppState;

fn authorized(state: &AppState, user: MaybeUser, service: &str, permission: &str) -> bool {
    match user.0 {
        None => true,
        Some(uid) => check_service_permission(&state.store, &state.perm_cache, uid, service, permission),
    }
}

fn script_authorized(state: &AppState, user: MaybeUser, service: &str, script: &str) -> bool {
    match user.0 {
        None => true,
        Some(uid) => check_service_script_permission(&state.store, &state.perm_cache, uid, service, script),
    }
}

fn requester(state: &AppState, user: MaybeUser) -> (Option<uuid::Uuid>, Option<String>) {
    match user.0 {
        None => (None, None),
        Some(uid) => (Some(uid), state.store.users.get(&uid).map(|u| u.username)),
    }
}

pub async fn list_services(State(state): State<AppState>, user: MaybeUser) -> impl IntoResponse {
    let names: Vec<String> = std::fs::read_dir(&state.config.store.services_dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .filter(|e| e.path().is_dir())
                .filter_map(|e| e.file_name().into_string().ok())
                .collect()
        })
        .unwrap_or_default();
    let visible = match user.0 {
        None => names,
        Some(uid) => filter_services_for_user(&state.store, &state.perm_cache, uid, &names),
    };
    Json(serde_json::json!({ "services": visible }))
}

#[derive(Debug, Deserialize, Default)]
pub struct DeployRequest {
    #[serde(default)]
    pub inputs: HashMap<String, String>,
}

pub async fn deploy(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(service): Path<String>,
    body: Option<Json<DeployRequest>>,
) -> Response {
    if !authorized(&state, user, &service, "deploy") {
        return api_error(StatusCode::FORBIDDEN, "not authorized to deploy this service");
    }
    let inputs = body.map(|Json(r)| r.inputs).unwrap_or_default();
    let (user_id, username) = requester(&state, user);
    let result = state.store.transaction(|store| {
        let job = state.runner.deploy_service(&service, user_id, username.clone(), inputs.clone())?;
        clm_store::audit::log_action(
            &store.audit_log,
            user_id,
            username.clone(),
            "service.deploy",
            Some(format!("service:{service}")),
            Some(serde_json::json!({ "job_id": job.id, "inputs": inputs })),
            None,
        )?;
        Ok(job)
    });
    match result {
        Ok(job) => Json(serde_json::json!({ "job": job })).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

pub async fn stop(State(state): State<AppState>, user: MaybeUser, Path(service): Path<String>) -> Response {
    if !authorized(&state, user, &service, "stop") {
        return api_error(StatusCode::FORBIDDEN, "not authorized to stop this service");
    }
    let (user_id, username) = requester(&state, user);
    let result = state.store.transaction(|store| {
        let job = state.runner.stop_service(&service, user_id, username.clone())?;
        clm_store::audit::log_action(
            &store.audit_log,
            user_id,
            username.clone(),
            "service.stop",
            Some(format!("service:{service}")),
            Some(serde_json::json!({ "job_id": job.id })),
            None,
        )?;
        Ok(job)
    });
    match result {
        Ok(job) => Json(serde_json::json!({ "job": job })).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

pub async fn run_script(
    State(state): State<AppState>,
    user: MaybeUser,
    Path((service, script)): Path<(String, String)>,
    body: Option<Json<DeployRequest>>,
) -> Response {
    if !script_authorized(&state, user, &service, &script) {
        return api_error(StatusCode::FORBIDDEN, "not authorized to run this script");
    }
    let inputs = body.map(|Json(r)| r.inputs).unwrap_or_default();
    let (user_id, username) = requester(&state, user);
    let result = state.store.transaction(|store| {
        let job = state.runner.run_script(&service, &script, inputs.clone(), user_id, username.clone())?;
        clm_store::audit::log_action(
            &store.audit_log,
            user_id,
            username.clone(),
            "service.run_script",
            Some(format!("service:{service}/script:{script}")),
            Some(serde_json::json!({ "job_id": job.id, "inputs": inputs })),
            None,
        )?;
        Ok(job)
    });
    match result {
        Ok(job) => Json(serde_json::json!({ "job": job })).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    pub services: Vec<String>,
}

pub async fn bulk_deploy(State(state): State<AppState>, user: MaybeUser, Json(req): Json<BulkRequest>) -> Response {
    let allowed: Vec<String> = req
        .services
        .into_iter()
        .filter(|s| authorized(&state, user, s, "deploy"))
        .collect();
    let (user_id, username) = requester(&state, user);
    let result = state.store.transaction(|store| {
        let dispatch_result = state.runner.bulk_deploy(allowed.clone(), user_id, username.clone())?;
        clm_store::audit::log_action(
            &store.audit_log,
            user_id,
            username.clone(),
            "service.bulk_deploy",
            None,
            Some(serde_json::json!({ "services": allowed, "result": dispatch_result })),
            None,
        )?;
        Ok(dispatch_result)
    });
    match result {
        Ok(result) => Json(serde_json::json!({ "result": result })).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

pub async fn bulk_stop(State(state): State<AppState>, user: MaybeUser, Json(req): Json<BulkRequest>) -> Response {
    let allowed: Vec<String> = req
        .services
        .into_iter()
        .filter(|s| authorized(&state, user, s, "stop"))
        .collect();
    let (user_id, username) = requester(&state, user);
    let result = state.store.transaction(|store| {
        let dispatch_result = state.runner.bulk_stop(allowed.clone(), user_id, username.clone())?;
        clm_store::audit::log_action(
            &store.audit_log,
            user_id,
            username.clone(),
            "service.bulk_stop",
            None,
            Some(serde_json::json!({ "services": allowed, "result": dispatch_result })),
            None,
        )?;
        Ok(dispatch_result)
    });
    match result {
        Ok(result) => Json(serde_json::json!({ "result": result })).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}
