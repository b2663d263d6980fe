//! `/api/drift` (spec.md §4.5, §6): read-only listing/lookup over the
//! drift reports the `drift` poller writes. Reports are produced by
//! `clm-scheduler::pollers::run_drift_check`, never by this API.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use uuid::Uuid;

use crate::error::api_error;
use crate::state::AppState;

pub async fn list_drift(State(state): State<AppState>) -> impl IntoResponse {
    let mut reports = state.store.drift_reports.list();
    reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Json(serde_json::json!({ "reports": reports }))
}

pub async fn get_drift(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.store.drift_reports.get(&id) {
        Some(r) => Json(serde_json::json!({ "report": r })).into_response(),
        None => api_error(StatusCode::NOT_FOUND, format!("drift report {id} not found")),
    }
}
