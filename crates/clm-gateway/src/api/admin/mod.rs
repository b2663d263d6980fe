pub mod guard;

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let setup_complete = !state.store.users.list().is_empty();
    Json(serde_json::json!({ "status": "ready", "setup_complete": setup_complete }))
}
