//! `/api/audit` (spec.md §4.2, §6): read-only listing over the append-only
//! audit trail. Admin-only — the log can carry IPs and resource paths for
//! every user, not just the caller's own actions.

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::api::admin::guard::AdminGuard;
use crate::state::AppState;

pub async fn list_audit(_guard: AdminGuard, State(state): State<AppState>) -> impl IntoResponse {
    let mut entries = state.store.audit_log.list();
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Json(serde_json::json!({ "entries": entries }))
}
