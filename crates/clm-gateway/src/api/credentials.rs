//! `/api/credentials/audit` (spec.md §4.2, §6): lists every `credential`-
//! typed inventory object the caller is entitled to view, per
//! `clm_authz::credential::user_can_view_credential`'s per-object check.

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::api::auth::MaybeUser;
use crate::state::AppState;

pub async fn audit(State(state): State<AppState>, user: MaybeUser) -> impl IntoResponse {
    let credential_type_ids: Vec<_> = state
        .store
        .inventory_types
        .list()
        .into_iter()
        .filter(|t| t.slug == "credential")
        .map(|t| t.id)
        .collect();

    let objects: Vec<_> = state
        .store
        .inventory_objects
        .list()
        .into_iter()
        .filter(|o| credential_type_ids.contains(&o.type_id))
        .filter(|o| match user.0 {
            None => true,
            Some(uid) => clm_authz::credential::user_can_view_credential(&state.store, &state.perm_cache, uid, o.id),
        })
        .collect();

    Json(serde_json::json!({ "credentials": objects }))
}
