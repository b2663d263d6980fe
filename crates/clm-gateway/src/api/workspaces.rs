//! `/api/workspaces`: no dedicated domain type backs this route in
//! SPEC_FULL.md — it's handled the same way every other inventory kind is,
//! as `InventoryObject` rows under the conventional `workspace` type slug,
//! rather than inventing a parallel storage path for what is structurally
//! identical to `/api/inventory/workspace`. See DESIGN.md's Open Question
//! entry for the reasoning.

use axum::extract::State;
use axum::response::IntoResponse;

use crate::api::auth::MaybeUser;
use crate::state::AppState;

pub async fn list_workspaces(state: State<AppState>, user: MaybeUser) -> impl IntoResponse {
    crate::api::inventory::list_objects(state, user, axum::extract::Path("workspace".to_string())).await
}
