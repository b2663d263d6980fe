//! Admin auth guard — ported near-verbatim from the teacher's
//! `AdminGuard`, extended with a second path: a logged-in user holding the
//! wildcard RBAC permission (`super-admin`) passes too, so day-to-day
//! admin work doesn't require juggling a separate static secret once the
//! RBAC engine is seeded.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::Json;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::api::auth::CurrentUser;
use crate::state::AppState;

pub struct AdminGuard;

#[async_trait]
impl FromRequestParts<AppState> for AdminGuard {
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(expected_hash) = &state.admin_token_hash {
            let provided = parts
                .headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .unwrap_or("");
            let provided_hash = Sha256::digest(provided.as_bytes());
            if bool::from(provided_hash.ct_eq(expected_hash.as_slice())) {
                return Ok(AdminGuard);
            }
        }

        if let Some(CurrentUser(user_id)) = parts.extensions.get::<CurrentUser>().copied() {
            if crate::api::auth::is_super_admin(state, user_id) {
                return Ok(AdminGuard);
            }
        }

        if state.admin_token_hash.is_none() && state.api_token_hash.is_none() {
            return Ok(AdminGuard);
        }

        Err((
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({ "error": "admin access required" })),
        ))
    }
}
