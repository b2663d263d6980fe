//! `/api/users` (spec.md §4.2, §6): user listing/lookup plus role
//! assignment and deactivation. Creation goes through `/api/auth/setup`
//! (first user) or invite acceptance — not a raw create-user endpoint —
//! mirroring `examples/original_source/app/invites.py`'s flow.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::admin::guard::AdminGuard;
use crate::api::auth::MaybeUser;
use crate::error::api_error;
use crate::state::AppState;

fn requester(state: &AppState, user: MaybeUser) -> (Option<Uuid>, Option<String>) {
    match user.0 {
        None => (None, None),
        Some(uid) => (Some(uid), state.store.users.get(&uid).map(|u| u.username)),
    }
}

/// `User` minus `password_hash`/`ssh_private_key`/`totp_secret_encrypted`
/// — never serialize secrets back to a client.
#[derive(Debug, Serialize)]
struct PublicUser {
    id: Uuid,
    username: String,
    email: String,
    display_name: String,
    is_active: bool,
    mfa_enabled: bool,
    role_ids: Vec<Uuid>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<clm_domain::model::User> for PublicUser {
    fn from(u: clm_domain::model::User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            display_name: u.display_name,
            is_active: u.is_active,
            mfa_enabled: u.mfa_enabled,
            role_ids: u.role_ids,
            created_at: u.created_at,
        }
    }
}

pub async fn list_users(_guard: AdminGuard, State(state): State<AppState>) -> impl IntoResponse {
    let users: Vec<PublicUser> = state.store.users.list().into_iter().map(Into::into).collect();
    Json(serde_json::json!({ "users": users }))
}

pub async fn get_user(_guard: AdminGuard, State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.store.users.get(&id) {
        Some(u) => Json(serde_json::json!({ "user": PublicUser::from(u) })).into_response(),
        None => api_error(StatusCode::NOT_FOUND, format!("user {id} not found")),
    }
}

#[derive(Debug, Deserialize)]
pub struct SetRolesRequest {
    pub role_ids: Vec<Uuid>,
}

pub async fn set_roles(
    _guard: AdminGuard,
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<Uuid>,
    Json(req): Json<SetRolesRequest>,
) -> Response {
    let (user_id, username) = requester(&state, user);
    let result = state.store.transaction(|store| {
        let found = store.users.update(&id, |u| {
            u.role_ids = req.role_ids.clone();
        })?;
        if !found {
            return Ok(None);
        }
        clm_store::audit::log_action(
            &store.audit_log,
            user_id,
            username.clone(),
            "user.set_roles",
            Some(format!("user:{id}")),
            Some(serde_json::json!({ "role_ids": req.role_ids })),
            None,
        )?;
        Ok(store.users.get(&id))
    });
    match result {
        Ok(Some(u)) => {
            state.perm_cache.invalidate(&id);
            Json(serde_json::json!({ "user": PublicUser::from(u) })).into_response()
        }
        Ok(None) => api_error(StatusCode::NOT_FOUND, format!("user {id} not found")),
        Err(e) => crate::error::ApiError(e).into_response(),
    }
}

pub async fn set_active(
    _guard: AdminGuard,
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<Uuid>,
    Json(active): Json<bool>,
) -> Response {
    let (user_id, username) = requester(&state, user);
    let result = state.store.transaction(|store| {
        let found = store.users.update(&id, |u| {
            u.is_active = active;
        })?;
        if !found {
            return Ok(false);
        }
        clm_store::audit::log_action(
            &store.audit_log,
            user_id,
            username.clone(),
            "user.set_active",
            Some(format!("user:{id}")),
            Some(serde_json::json!({ "is_active": active })),
            None,
        )?;
        Ok(true)
    });
    match result {
        Ok(true) => {
            state.perm_cache.invalidate(&id);
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => api_error(StatusCode::NOT_FOUND, format!("user {id} not found")),
        Err(e) => crate::error::ApiError(e).into_response(),
    }
}
