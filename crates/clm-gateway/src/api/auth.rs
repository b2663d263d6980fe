//! Authentication: a static system bearer token (service-account style,
//! ported near-verbatim from the teacher's `require_api_token`) layered
//! under a minted per-user access token that carries the RBAC identity the
//! rest of the system authorizes against.
//!
//! `/api/auth/status`, `/api/auth/setup`, `/api/auth/login` are the only
//! unauthenticated routes — everything else goes through [`require_auth`].

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use clm_authz::cache::WILDCARD;
use clm_domain::model::{Role, User};
use clm_store::audit::log_action;

use crate::error::api_error;
use crate::security;
use crate::state::AppState;

/// Identity attached to the request once a bearer token verifies as a
/// live user's minted access token (request extension, set by
/// [`require_auth`]).
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .copied()
            .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "this endpoint requires a logged-in user"))
    }
}

/// Like [`CurrentUser`] but never rejects — `None` when the request
/// authenticated as the system service account (or, in dev mode, not at
/// all). Handlers that allow either a logged-in user or the system token
/// extract this instead of [`CurrentUser`].
#[derive(Debug, Clone, Copy)]
pub struct MaybeUser(pub Option<Uuid>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(parts.extensions.get::<CurrentUser>().map(|c| c.0)))
    }
}

fn bearer_token(req_headers: &axum::http::HeaderMap) -> &str {
    req_headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("")
}

/// Two-layer check: a static system token authenticates as a service
/// account (no RBAC identity attached); anything else must verify as a
/// live user's minted access token.
pub async fn require_auth(State(state): State<AppState>, mut req: Request<Body>, next: Next) -> Response {
    let provided = bearer_token(req.headers()).to_string();

    if let Some(expected) = &state.api_token_hash {
        if !provided.is_empty() {
            let provided_hash = Sha256::digest(provided.as_bytes());
            if bool::from(provided_hash.ct_eq(expected.as_slice())) {
                return next.run(req).await;
            }
        }
    }

    if !provided.is_empty() {
        if let Some(user_id) = security::verify_access_token(&state.signing_key, &provided) {
            if let Some(user) = state.store.users.get(&user_id) {
                if user.is_active {
                    req.extensions_mut().insert(CurrentUser(user_id));
                    return next.run(req).await;
                }
            }
        }
        return api_error(StatusCode::UNAUTHORIZED, "invalid or expired access token");
    }

    if state.api_token_hash.is_none() {
        return next.run(req).await;
    }

    api_error(StatusCode::UNAUTHORIZED, "missing access token")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/auth/status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let setup_complete = !state.store.users.list().is_empty();
    Json(serde_json::json!({ "setup_complete": setup_complete }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/auth/setup — creates the first super-admin user
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct SetupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

pub async fn setup(State(state): State<AppState>, Json(req): Json<SetupRequest>) -> Response {
    if !state.store.users.list().is_empty() {
        return api_error(StatusCode::CONFLICT, "setup has already been completed");
    }
    if req.password.len() < 8 {
        return api_error(StatusCode::BAD_REQUEST, "password must be at least 8 characters");
    }

    let result = state.store.transaction(|store| {
        let role = clm_authz::seed_super_admin_role(store)?;
        let user = User {
            id: Uuid::new_v4(),
            username: req.username.clone(),
            password_hash: security::hash_password(&req.password),
            email: req.email.clone(),
            display_name: req.username.clone(),
            is_active: true,
            ssh_public_key: None,
            ssh_private_key: None,
            totp_secret_encrypted: None,
            mfa_enabled: false,
            backup_codes: vec![],
            role_ids: vec![role.id],
            created_at: chrono::Utc::now(),
            invite_accepted_at: None,
        };
        store.users.insert(user.id, user.clone())?;
        log_action(
            &store.audit_log,
            Some(user.id),
            Some(user.username.clone()),
            "auth.setup",
            Some(format!("user/{}", user.id)),
            None,
            None,
        )?;
        Ok(user)
    });

    match result {
        Ok(user) => {
            let token = security::mint_access_token(&state.signing_key, user.id);
            Json(serde_json::json!({ "access_token": token, "user_id": user.id })).into_response()
        }
        Err(e) => crate::error::ApiError(e).into_response(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/auth/login
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> Response {
    let user = state.store.users.list().into_iter().find(|u| u.username == req.username);
    let Some(user) = user else {
        return api_error(StatusCode::UNAUTHORIZED, "invalid username or password");
    };
    if !user.is_active || !security::verify_password(&req.password, &user.password_hash) {
        return api_error(StatusCode::UNAUTHORIZED, "invalid username or password");
    }

    let token = security::mint_access_token(&state.signing_key, user.id);
    let _ = log_action(
        &state.store.audit_log,
        Some(user.id),
        Some(user.username.clone()),
        "auth.login",
        Some(format!("user/{}", user.id)),
        None,
        None,
    );
    Json(serde_json::json!({ "access_token": token, "user_id": user.id })).into_response()
}

/// True if `user_id` holds the process-wide wildcard permission.
pub fn is_super_admin(state: &AppState, user_id: Uuid) -> bool {
    clm_authz::has_permission(&state.store, &state.perm_cache, user_id, WILDCARD)
}

/// Roles this system seeds on first boot, beyond `super-admin` — mirrors
/// the shape `examples/original_source/app/permissions.py` expects to
/// already exist (used by `seed_default_roles` in bootstrap).
pub fn is_system_role(role: &Role) -> bool {
    role.is_system
}
