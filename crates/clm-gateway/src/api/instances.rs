//! `/api/instances` (spec.md §6): stop a single cloud instance by label,
//! and trigger an on-demand inventory refresh. Both delegate straight to
//! `clm_jobs::JobRunner`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use crate::api::auth::MaybeUser;
use crate::error::{api_error, ApiError};
use crate::state::AppState;

fn requester(state: &AppState, user: MaybeUser) -> (Option<uuid::Uuid>, Option<String>) {
    match user.0 {
        None => (None, None),
        Some(uid) => (Some(uid), state.store.users.get(&uid).map(|u| u.username)),
    }
}

fn can_stop_instance(state: &AppState, user: MaybeUser) -> bool {
    match user.0 {
        None => true,
        Some(uid) => clm_authz::inventory::check_type_permission(&state.store, &state.perm_cache, uid, "instance", "stop"),
    }
}

fn can_refresh(state: &AppState, user: MaybeUser) -> bool {
    match user.0 {
        None => true,
        Some(uid) => {
            clm_authz::has_permission(&state.store, &state.perm_cache, uid, "inventory.refresh")
                || crate::api::auth::is_super_admin(state, uid)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StopInstanceRequest {
    pub region: String,
}

pub async fn stop_instance(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(label): Path<String>,
    Json(req): Json<StopInstanceRequest>,
) -> Response {
    if !can_stop_instance(&state, user) {
        return api_error(StatusCode::FORBIDDEN, "not authorized to stop this instance");
    }
    let (user_id, username) = requester(&state, user);
    let result = state.store.transaction(|store| {
        let job = state.runner.stop_instance(&label, &req.region, user_id, username.clone())?;
        clm_store::audit::log_action(
            &store.audit_log,
            user_id,
            username.clone(),
            "instance.stop",
            Some(format!("instance:{label}")),
            Some(serde_json::json!({ "job_id": job.id, "region": req.region })),
            None,
        )?;
        Ok(job)
    });
    match result {
        Ok(job) => Json(serde_json::json!({ "job": job })).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

pub async fn refresh(State(state): State<AppState>, user: MaybeUser) -> Response {
    if !can_refresh(&state, user) {
        return api_error(StatusCode::FORBIDDEN, "not authorized to refresh instances");
    }
    let (user_id, username) = requester(&state, user);
    let result = state.store.transaction(|store| {
        let job = state.runner.refresh_instances(user_id, username.clone())?;
        clm_store::audit::log_action(
            &store.audit_log,
            user_id,
            username.clone(),
            "instance.refresh",
            None,
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

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use clm_domain::model::{Role, User};
    use clm_store::Store;
    use uuid::Uuid;

    use super::*;

    fn test_state() -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path()).unwrap());
        let config = Arc::new(clm_domain::config::Config::default());
        let runner = Arc::new(clm_jobs::JobRunner::new(
            store.clone(),
            config.jobs.clone(),
            config.store.services_dir.clone(),
        ));
        let state = AppState {
            config,
            store,
            runner,
            perm_cache: Arc::new(clm_authz::PermissionCache::new()),
            notifier: Arc::new(clm_notify::Notifier::new(clm_domain::config::EmailConfig::default())),
            api_token_hash: None,
            admin_token_hash: None,
            signing_key: Arc::new(vec![0u8; 32]),
        };
        (dir, state)
    }

    fn seed_user_with_role(store: &Store, role_ids: Vec<Uuid>) -> Uuid {
        let user = User {
            id: Uuid::new_v4(),
            username: "frank".into(),
            password_hash: "x".into(),
            email: "frank@example.com".into(),
            display_name: "Frank".into(),
            is_active: true,
            ssh_public_key: None,
            ssh_private_key: None,
            totp_secret_encrypted: None,
            mfa_enabled: false,
            backup_codes: vec![],
            role_ids,
            created_at: chrono::Utc::now(),
            invite_accepted_at: None,
        };
        store.users.insert(user.id, user.clone()).unwrap();
        user.id
    }

    #[test]
    fn system_token_may_stop_and_refresh() {
        let (_dir, state) = test_state();
        assert!(can_stop_instance(&state, MaybeUser(None)));
        assert!(can_refresh(&state, MaybeUser(None)));
    }

    #[test]
    fn user_without_permission_cannot_stop_or_refresh() {
        let (_dir, state) = test_state();
        let uid = seed_user_with_role(&state.store, vec![]);
        assert!(!can_stop_instance(&state, MaybeUser(Some(uid))));
        assert!(!can_refresh(&state, MaybeUser(Some(uid))));
    }

    #[test]
    fn role_based_inventory_instance_stop_permission_grants_access() {
        let (_dir, state) = test_state();
        let role = Role {
            id: Uuid::new_v4(),
            name: "operator".into(),
            description: String::new(),
            is_system: false,
            permission_codenames: vec!["inventory.instance.stop".into()],
        };
        state.store.roles.insert(role.id, role.clone()).unwrap();
        let uid = seed_user_with_role(&state.store, vec![role.id]);
        assert!(can_stop_instance(&state, MaybeUser(Some(uid))));
    }

    #[test]
    fn inventory_refresh_permission_grants_refresh_only() {
        let (_dir, state) = test_state();
        let role = Role {
            id: Uuid::new_v4(),
            name: "refresher".into(),
            description: String::new(),
            is_system: false,
            permission_codenames: vec!["inventory.refresh".into()],
        };
        state.store.roles.insert(role.id, role.clone()).unwrap();
        let uid = seed_user_with_role(&state.store, vec![role.id]);
        assert!(can_refresh(&state, MaybeUser(Some(uid))));
        assert!(!can_stop_instance(&state, MaybeUser(Some(uid))));
    }
}
