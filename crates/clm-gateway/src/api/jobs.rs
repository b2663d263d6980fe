//! `/api/jobs` (spec.md §6): list (optionally scoped to a parent job's
//! children), get, and rerun. Grounded on `clm_jobs::JobRunner`'s own
//! method set — these handlers are thin permission checks plus a direct
//! call through.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use uuid::Uuid;

use clm_authz::service::check_service_permission;

use crate::api::auth::MaybeUser;
use crate::error::{api_error, ApiError};
use crate::state::AppState;

fn can_view_job(state: &AppState, user: MaybeUser, service: &str, job_user_id: Option<Uuid>) -> bool {
    match user.0 {
        None => true,
        Some(uid) => {
            if job_user_id == Some(uid) {
                return true;
            }
            if service == "system" {
                clm_authz::has_permission(&state.store, &state.perm_cache, uid, "jobs.view")
                    || crate::api::auth::is_super_admin(state, uid)
            } else {
                check_service_permission(&state.store, &state.perm_cache, uid, service, "view")
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub parent_job_id: Option<Uuid>,
}

pub async fn list_jobs(
    State(state): State<AppState>,
    user: MaybeUser,
    Query(query): Query<ListJobsQuery>,
) -> impl IntoResponse {
    let filter = clm_domain::model::JobFilter {
        parent_job_id: query.parent_job_id,
        user_id: None,
        status: None,
    };
    let jobs: Vec<_> = state
        .runner
        .list_jobs(filter)
        .into_iter()
        .filter(|j| can_view_job(&state, user, &j.service, j.user_id))
        .collect();
    let count = jobs.len();
    Json(serde_json::json!({ "jobs": jobs, "count": count }))
}

pub async fn get_job(State(state): State<AppState>, user: MaybeUser, Path(id): Path<Uuid>) -> Response {
    match state.runner.get_job(id) {
        Some(job) if can_view_job(&state, user, &job.service, job.user_id) => {
            Json(serde_json::json!({ "job": job })).into_response()
        }
        Some(_) => api_error(StatusCode::FORBIDDEN, "not authorized to view this job"),
        None => api_error(StatusCode::NOT_FOUND, format!("job {id} not found")),
    }
}

pub async fn rerun_job(State(state): State<AppState>, user: MaybeUser, Path(id): Path<Uuid>) -> Response {
    let Some(original) = state.runner.get_job(id) else {
        return api_error(StatusCode::NOT_FOUND, format!("job {id} not found"));
    };

    let allowed = match user.0 {
        None => true,
        Some(uid) => clm_authz::service::check_service_script_permission(
            &state.store,
            &state.perm_cache,
            uid,
            &original.service,
            original.script.as_deref().unwrap_or(&original.action),
        ),
    };
    if !allowed {
        return api_error(StatusCode::FORBIDDEN, "not authorized to rerun this job");
    }

    let user_id = user.0;
    let username = user_id.and_then(|uid| state.store.users.get(&uid)).map(|u| u.username);
    let result = state.store.transaction(|store| {
        let job = state.runner.rerun(id, user_id, username.clone())?;
        clm_store::audit::log_action(
            &store.audit_log,
            user_id,
            username.clone(),
            "job.rerun",
            Some(format!("job:{id}")),
            Some(serde_json::json!({ "new_job_id": job.id })),
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

    use clm_domain::model::{Role, ServiceAcl, User};
    use clm_store::Store;

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
            username: "dana".into(),
            password_hash: "x".into(),
            email: "dana@example.com".into(),
            display_name: "Dana".into(),
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
    fn system_token_bypasses_all_checks() {
        let (_dir, state) = test_state();
        assert!(can_view_job(&state, MaybeUser(None), "anything", None));
        assert!(can_view_job(&state, MaybeUser(None), "system", None));
    }

    #[test]
    fn system_service_jobs_require_jobs_view_permission() {
        let (_dir, state) = test_state();
        let role = Role {
            id: Uuid::new_v4(),
            name: "auditor".into(),
            description: String::new(),
            is_system: false,
            permission_codenames: vec!["jobs.view".into()],
        };
        state.store.roles.insert(role.id, role.clone()).unwrap();
        let with_perm = seed_user_with_role(&state.store, vec![role.id]);
        let without_perm = seed_user_with_role(&state.store, vec![]);

        assert!(can_view_job(&state, MaybeUser(Some(with_perm)), "system", None));
        assert!(!can_view_job(&state, MaybeUser(Some(without_perm)), "system", None));
    }

    #[test]
    fn a_user_can_always_view_their_own_job_regardless_of_service_permission() {
        let (_dir, state) = test_state();
        let uid = seed_user_with_role(&state.store, vec![]);
        assert!(!can_view_job(&state, MaybeUser(Some(uid)), "system", None));
        assert!(can_view_job(&state, MaybeUser(Some(uid)), "system", Some(uid)));
        assert!(can_view_job(&state, MaybeUser(Some(uid)), "someone-elses-service", Some(uid)));
    }

    #[test]
    fn service_jobs_fall_back_to_service_acl_check() {
        let (_dir, state) = test_state();
        let role = Role {
            id: Uuid::new_v4(),
            name: "deployer".into(),
            description: String::new(),
            is_system: false,
            permission_codenames: vec!["services.view".into()],
        };
        state.store.roles.insert(role.id, role.clone()).unwrap();
        let uid = seed_user_with_role(&state.store, vec![role.id]);

        assert!(can_view_job(&state, MaybeUser(Some(uid)), "demo-service", None));
    }

    #[test]
    fn acl_row_without_matching_permission_overrides_global_rbac() {
        let (_dir, state) = test_state();
        let role = Role {
            id: Uuid::new_v4(),
            name: "deployer".into(),
            description: String::new(),
            is_system: false,
            permission_codenames: vec!["services.view".into()],
        };
        state.store.roles.insert(role.id, role.clone()).unwrap();
        let uid = seed_user_with_role(&state.store, vec![role.id]);
        state
            .store
            .service_acls
            .insert(
                Uuid::new_v4(),
                ServiceAcl {
                    service_name: "locked-service".into(),
                    role_id: role.id,
                    permission: "deploy".into(),
                },
            )
            .unwrap();

        assert!(!can_view_job(&state, MaybeUser(Some(uid)), "locked-service", None));
    }
}
