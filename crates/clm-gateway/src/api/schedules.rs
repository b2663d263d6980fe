//! `/api/schedules` (spec.md §4.5, §6): CRUD over [`ScheduledJob`] rows
//! plus a run-now action that dispatches a schedule outside its cron
//! cadence. Handler/request-struct style is the teacher's own
//! `crates/gateway/src/api/schedules.rs`; the dispatch itself reuses
//! `clm_scheduler::dispatch::dispatch_due` so run-now goes through the
//! exact same collision/record-outcome path as a real tick.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use clm_domain::model::{JobTypeSpec, MissedPolicy, ScheduledJob};
use clm_scheduler::cron::{cron_next_tz, parse_tz};
use clm_scheduler::dispatch::dispatch_due;

use crate::api::admin::guard::AdminGuard;
use crate::api::auth::MaybeUser;
use crate::error::{api_error, ApiError};
use crate::state::AppState;

fn can_manage(state: &AppState, user: MaybeUser) -> bool {
    match user.0 {
        None => true,
        Some(uid) => clm_authz::has_permission(&state.store, &state.perm_cache, uid, "schedules.manage")
            || crate::api::auth::is_super_admin(state, uid),
    }
}

fn requester(state: &AppState, user: MaybeUser) -> (Option<Uuid>, Option<String>) {
    match user.0 {
        None => (None, None),
        Some(uid) => (Some(uid), state.store.users.get(&uid).map(|u| u.username)),
    }
}

pub async fn list_schedules(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "schedules": state.store.schedules.list() }))
}

pub async fn get_schedule(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.store.schedules.get(&id) {
        Some(s) => Json(serde_json::json!({ "schedule": s })).into_response(),
        None => api_error(StatusCode::NOT_FOUND, format!("schedule {id} not found")),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateScheduleRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub spec: JobTypeSpec,
    pub cron_expression: String,
    #[serde(default = "d_timezone")]
    pub timezone: String,
    #[serde(default = "d_true")]
    pub is_enabled: bool,
    #[serde(default = "d_true")]
    pub skip_if_running: bool,
    #[serde(default)]
    pub missed_policy: MissedPolicy,
    #[serde(default = "d_max_catchup")]
    pub max_catchup_runs: usize,
}

fn d_timezone() -> String {
    "UTC".into()
}
fn d_true() -> bool {
    true
}
fn d_max_catchup() -> usize {
    5
}

pub async fn create_schedule(
    State(state): State<AppState>,
    user: MaybeUser,
    Json(req): Json<CreateScheduleRequest>,
) -> Response {
    if !can_manage(&state, user) {
        return api_error(StatusCode::FORBIDDEN, "not authorized to manage schedules");
    }
    let tz = parse_tz(&req.timezone);
    let now = Utc::now();
    let Some(next_run_at) = cron_next_tz(&req.cron_expression, &now, tz) else {
        return api_error(StatusCode::BAD_REQUEST, "invalid cron expression");
    };
    let schedule = ScheduledJob {
        id: Uuid::new_v4(),
        name: req.name,
        description: req.description,
        spec: req.spec,
        cron_expression: req.cron_expression,
        timezone: req.timezone,
        is_enabled: req.is_enabled,
        skip_if_running: req.skip_if_running,
        missed_policy: req.missed_policy,
        max_catchup_runs: req.max_catchup_runs,
        next_run_at,
        last_run_at: None,
        last_job_id: None,
        consecutive_failures: 0,
        cooldown_until: None,
        created_at: now,
        updated_at: now,
    };
    let (user_id, username) = requester(&state, user);
    let result = state.store.transaction(|store| {
        store.schedules.insert(schedule.id, schedule.clone())?;
        clm_store::audit::log_action(
            &store.audit_log,
            user_id,
            username.clone(),
            "schedule.create",
            Some(format!("schedule:{}", schedule.id)),
            Some(serde_json::json!({ "name": schedule.name })),
            None,
        )?;
        Ok(schedule.clone())
    });
    match result {
        Ok(schedule) => Json(serde_json::json!({ "schedule": schedule })).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateScheduleRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub cron_expression: Option<String>,
    pub timezone: Option<String>,
    pub is_enabled: Option<bool>,
    pub skip_if_running: Option<bool>,
    pub missed_policy: Option<MissedPolicy>,
    pub max_catchup_runs: Option<usize>,
}

pub async fn update_schedule(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateScheduleRequest>,
) -> Response {
    if !can_manage(&state, user) {
        return api_error(StatusCode::FORBIDDEN, "not authorized to manage schedules");
    }
    let (user_id, username) = requester(&state, user);
    let mut recompute_err = None;
    let result = state.store.transaction(|store| {
        let found = store.schedules.update(&id, |s| {
            if let Some(v) = req.name.clone() {
                s.name = v;
            }
            if let Some(v) = req.description.clone() {
                s.description = v;
            }
            if let Some(v) = req.timezone.clone() {
                s.timezone = v;
            }
            if let Some(v) = req.cron_expression.clone() {
                s.cron_expression = v;
            }
            if let Some(v) = req.is_enabled {
                s.is_enabled = v;
            }
            if let Some(v) = req.skip_if_running {
                s.skip_if_running = v;
            }
            if let Some(v) = req.missed_policy {
                s.missed_policy = v;
            }
            if let Some(v) = req.max_catchup_runs {
                s.max_catchup_runs = v;
            }
            let tz = parse_tz(&s.timezone);
            match cron_next_tz(&s.cron_expression, &Utc::now(), tz) {
                Some(next) => s.next_run_at = next,
                None => recompute_err = Some("invalid cron expression"),
            }
            s.updated_at = Utc::now();
        })?;
        if !found {
            return Ok(None);
        }
        clm_store::audit::log_action(
            &store.audit_log,
            user_id,
            username.clone(),
            "schedule.update",
            Some(format!("schedule:{id}")),
            None,
            None,
        )?;
        Ok(store.schedules.get(&id))
    });
    match result {
        Ok(Some(s)) if recompute_err.is_none() => Json(serde_json::json!({ "schedule": s })).into_response(),
        Ok(Some(_)) => api_error(StatusCode::BAD_REQUEST, recompute_err.unwrap()),
        Ok(None) => api_error(StatusCode::NOT_FOUND, format!("schedule {id} not found")),
        Err(e) => ApiError(e).into_response(),
    }
}

pub async fn delete_schedule(State(state): State<AppState>, user: MaybeUser, Path(id): Path<Uuid>) -> Response {
    if !can_manage(&state, user) {
        return api_error(StatusCode::FORBIDDEN, "not authorized to manage schedules");
    }
    let (user_id, username) = requester(&state, user);
    let result = state.store.transaction(|store| {
        let removed = store.schedules.remove(&id)?;
        if removed.is_none() {
            return Ok(false);
        }
        clm_store::audit::log_action(
            &store.audit_log,
            user_id,
            username.clone(),
            "schedule.delete",
            Some(format!("schedule:{id}")),
            None,
            None,
        )?;
        Ok(true)
    });
    match result {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => api_error(StatusCode::NOT_FOUND, format!("schedule {id} not found")),
        Err(e) => ApiError(e).into_response(),
    }
}

/// Dispatch this schedule's job immediately, independent of cron timing —
/// still subject to `skip_if_running`.
pub async fn run_now(State(state): State<AppState>, user: MaybeUser, Path(id): Path<Uuid>) -> Response {
    if !can_manage(&state, user) {
        return api_error(StatusCode::FORBIDDEN, "not authorized to manage schedules");
    }
    let (user_id, username) = requester(&state, user);
    let services_dir = std::path::PathBuf::from(&state.config.store.services_dir);
    let result = state.store.transaction(|store| {
        let Some(schedule) = store.schedules.get(&id) else {
            return Ok(None);
        };
        let dispatched = dispatch_due(store, &state.runner, &services_dir, &schedule)?;
        if let Some(job_id) = dispatched {
            clm_store::audit::log_action(
                &store.audit_log,
                user_id,
                username.clone(),
                "schedule.run_now",
                Some(format!("schedule:{id}")),
                Some(serde_json::json!({ "job_id": job_id })),
                None,
            )?;
        }
        Ok(Some(dispatched))
    });
    match result {
        Ok(Some(Some(job_id))) => Json(serde_json::json!({ "job_id": job_id })).into_response(),
        Ok(Some(None)) => api_error(StatusCode::CONFLICT, "schedule produced no job (collision or disabled)"),
        Ok(None) => api_error(StatusCode::NOT_FOUND, format!("schedule {id} not found")),
        Err(e) => ApiError(e).into_response(),
    }
}

/// Clear a schedule's failure streak and cooldown — admin escape hatch
/// for a schedule stuck in backoff (spec.md §4.5 "cooldown").
pub async fn reset_errors(
    _guard: AdminGuard,
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<Uuid>,
) -> Response {
    let (user_id, username) = requester(&state, user);
    let result = state.store.transaction(|store| {
        let found = store.schedules.update(&id, |s| {
            s.consecutive_failures = 0;
            s.cooldown_until = None;
        })?;
        if !found {
            return Ok(false);
        }
        clm_store::audit::log_action(
            &store.audit_log,
            user_id,
            username.clone(),
            "schedule.reset_errors",
            Some(format!("schedule:{id}")),
            None,
            None,
        )?;
        Ok(true)
    });
    match result {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => api_error(StatusCode::NOT_FOUND, format!("schedule {id} not found")),
        Err(e) => ApiError(e).into_response(),
    }
}
