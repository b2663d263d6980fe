//! Background pollers (spec.md §4.5, C7): cost refresh, health check,
//! drift check, snapshot sync — each a `tokio::time::interval` loop
//! dispatching a named system task, wired the way the teacher's
//! `bootstrap::spawn_background_tasks` registers its own loops.
//!
//! Only the cost-refresh poller inspects store state before firing (the
//! startup seed-if-empty rule); the others are unconditional interval
//! fires, since spec.md gives the actual provider work to the dispatched
//! subprocess rather than this process.

use std::sync::Arc;
use std::time::Duration;

use clm_domain::model::METADATA_KEY_PLANS_CACHE;
use clm_jobs::JobRunner;
use clm_store::Store;
use tokio_util::sync::CancellationToken;

/// Run `task_name` every `interval`, stopping when `shutdown` fires.
async fn run_system_task_loop(runner: Arc<JobRunner>, task_name: &'static str, interval: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // first tick fires immediately; consume it before the loop below re-fires on schedule
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = runner.run_system_task(task_name, None, Some("scheduler".to_string())) {
                    tracing::warn!(task = task_name, error = %e, "background poller dispatch failed");
                }
            }
        }
    }
}

/// Cost-refresh poller: fires on its configured cadence, plus an immediate
/// seed run at startup if `AppMetadata["plans_cache"]` is empty or absent,
/// so a fresh deployment isn't left without pricing data for up to 6h.
pub async fn run_cost_refresh(store: Arc<Store>, runner: Arc<JobRunner>, interval: Duration, shutdown: CancellationToken) {
    let needs_seed = store
        .metadata
        .get(METADATA_KEY_PLANS_CACHE)
        .map(|v| v.is_null() || v.as_array().map(|a| a.is_empty()).unwrap_or(false))
        .unwrap_or(true);
    if needs_seed {
        if let Err(e) = runner.run_system_task("refresh_costs", None, Some("scheduler".to_string())) {
            tracing::warn!(error = %e, "startup cost-refresh seed failed");
        }
    }
    run_system_task_loop(runner, "refresh_costs", interval, shutdown).await;
}

pub async fn run_health_check(runner: Arc<JobRunner>, interval: Duration, shutdown: CancellationToken) {
    run_system_task_loop(runner, "health_check", interval, shutdown).await;
}

pub async fn run_drift_check(runner: Arc<JobRunner>, interval: Duration, shutdown: CancellationToken) {
    run_system_task_loop(runner, "drift_check", interval, shutdown).await;
}

pub async fn run_snapshot_sync(runner: Arc<JobRunner>, interval: Duration, shutdown: CancellationToken) {
    run_system_task_loop(runner, "snapshot_sync", interval, shutdown).await;
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use clm_domain::config::JobsConfig;

    use super::*;

    fn write_script(service_dir: &std::path::Path, name: &str, body: &str) {
        std::fs::create_dir_all(service_dir).unwrap();
        let path = service_dir.join(format!("{name}.sh"));
        std::fs::write(&path, body).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
    }

    #[tokio::test]
    async fn health_check_loop_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("data")).unwrap());
        let services_dir = dir.path().join("services");
        write_script(&services_dir.join("system"), "health_check", "#!/bin/sh\nexit 0\n");
        let runner = Arc::new(JobRunner::new(store.clone(), JobsConfig::default(), services_dir));

        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();
        let handle = tokio::spawn(run_health_check(runner, Duration::from_millis(20), shutdown_clone));
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn cost_refresh_seeds_immediately_when_plans_cache_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("data")).unwrap());
        let services_dir = dir.path().join("services");
        write_script(&services_dir.join("system"), "refresh_costs", "#!/bin/sh\nexit 0\n");
        let runner = Arc::new(JobRunner::new(store.clone(), JobsConfig::default(), services_dir));

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        run_cost_refresh(store.clone(), runner, Duration::from_secs(3600), shutdown).await;

        let jobs = store.jobs.list();
        assert!(jobs.iter().any(|j| j.script.as_deref() == Some("refresh_costs")));
    }
}
