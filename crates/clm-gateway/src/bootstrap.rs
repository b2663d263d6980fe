//! `AppState` construction and background-task spawning, split out of
//! `main.rs` the way the teacher's own `bootstrap.rs` is — so the `serve`
//! command and (eventually) any one-shot CLI command share one boot path.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use clm_authz::PermissionCache;
use clm_domain::config::{Config, ConfigSeverity};
use clm_jobs::JobRunner;
use clm_notify::Notifier;
use clm_scheduler::{pollers, Scheduler};
use clm_store::Store;

use crate::state::AppState;

/// Validate config, initialize every subsystem, and return a fully-wired
/// [`AppState`]. The shared "boot" path for every CLI command that touches
/// the store.
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    // ── Store ─────────────────────────────────────────────────────────
    let store = Arc::new(Store::open(&config.store.data_dir)?);
    tracing::info!(data_dir = %config.store.data_dir, "store ready");

    // ── Job runner ───────────────────────────────────────────────────
    let runner = Arc::new(JobRunner::new(store.clone(), config.jobs.clone(), config.store.services_dir.clone()));
    let rehydrated = runner.rehydrate()?;
    tracing::info!(rehydrated, "job runner ready");

    // ── Authorization ────────────────────────────────────────────────
    let perm_cache = Arc::new(PermissionCache::new());
    let super_admin_role = clm_authz::seed_super_admin_role(&store)?;
    tracing::info!(role_id = %super_admin_role.id, "super-admin role seeded");

    // ── Notifications ───────────────────────────────────────────────
    let notifier = Arc::new(Notifier::new(config.email.clone()));
    tracing::info!("notifier ready");

    // ── API token (read once, hash for constant-time comparison) ────
    let api_token_hash = {
        let env_var = &config.auth.api_token_env;
        match std::env::var(env_var).ok().filter(|t| !t.is_empty()) {
            Some(t) => {
                tracing::info!(env = %env_var, "system API bearer-token auth enabled");
                Some(Sha256::digest(t.as_bytes()).to_vec())
            }
            None => {
                tracing::warn!(env = %env_var, "system API bearer-token auth DISABLED — set this env var to enable");
                None
            }
        }
    };

    // ── Admin token (read once, hash for constant-time comparison) ──
    let admin_token_hash = {
        let env_var = &config.auth.admin_token_env;
        match std::env::var(env_var).ok().filter(|t| !t.is_empty()) {
            Some(t) => {
                tracing::info!(env = %env_var, "admin bearer-token auth enabled");
                Some(Sha256::digest(t.as_bytes()).to_vec())
            }
            None => {
                tracing::warn!(env = %env_var, "admin bearer-token auth DISABLED — falling back to super-admin RBAC only");
                None
            }
        }
    };

    // ── Per-user access token signing key ───────────────────────────
    let signing_key = Arc::new(store.metadata.get_or_create_signing_key()?);
    tracing::info!("access-token signing key ready");

    Ok(AppState {
        config,
        store,
        runner,
        perm_cache,
        notifier,
        api_token_hash,
        admin_token_hash,
        signing_key,
    })
}

/// Spawn the long-running background tasks (scheduler tick, pollers,
/// personal-instance TTL sweep), each cancellable via the returned
/// [`CancellationToken`] so `main.rs` can shut them down cleanly.
pub fn spawn_background_tasks(state: &AppState) -> (Vec<tokio::task::JoinHandle<()>>, CancellationToken) {
    let shutdown = CancellationToken::new();
    let mut handles = Vec::new();

    // ── Scheduler tick loop ───────────────────────────────────────────
    {
        let scheduler = Scheduler::new(state.store.clone(), state.runner.clone(), state.config.store.services_dir.clone());
        let interval = Duration::from_secs(state.config.scheduler.tick_secs);
        let shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run(interval, shutdown).await;
        }));
    }

    // ── Cost-refresh poller ───────────────────────────────────────────
    {
        let store = state.store.clone();
        let runner = state.runner.clone();
        let interval = Duration::from_secs(state.config.scheduler.cost_refresh_secs);
        let shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            pollers::run_cost_refresh(store, runner, interval, shutdown).await;
        }));
    }

    // ── Health-check poller ───────────────────────────────────────────
    {
        let runner = state.runner.clone();
        let interval = Duration::from_secs(state.config.scheduler.health_secs);
        let shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            pollers::run_health_check(runner, interval, shutdown).await;
        }));
    }

    // ── Drift-check poller ────────────────────────────────────────────
    {
        let runner = state.runner.clone();
        let interval = Duration::from_secs(state.config.scheduler.drift_secs);
        let shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            pollers::run_drift_check(runner, interval, shutdown).await;
        }));
    }

    // ── Snapshot-sync poller ──────────────────────────────────────────
    {
        let runner = state.runner.clone();
        let interval = Duration::from_secs(state.config.scheduler.snapshot_secs);
        let shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            pollers::run_snapshot_sync(runner, interval, shutdown).await;
        }));
    }

    // ── Personal-instance TTL sweep (hourly) ─────────────────────────
    {
        let store = state.store.clone();
        let runner = state.runner.clone();
        let services_dir = std::path::PathBuf::from(&state.config.store.services_dir);
        let shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(3_600));
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let destroyed = clm_scheduler::cleanup::check_and_cleanup_expired(&store, &runner, &services_dir);
                        if !destroyed.is_empty() {
                            tracing::info!(count = destroyed.len(), hosts = ?destroyed, "personal-instance TTL cleanup dispatched destroys");
                        }
                    }
                }
            }
        }));
    }

    tracing::info!("background tasks spawned");
    (handles, shutdown)
}
