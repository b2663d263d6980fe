use std::sync::Arc;

use clm_authz::PermissionCache;
use clm_domain::config::Config;
use clm_jobs::JobRunner;
use clm_notify::Notifier;
use clm_store::Store;

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern, the same way the teacher's own
/// `AppState` is:
/// - **Core services** — config, store, job runner
/// - **Authorization** — permission cache
/// - **Notifications** — email
/// - **Security (startup-computed)** — system token hash, signing key
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub store: Arc<Store>,
    pub runner: Arc<JobRunner>,

    // ── Authorization ────────────────────────────────────────────────
    pub perm_cache: Arc<PermissionCache>,

    // ── Notifications ────────────────────────────────────────────────
    pub notifier: Arc<Notifier>,

    // ── Security (startup-computed) ──────────────────────────────────
    /// SHA-256 hash of a static system bearer token (service-account
    /// style access, bypasses per-user login). `None` = not configured.
    pub api_token_hash: Option<Vec<u8>>,
    /// SHA-256 hash of a static admin bearer token, an escape hatch
    /// alongside the super-admin RBAC role. `None` = not configured.
    pub admin_token_hash: Option<Vec<u8>>,
    /// Process-wide signing key for per-user access tokens (spec.md §9
    /// "maybe-create" primitive via `MetadataStore::get_or_create_signing_key`).
    pub signing_key: Arc<Vec<u8>>,
}
