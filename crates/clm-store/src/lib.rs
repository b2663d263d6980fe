//! JSON-file-backed persistence for CloudLab Manager.
//!
//! No SQL crate exists anywhere in this workspace's dependency lineage
//! (teacher and pack alike), so entities are kept in per-type
//! [`table::Table`] instances instead of tables in a database — each one a
//! `parking_lot::RwLock<HashMap<Uuid, T>>` that rewrites its whole file
//! atomically on every mutation, generalizing the teacher's
//! `SessionStore`/`RunStore` idiom.

pub mod audit;
pub mod metadata;
pub mod migrations;
pub mod table;

use std::path::Path;
use std::sync::Mutex;

use clm_domain::model::{
    AuditLog, Blueprint, BlueprintDeployment, CredentialAccessRule, DriftReport, InventoryObject,
    InventoryTag, InventoryType, Invite, Job, ObjectAcl, PasswordReset, Permission, Role,
    ScheduledJob, ServiceAcl, TagPermission, User,
};
use clm_domain::Result;

pub use metadata::MetadataStore;
pub use table::Table;

/// Current on-disk schema version, stamped into `meta.json` under
/// [`metadata::MetadataStore`]. Bumped whenever a migration in
/// [`migrations`] is added.
const SCHEMA_VERSION: u64 = 1;
const SCHEMA_VERSION_KEY: &str = "__schema_version";

/// The full set of entity tables CloudLab Manager persists, plus a
/// process-wide [`Mutex`] used by [`Store::transaction`] to serialize
/// multi-table writes.
///
/// Each [`Table`] already persists atomically per call; `transaction`
/// layers a single coarse lock on top so a caller's closure observes (and
/// leaves) the store as a single consistent unit, without claiming true
/// cross-table ACID rollback — a local JSON store has no WAL to roll back
/// to, which is why spec.md's Non-goals disclaim distributed-consensus and
/// full RDBMS semantics for this system.
pub struct Store {
    pub users: Table<User>,
    pub roles: Table<Role>,
    pub permissions: Table<Permission>,
    pub invites: Table<Invite>,
    pub password_resets: Table<PasswordReset>,
    pub jobs: Table<Job>,
    pub schedules: Table<ScheduledJob>,
    pub inventory_types: Table<InventoryType>,
    pub inventory_objects: Table<InventoryObject>,
    pub inventory_tags: Table<InventoryTag>,
    pub object_acls: Table<ObjectAcl>,
    pub tag_permissions: Table<TagPermission>,
    pub service_acls: Table<ServiceAcl>,
    pub credential_access_rules: Table<CredentialAccessRule>,
    pub blueprints: Table<Blueprint>,
    pub blueprint_deployments: Table<BlueprintDeployment>,
    pub audit_log: Table<AuditLog>,
    pub drift_reports: Table<DriftReport>,
    pub metadata: MetadataStore,
    txn_lock: Mutex<()>,
}

impl Store {
    /// Open (creating if absent) every entity table under `data_dir`, then
    /// run idempotent startup migrations.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = data_dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let store = Self {
            users: Table::open(dir.join("users.json"))?,
            roles: Table::open(dir.join("roles.json"))?,
            permissions: Table::open(dir.join("permissions.json"))?,
            invites: Table::open(dir.join("invites.json"))?,
            password_resets: Table::open(dir.join("password_resets.json"))?,
            jobs: Table::open(dir.join("jobs.json"))?,
            schedules: Table::open(dir.join("schedules.json"))?,
            inventory_types: Table::open(dir.join("inventory_types.json"))?,
            inventory_objects: Table::open(dir.join("inventory_objects.json"))?,
            inventory_tags: Table::open(dir.join("inventory_tags.json"))?,
            object_acls: Table::open(dir.join("object_acls.json"))?,
            tag_permissions: Table::open(dir.join("tag_permissions.json"))?,
            service_acls: Table::open(dir.join("service_acls.json"))?,
            credential_access_rules: Table::open(dir.join("credential_access_rules.json"))?,
            blueprints: Table::open(dir.join("blueprints.json"))?,
            blueprint_deployments: Table::open(dir.join("blueprint_deployments.json"))?,
            audit_log: Table::open(dir.join("audit_log.json"))?,
            drift_reports: Table::open(dir.join("drift_reports.json"))?,
            metadata: MetadataStore::open(dir.join("meta.json"))?,
            txn_lock: Mutex::new(()),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let current = self
            .metadata
            .get(SCHEMA_VERSION_KEY)
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        if current < 1 {
            migrations::rename_jumphost_to_instance_cleanup(&self.schedules)?;
            migrations::seed_personal_instance_cleanup(&self.schedules)?;
        }

        if current < SCHEMA_VERSION {
            self.metadata
                .set(SCHEMA_VERSION_KEY, serde_json::json!(SCHEMA_VERSION))?;
            tracing::info!(from = current, to = SCHEMA_VERSION, "store migrated");
        }
        Ok(())
    }

    /// Run `f` while holding the store's write lock, so the closure's
    /// sequence of table writes (e.g. "write a job row, then append an
    /// audit log entry") is never interleaved with another transaction's.
    /// Each individual table write still commits to disk as it happens;
    /// if `f` returns `Err` after partially writing, earlier writes in this
    /// call are **not** rolled back — callers needing that guarantee must
    /// order their writes so the last one is the one that, if missing,
    /// leaves the system in a safe state (e.g. write the audit entry last).
    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        let _guard = self.txn_lock.lock().unwrap_or_else(|e| e.into_inner());
        f(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clm_domain::model::{JobTypeSpec, ScheduledJob as Sched};

    #[test]
    fn open_seeds_personal_instance_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let rows = store.schedules.list();
        assert!(rows
            .iter()
            .any(|s| s.name == Sched::PERSONAL_INSTANCE_CLEANUP_NAME));
    }

    #[test]
    fn reopen_does_not_duplicate_seed() {
        let dir = tempfile::tempdir().unwrap();
        {
            Store::open(dir.path()).unwrap();
        }
        let store = Store::open(dir.path()).unwrap();
        let count = store
            .schedules
            .list()
            .iter()
            .filter(|s| s.name == Sched::PERSONAL_INSTANCE_CLEANUP_NAME)
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn transaction_runs_closure_and_returns_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let mut job_id = None;
        let result = store.transaction(|s| {
            let job = clm_domain::model::Job::new(
                "demo",
                "deploy",
                Some("deploy".into()),
                None,
                None,
                std::collections::HashMap::new(),
            );
            job_id = Some(job.id);
            s.jobs.insert(job.id, job)?;
            audit::log_action(
                &s.audit_log,
                None,
                Some("system".into()),
                "job.dispatch",
                Some("service:demo".into()),
                None,
                None,
            )
        });
        assert!(result.is_ok());
        assert!(store.jobs.get(&job_id.unwrap()).is_some());
        assert_eq!(store.audit_log.list().len(), 1);
    }

    #[test]
    fn schedule_spec_survives_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let row = store
            .schedules
            .list()
            .into_iter()
            .find(|s| s.name == Sched::PERSONAL_INSTANCE_CLEANUP_NAME)
            .unwrap();
        assert!(matches!(row.spec, JobTypeSpec::SystemTask { .. }));
    }
}
