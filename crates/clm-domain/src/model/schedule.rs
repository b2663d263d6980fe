use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ScheduledJob
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A cron-governed recurring job specification — not a job itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "job_type", rename_all = "snake_case")]
pub enum JobTypeSpec {
    ServiceScript {
        service_name: String,
        script_name: String,
        #[serde(default)]
        inputs: HashMap<String, String>,
    },
    SystemTask {
        task_name: String,
    },
    InventoryAction {
        type_slug: String,
        action_name: String,
        object_id: Uuid,
        #[serde(default)]
        inputs: HashMap<String, String>,
    },
}

impl JobTypeSpec {
    /// The key used by the scheduler's skip-if-running collision check
    /// (SPEC_FULL.md §4.5 — matched by name/type, not ScheduledJob id).
    pub fn collision_key(&self) -> String {
        match self {
            JobTypeSpec::ServiceScript {
                service_name,
                script_name,
                ..
            } => format!("service_script:{service_name}:{script_name}"),
            JobTypeSpec::SystemTask { task_name } => format!("system_task:{task_name}"),
            JobTypeSpec::InventoryAction {
                type_slug,
                action_name,
                ..
            } => format!("inventory_action:{type_slug}:{action_name}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissedPolicy {
    Skip,
    RunOnce,
    CatchUp,
}

impl Default for MissedPolicy {
    fn default() -> Self {
        Self::RunOnce
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    #[serde(flatten)]
    pub spec: JobTypeSpec,
    pub cron_expression: String,
    #[serde(default = "d_timezone")]
    pub timezone: String,
    pub is_enabled: bool,
    #[serde(default = "d_true")]
    pub skip_if_running: bool,
    #[serde(default)]
    pub missed_policy: MissedPolicy,
    #[serde(default = "d_max_catchup")]
    pub max_catchup_runs: usize,
    pub next_run_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_job_id: Option<Uuid>,
    pub consecutive_failures: u32,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
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

impl ScheduledJob {
    /// Seeded name for the built-in personal-instance TTL cleanup schedule
    /// (SPEC_FULL.md §4.5), kept stable across the
    /// `personal_jumphost_cleanup` → `personal_instance_cleanup` rename so
    /// that re-seeding preserves the row's id (TESTABLE PROPERTY 6).
    pub const PERSONAL_INSTANCE_CLEANUP_NAME: &'static str = "personal_instance_cleanup";
    pub const PERSONAL_INSTANCE_CLEANUP_CRON: &'static str = "*/15 * * * *";
}
