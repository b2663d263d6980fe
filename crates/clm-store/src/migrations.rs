//! Idempotent startup migrations (SPEC_FULL.md §4.1).

use clm_domain::model::{JobTypeSpec, ScheduledJob};
use clm_domain::Result;

use crate::table::Table;

/// Rename the legacy `personal_jumphost_cleanup` schedule to
/// `personal_instance_cleanup` in place, preserving its row id
/// (TESTABLE PROPERTY 6). Running this twice is a no-op on the second call.
pub fn rename_jumphost_to_instance_cleanup(table: &Table<ScheduledJob>) -> Result<()> {
    let legacy = table
        .list()
        .into_iter()
        .find(|s| s.name == "personal_jumphost_cleanup");
    let Some(legacy) = legacy else {
        return Ok(());
    };
    let id = legacy.id;
    table.update(&id, |row| {
        row.name = ScheduledJob::PERSONAL_INSTANCE_CLEANUP_NAME.to_string();
    })?;
    Ok(())
}

/// Seed the built-in personal-instance TTL cleanup schedule if no row with
/// its name exists yet. Seeding twice yields exactly one row
/// (TESTABLE PROPERTY 6).
pub fn seed_personal_instance_cleanup(table: &Table<ScheduledJob>) -> Result<()> {
    let exists = table
        .list()
        .iter()
        .any(|s| s.name == ScheduledJob::PERSONAL_INSTANCE_CLEANUP_NAME);
    if exists {
        return Ok(());
    }
    let now = chrono::Utc::now();
    let row = ScheduledJob {
        id: uuid::Uuid::new_v4(),
        name: ScheduledJob::PERSONAL_INSTANCE_CLEANUP_NAME.to_string(),
        description: "Destroy expired personal instances".to_string(),
        spec: JobTypeSpec::SystemTask {
            task_name: "personal_instance_cleanup".to_string(),
        },
        cron_expression: ScheduledJob::PERSONAL_INSTANCE_CLEANUP_CRON.to_string(),
        timezone: "UTC".to_string(),
        is_enabled: true,
        skip_if_running: true,
        missed_policy: clm_domain::model::MissedPolicy::Skip,
        max_catchup_runs: 1,
        next_run_at: now,
        last_run_at: None,
        last_job_id: None,
        consecutive_failures: 0,
        cooldown_until: None,
        created_at: now,
        updated_at: now,
    };
    table.insert(row.id, row)
}
