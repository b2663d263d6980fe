//! `job_type` dispatch (spec.md §4.5): translates a due [`ScheduledJob`]
//! into a Job Runner call.

use std::path::Path;

use clm_domain::model::{InventoryObject, JobTypeSpec, ScheduledJob};
use clm_domain::{Error, Result};
use clm_jobs::JobRunner;
use clm_store::Store;
use uuid::Uuid;

use crate::cleanup;

/// Named system routines the scheduler knows how to invoke directly rather
/// than by subprocess (spec.md §4.5's fixed registry).
const SUBPROCESS_SYSTEM_TASKS: &[&str] =
    &["refresh_instances", "refresh_costs", "snapshot_sync", "drift_check", "health_check"];

/// Fire the due schedule. Returns the primary dispatched job id, if any —
/// `personal_instance_cleanup` may dispatch zero, one, or many destroy
/// jobs and has no single representative id.
pub fn dispatch_due(store: &Store, runner: &JobRunner, services_dir: &Path, job: &ScheduledJob) -> Result<Option<Uuid>> {
    match &job.spec {
        JobTypeSpec::ServiceScript { service_name, script_name, inputs } => {
            let dispatched = runner.run_script(
                service_name,
                script_name,
                inputs.clone(),
                None,
                Some("scheduler".to_string()),
            )?;
            Ok(Some(dispatched.id))
        }
        JobTypeSpec::SystemTask { task_name } => dispatch_system_task(store, runner, services_dir, task_name),
        JobTypeSpec::InventoryAction { type_slug, action_name, object_id, inputs } => {
            dispatch_inventory_action(store, runner, type_slug, action_name, *object_id, inputs.clone())
        }
    }
}

fn dispatch_system_task(store: &Store, runner: &JobRunner, services_dir: &Path, task_name: &str) -> Result<Option<Uuid>> {
    if task_name == "personal_instance_cleanup" {
        let destroyed = cleanup::check_and_cleanup_expired(store, runner, services_dir);
        tracing::info!(count = destroyed.len(), "personal instance cleanup ran");
        return Ok(None);
    }
    if !SUBPROCESS_SYSTEM_TASKS.contains(&task_name) {
        return Err(Error::Validation(format!("unknown system task '{task_name}'")));
    }
    let job = runner.run_system_task(task_name, None, Some("scheduler".to_string()))?;
    Ok(Some(job.id))
}

/// Only `type_slug == "service"` has a defined handler: resolve the
/// object's service name and run the named script through the Job Runner.
/// Other inventory types have no action handler registered anywhere in
/// this system.
fn dispatch_inventory_action(
    store: &Store,
    runner: &JobRunner,
    type_slug: &str,
    action_name: &str,
    object_id: Uuid,
    inputs: std::collections::HashMap<String, String>,
) -> Result<Option<Uuid>> {
    if type_slug != "service" {
        return Err(Error::Validation(format!(
            "no inventory action handler registered for type '{type_slug}'"
        )));
    }
    let object: InventoryObject = store
        .inventory_objects
        .get(&object_id)
        .ok_or_else(|| Error::NotFound(format!("inventory object {object_id} not found")))?;
    let service_name = object
        .data
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Validation("service inventory object missing 'name'".to_string()))?;
    let job = runner.run_script(service_name, action_name, inputs, None, Some("scheduler".to_string()))?;
    Ok(Some(job.id))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;

    use clm_domain::config::JobsConfig;
    use clm_domain::model::{InventoryObject, InventoryType};

    use super::*;

    fn write_script(service_dir: &Path, name: &str, body: &str) {
        std::fs::create_dir_all(service_dir).unwrap();
        let path = service_dir.join(format!("{name}.sh"));
        std::fs::write(&path, body).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
    }

    #[test]
    fn service_script_dispatch_returns_job_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("data")).unwrap());
        let services_dir = dir.path().join("services");
        write_script(&services_dir.join("demo"), "deploy", "#!/bin/sh\nexit 0\n");
        let runner = JobRunner::new(store.clone(), JobsConfig::default(), services_dir.clone());

        let job = ScheduledJob {
            id: Uuid::new_v4(),
            name: "nightly-deploy".into(),
            description: String::new(),
            spec: JobTypeSpec::ServiceScript {
                service_name: "demo".into(),
                script_name: "deploy".into(),
                inputs: HashMap::new(),
            },
            cron_expression: "0 3 * * *".into(),
            timezone: "UTC".into(),
            is_enabled: true,
            skip_if_running: true,
            missed_policy: clm_domain::model::MissedPolicy::RunOnce,
            max_catchup_runs: 5,
            next_run_at: chrono::Utc::now(),
            last_run_at: None,
            last_job_id: None,
            consecutive_failures: 0,
            cooldown_until: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };

        let dispatched = dispatch_due(&store, &runner, &services_dir, &job).unwrap();
        assert!(dispatched.is_some());
    }

    #[test]
    fn unknown_system_task_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("data")).unwrap());
        let runner = JobRunner::new(store.clone(), JobsConfig::default(), dir.path().join("services"));

        let result = dispatch_system_task(&store, &runner, &dir.path().join("services"), "not_a_real_task");
        assert!(result.is_err());
    }

    #[test]
    fn personal_instance_cleanup_task_returns_no_single_job_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("data")).unwrap());
        let services_dir = dir.path().join("services");
        let runner = JobRunner::new(store.clone(), JobsConfig::default(), services_dir.clone());

        let result = dispatch_system_task(&store, &runner, &services_dir, "personal_instance_cleanup").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn inventory_action_for_non_service_type_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("data")).unwrap());
        let runner = JobRunner::new(store.clone(), JobsConfig::default(), dir.path().join("services"));

        let result = dispatch_inventory_action(&store, &runner, "server", "reboot", Uuid::new_v4(), HashMap::new());
        assert!(result.is_err());
    }

    #[test]
    fn inventory_action_for_service_resolves_and_dispatches() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("data")).unwrap());
        let services_dir = dir.path().join("services");
        write_script(&services_dir.join("demo"), "restart", "#!/bin/sh\nexit 0\n");
        let runner = JobRunner::new(store.clone(), JobsConfig::default(), services_dir.clone());

        let service_type = InventoryType {
            id: Uuid::new_v4(),
            slug: "service".into(),
            label: "Service".into(),
            icon: "service".into(),
            config_hash: String::new(),
            fields_schema: serde_json::json!({}),
        };
        store.inventory_types.insert(service_type.id, service_type.clone()).unwrap();
        let object = InventoryObject {
            id: Uuid::new_v4(),
            type_id: service_type.id,
            data: serde_json::json!({"name": "demo"}),
            search_text: "demo".into(),
            tag_ids: Vec::new(),
            created_at: chrono::Utc::now(),
        };
        store.inventory_objects.insert(object.id, object.clone()).unwrap();

        let result = dispatch_inventory_action(&store, &runner, "service", "restart", object.id, HashMap::new());
        assert!(result.unwrap().is_some());
    }
}
