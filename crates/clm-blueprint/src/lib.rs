//! Blueprint Orchestrator (spec.md §4.4, component C5): deploys the
//! services named by a [`Blueprint`] one at a time, in order, recording
//! per-service progress on a [`BlueprintDeployment`] row.
//!
//! Grounded on `examples/original_source/app/blueprint_orchestrator.py`'s
//! `deploy_blueprint`: a sequential loop that dispatches one service,
//! polls its job to a terminal status, records `progress[name]`, and stops
//! at the first failure rather than rolling anything back.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use clm_domain::model::{BlueprintDeploymentStatus, JobStatus, StepStatus};
use clm_domain::{Error, Result};
use clm_jobs::JobRunner;
use clm_store::Store;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Create a `pending` [`BlueprintDeployment`] row for `blueprint_id` and
/// hand off the actual sequential deploy to a background task. Returns the
/// deployment id immediately so the caller can poll it via the store.
pub fn start_deployment(
    store: Arc<Store>,
    runner: Arc<JobRunner>,
    blueprint_id: Uuid,
    deployed_by: Option<Uuid>,
) -> Result<Uuid> {
    if store.blueprints.get(&blueprint_id).is_none() {
        return Err(Error::NotFound(format!("blueprint {blueprint_id} not found")));
    }

    let deployment = clm_domain::model::BlueprintDeployment::new(blueprint_id, deployed_by);
    let deployment_id = deployment.id;
    store.blueprint_deployments.insert(deployment_id, deployment)?;

    tokio::spawn(async move {
        run_deployment(store, runner, deployment_id).await;
    });

    Ok(deployment_id)
}

pub fn get_deployment(store: &Store, deployment_id: Uuid) -> Option<clm_domain::model::BlueprintDeployment> {
    store.blueprint_deployments.get(&deployment_id)
}

/// The sequential deploy loop itself. Never returns an error — any
/// failure along the way is recorded on the deployment row, matching the
/// original's outer `except Exception` fallback that marks the deployment
/// `failed` rather than propagating.
async fn run_deployment(store: Arc<Store>, runner: Arc<JobRunner>, deployment_id: Uuid) {
    let blueprint = {
        let Some(dep) = store.blueprint_deployments.get(&deployment_id) else {
            return;
        };
        match store.blueprints.get(&dep.blueprint_id) {
            Some(b) => b,
            None => {
                fail_deployment(&store, deployment_id);
                return;
            }
        }
    };

    let marked = store.blueprint_deployments.update(&deployment_id, |dep| {
        dep.status = BlueprintDeploymentStatus::Running;
        dep.started_at = Some(chrono::Utc::now());
    });
    if matches!(marked, Err(_) | Ok(false)) {
        return;
    }

    let deployed_by = store
        .blueprint_deployments
        .get(&deployment_id)
        .and_then(|d| d.deployed_by);

    let mut all_ok = true;

    for entry in &blueprint.services {
        let _ = store.blueprint_deployments.update(&deployment_id, |dep| {
            dep.progress.insert(entry.name.clone(), StepStatus::Running);
        });

        if !runner.service_exists(&entry.name) {
            let _ = store.blueprint_deployments.update(&deployment_id, |dep| {
                dep.progress.insert(entry.name.clone(), StepStatus::Failed);
            });
            all_ok = false;
            break;
        }

        let job = match runner.deploy_service(&entry.name, deployed_by, None, entry.inputs.clone()) {
            Ok(job) => job,
            Err(_) => {
                let _ = store.blueprint_deployments.update(&deployment_id, |dep| {
                    dep.progress.insert(entry.name.clone(), StepStatus::Failed);
                });
                all_ok = false;
                break;
            }
        };
        let _ = store.blueprint_deployments.update(&deployment_id, |dep| {
            dep.job_ids.push(job.id);
        });

        let finished = poll_until_terminal(&store, job.id).await;
        let step_status = if finished.status == JobStatus::Completed {
            StepStatus::Completed
        } else {
            StepStatus::Failed
        };
        let _ = store.blueprint_deployments.update(&deployment_id, |dep| {
            dep.progress.insert(entry.name.clone(), step_status);
        });

        if step_status == StepStatus::Failed {
            all_ok = false;
            break;
        }
    }

    let final_status = if all_ok {
        BlueprintDeploymentStatus::Completed
    } else {
        BlueprintDeploymentStatus::Partial
    };
    let _ = store.blueprint_deployments.update(&deployment_id, |dep| {
        dep.status = final_status;
        dep.finished_at = Some(chrono::Utc::now());
    });
}

async fn poll_until_terminal(store: &Store, job_id: Uuid) -> clm_domain::model::Job {
    loop {
        if let Some(job) = store.jobs.get(&job_id) {
            if job.status.is_terminal() {
                return job;
            }
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn fail_deployment(store: &Store, deployment_id: Uuid) {
    let _ = store.blueprint_deployments.update(&deployment_id, |dep| {
        dep.status = BlueprintDeploymentStatus::Failed;
        dep.finished_at = Some(chrono::Utc::now());
    });
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::os::unix::fs::PermissionsExt;

    use clm_domain::config::JobsConfig;
    use clm_domain::model::{Blueprint, BlueprintServiceEntry};

    use super::*;

    fn write_script(service_dir: &std::path::Path, name: &str, body: &str) {
        std::fs::create_dir_all(service_dir).unwrap();
        let path = service_dir.join(format!("{name}.sh"));
        std::fs::write(&path, body).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
    }

    fn fast_config() -> JobsConfig {
        JobsConfig {
            flush_interval_ms: 20,
            timeout_sec: 5,
            kill_grace_sec: 1,
            ..JobsConfig::default()
        }
    }

    async fn wait_deployment_terminal(
        store: &Store,
        deployment_id: Uuid,
    ) -> clm_domain::model::BlueprintDeployment {
        for _ in 0..200 {
            if let Some(dep) = store.blueprint_deployments.get(&deployment_id) {
                if dep.status != BlueprintDeploymentStatus::Pending && dep.status != BlueprintDeploymentStatus::Running {
                    return dep;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("deployment {deployment_id} never reached a terminal state");
    }

    #[tokio::test]
    async fn deployment_completes_when_every_service_deploys_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("data")).unwrap());
        let services_dir = dir.path().join("services");
        write_script(&services_dir.join("a"), "deploy", "#!/bin/sh\nexit 0\n");
        write_script(&services_dir.join("b"), "deploy", "#!/bin/sh\nexit 0\n");
        let runner = Arc::new(JobRunner::new(store.clone(), fast_config(), services_dir));

        let blueprint = Blueprint {
            id: Uuid::new_v4(),
            name: "demo".into(),
            services: vec![
                BlueprintServiceEntry { name: "a".into(), inputs: HashMap::new() },
                BlueprintServiceEntry { name: "b".into(), inputs: HashMap::new() },
            ],
        };
        store.blueprints.insert(blueprint.id, blueprint.clone()).unwrap();

        let deployment_id = start_deployment(store.clone(), runner, blueprint.id, None).unwrap();
        let finished = wait_deployment_terminal(&store, deployment_id).await;

        assert_eq!(finished.status, BlueprintDeploymentStatus::Completed);
        assert_eq!(finished.progress.get("a"), Some(&StepStatus::Completed));
        assert_eq!(finished.progress.get("b"), Some(&StepStatus::Completed));
        assert_eq!(finished.job_ids.len(), 2);
    }

    #[tokio::test]
    async fn deployment_stops_at_first_failure_without_rolling_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("data")).unwrap());
        let services_dir = dir.path().join("services");
        write_script(&services_dir.join("a"), "deploy", "#!/bin/sh\nexit 0\n");
        write_script(&services_dir.join("b"), "deploy", "#!/bin/sh\nexit 1\n");
        write_script(&services_dir.join("c"), "deploy", "#!/bin/sh\nexit 0\n");
        let runner = Arc::new(JobRunner::new(store.clone(), fast_config(), services_dir));

        let blueprint = Blueprint {
            id: Uuid::new_v4(),
            name: "demo".into(),
            services: vec![
                BlueprintServiceEntry { name: "a".into(), inputs: HashMap::new() },
                BlueprintServiceEntry { name: "b".into(), inputs: HashMap::new() },
                BlueprintServiceEntry { name: "c".into(), inputs: HashMap::new() },
            ],
        };
        store.blueprints.insert(blueprint.id, blueprint.clone()).unwrap();

        let deployment_id = start_deployment(store.clone(), runner, blueprint.id, None).unwrap();
        let finished = wait_deployment_terminal(&store, deployment_id).await;

        assert_eq!(finished.status, BlueprintDeploymentStatus::Partial);
        assert_eq!(finished.progress.get("a"), Some(&StepStatus::Completed));
        assert_eq!(finished.progress.get("b"), Some(&StepStatus::Failed));
        assert!(!finished.progress.contains_key("c"));
    }

    #[tokio::test]
    async fn deployment_fails_outright_when_a_service_has_no_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("data")).unwrap());
        let services_dir = dir.path().join("services");
        let runner = Arc::new(JobRunner::new(store.clone(), fast_config(), services_dir));

        let blueprint = Blueprint {
            id: Uuid::new_v4(),
            name: "demo".into(),
            services: vec![BlueprintServiceEntry { name: "missing".into(), inputs: HashMap::new() }],
        };
        store.blueprints.insert(blueprint.id, blueprint.clone()).unwrap();

        let deployment_id = start_deployment(store.clone(), runner, blueprint.id, None).unwrap();
        let finished = wait_deployment_terminal(&store, deployment_id).await;

        assert_eq!(finished.status, BlueprintDeploymentStatus::Partial);
        assert_eq!(finished.progress.get("missing"), Some(&StepStatus::Failed));
    }

    #[tokio::test]
    async fn starting_a_deployment_for_an_unknown_blueprint_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("data")).unwrap());
        let runner = Arc::new(JobRunner::new(store.clone(), fast_config(), dir.path().join("services")));

        let result = start_deployment(store, runner, Uuid::new_v4(), None);
        assert!(result.is_err());
    }
}
