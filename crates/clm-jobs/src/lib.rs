//! Job Runner for CloudLab Manager (spec.md §4.3, component C4).
//!
//! Grounded on `crates/tools/src/{exec.rs,manager.rs}`'s subprocess-spawn
//! and process-tracking idiom, generalized from an interactive shell-exec
//! tool to CloudLab's fixed set of service-script operations.

pub mod runner;
pub mod spawn;

pub use runner::JobRunner;

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;

    use clm_domain::config::JobsConfig;
    use clm_domain::model::{JobFilter, JobStatus};
    use clm_store::Store;

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
            max_output_chars: 1024 * 1024,
            timeout_sec: 5,
            kill_grace_sec: 1,
            flush_interval_ms: 20,
            env_blocklist: JobsConfig::default().env_blocklist,
        }
    }

    async fn wait_terminal(runner: &JobRunner, job_id: uuid::Uuid) -> clm_domain::model::Job {
        for _ in 0..100 {
            if let Some(job) = runner.get_job(job_id) {
                if job.status.is_terminal() {
                    return job;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("job {job_id} never reached a terminal state");
    }

    #[tokio::test]
    async fn deploy_service_completes_on_exit_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("data")).unwrap());
        let services_dir = dir.path().join("services");
        write_script(&services_dir.join("demo"), "deploy", "#!/bin/sh\necho hello\nexit 0\n");

        let runner = JobRunner::new(store, fast_config(), services_dir);
        let job = runner.deploy_service("demo", None, None, HashMap::new()).unwrap();
        let finished = wait_terminal(&runner, job.id).await;

        assert_eq!(finished.status, JobStatus::Completed);
        assert!(finished.output.as_str().contains("hello"));
        assert!(finished.finished_at.is_some());
    }

    #[tokio::test]
    async fn run_script_fails_on_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("data")).unwrap());
        let services_dir = dir.path().join("services");
        write_script(&services_dir.join("demo"), "flaky", "#!/bin/sh\nexit 1\n");

        let runner = JobRunner::new(store, fast_config(), services_dir);
        let job = runner
            .run_script("demo", "flaky", HashMap::new(), None, None)
            .unwrap();
        let finished = wait_terminal(&runner, job.id).await;

        assert_eq!(finished.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn deploy_service_unknown_service_errors_without_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("data")).unwrap());
        let runner = JobRunner::new(store, fast_config(), dir.path().join("services"));

        let result = runner.deploy_service("nonexistent", None, None, HashMap::new());
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn bulk_deploy_skips_unknown_services_without_failing_known_ones() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("data")).unwrap());
        let services_dir = dir.path().join("services");
        write_script(&services_dir.join("a"), "deploy", "#!/bin/sh\nexit 0\n");

        let runner = JobRunner::new(store, fast_config(), services_dir);
        let result = runner
            .bulk_deploy(vec!["a".to_string(), "missing".to_string()], None, None)
            .unwrap();

        assert_eq!(result.total, 2);
        assert_eq!(result.succeeded, vec!["a".to_string()]);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].name, "missing");
    }

    #[tokio::test]
    async fn list_jobs_with_parent_filter_excludes_parent_row() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("data")).unwrap());
        let services_dir = dir.path().join("services");
        write_script(&services_dir.join("a"), "deploy", "#!/bin/sh\nexit 0\n");

        let runner = JobRunner::new(store, fast_config(), services_dir);
        let result = runner.bulk_deploy(vec!["a".to_string()], None, None).unwrap();
        let parent_id = result.job_id.unwrap();

        let children = runner.list_jobs(JobFilter {
            parent_job_id: Some(parent_id),
            user_id: None,
            status: None,
        });
        assert!(children.iter().all(|j| j.id != parent_id));
        assert_eq!(children.len(), 1);
    }

    #[tokio::test]
    async fn rerun_dispatches_independent_job_with_same_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("data")).unwrap());
        let services_dir = dir.path().join("services");
        write_script(&services_dir.join("demo"), "deploy", "#!/bin/sh\nexit 0\n");

        let runner = JobRunner::new(store, fast_config(), services_dir);
        let mut inputs = HashMap::new();
        inputs.insert("region".to_string(), "nyc".to_string());
        let original = runner
            .deploy_service("demo", None, None, inputs.clone())
            .unwrap();
        wait_terminal(&runner, original.id).await;

        let rerun = runner.rerun(original.id, None, None).unwrap();
        assert_ne!(rerun.id, original.id);
        assert!(rerun.parent_job_id.is_none());
        assert_eq!(rerun.inputs.get("region"), Some(&"nyc".to_string()));
    }

    #[tokio::test]
    async fn rehydrate_marks_stale_running_jobs_failed() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("data")).unwrap());
        let stuck = clm_domain::model::Job::new("demo", "deploy", Some("deploy".into()), None, None, HashMap::new());
        store.jobs.insert(stuck.id, stuck.clone()).unwrap();

        let runner = JobRunner::new(store.clone(), fast_config(), dir.path().join("services"));
        let count = runner.rehydrate().unwrap();

        assert_eq!(count, 1);
        assert_eq!(store.jobs.get(&stuck.id).unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn stop_instance_dedups_against_running_destroy_job() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("data")).unwrap());
        let services_dir = dir.path().join("services");
        write_script(&services_dir.join("host-1"), "destroy", "#!/bin/sh\nsleep 2\nexit 0\n");

        let runner = JobRunner::new(store, fast_config(), services_dir);
        let first = runner.stop_instance("host-1", "nyc", None, None);
        assert!(first.is_ok());

        let second = runner.stop_instance("host-1", "nyc", None, None);
        assert!(second.is_err());
    }
}
