//! Job Runner (spec.md §4.3, C4): dispatches service scripts as subprocesses
//! and tracks them through to a terminal status.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

use clm_domain::config::JobsConfig;
use clm_domain::model::{BulkDispatchResult, Job, JobFilter, JobStatus, SkippedEntry};
use clm_domain::{Error, Result};
use clm_store::Store;

use crate::spawn::{spawn_and_monitor, SpawnSpec};

/// Owns the set of subprocess kill-channels for jobs this process has
/// itself spawned. The persisted `Job` rows in [`Store`] are the source of
/// truth for status/output; this map only exists because kill channels
/// aren't serializable (mirrors `ProcessManager`'s session registry in
/// `crates/tools/src/manager.rs`).
pub struct JobRunner {
    store: Arc<Store>,
    config: JobsConfig,
    services_dir: PathBuf,
    running: RwLock<HashMap<Uuid, mpsc::Sender<()>>>,
}

impl JobRunner {
    pub fn new(store: Arc<Store>, config: JobsConfig, services_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            config,
            services_dir: services_dir.into(),
            running: RwLock::new(HashMap::new()),
        }
    }

    pub fn service_dir(&self, service: &str) -> PathBuf {
        self.services_dir.join(service)
    }

    pub fn service_exists(&self, service: &str) -> bool {
        self.service_dir(service).is_dir()
    }

    /// Resolve a script name to an executable path. Scripts are stored as
    /// `<name>.sh`; callers may also pass the name with the extension
    /// already stripped, matching `personal_instance_cleanup.py`'s
    /// `destroy_script.replace(".sh", "")` convention.
    fn resolve_script(&self, service: &str, script: &str) -> PathBuf {
        let dir = self.service_dir(service);
        let with_ext = dir.join(format!("{script}.sh"));
        if with_ext.is_file() {
            with_ext
        } else {
            dir.join(script)
        }
    }

    /// True if a `running` job already targets this exact destroy action —
    /// used to dedup TTL cleanup and bulk-stop fan-out (spec.md §4.3
    /// "Deduplication").
    pub fn has_running_destroy_job(&self, hostname: &str) -> bool {
        self.store.jobs.list().into_iter().any(|j| {
            j.status == JobStatus::Running
                && j.script.as_deref() == Some("destroy")
                && j.inputs.get("hostname").map(String::as_str) == Some(hostname)
        })
    }

    /// Core single-job dispatch: persists a `running` Job row, then spawns
    /// the subprocess and hands its kill channel to `running`.
    fn dispatch(
        &self,
        service: impl Into<String>,
        action: impl Into<String>,
        script: Option<String>,
        user_id: Option<Uuid>,
        username: Option<String>,
        inputs: HashMap<String, String>,
        parent_job_id: Option<Uuid>,
    ) -> Result<Job> {
        let service = service.into();
        let script_name = script.clone().unwrap_or_else(|| action.into());
        let mut job = Job::new(service.clone(), script_name.clone(), script.clone(), user_id, username, inputs.clone());
        job.parent_job_id = parent_job_id;
        self.store.jobs.insert(job.id, job.clone())?;

        let script_path = self.resolve_script(&service, script.as_deref().unwrap_or(&script_name));
        let spec = SpawnSpec {
            argv: vec![script_path.to_string_lossy().into_owned()],
            cwd: self.service_dir(&service),
            env: inputs
                .into_iter()
                .map(|(k, v)| (k.to_ascii_uppercase(), v))
                .collect(),
        };

        let kill_tx = spawn_and_monitor(self.store.clone(), self.config.clone(), job.id, spec);
        self.running.write().insert(job.id, kill_tx);
        Ok(job)
    }

    pub fn deploy_service(
        &self,
        service: &str,
        user_id: Option<Uuid>,
        username: Option<String>,
        inputs: HashMap<String, String>,
    ) -> Result<Job> {
        if !self.service_exists(service) {
            return Err(Error::NotFound(format!("service '{service}' not found")));
        }
        self.dispatch(service, "deploy", Some("deploy".into()), user_id, username, inputs, None)
    }

    pub fn run_script(
        &self,
        service: &str,
        script: &str,
        inputs: HashMap<String, String>,
        user_id: Option<Uuid>,
        username: Option<String>,
    ) -> Result<Job> {
        if !self.service_exists(service) {
            return Err(Error::NotFound(format!("service '{service}' not found")));
        }
        self.dispatch(service, script, Some(script.to_string()), user_id, username, inputs, None)
    }

    pub fn stop_service(&self, service: &str, user_id: Option<Uuid>, username: Option<String>) -> Result<Job> {
        if !self.service_exists(service) {
            return Err(Error::NotFound(format!("service '{service}' not found")));
        }
        self.dispatch(service, "stop", Some("stop".into()), user_id, username, HashMap::new(), None)
    }

    /// `label`/`region` identify the cloud instance to destroy; both are
    /// threaded through as `inputs` so the destroy script (and the
    /// dedup scan) can key on `hostname`.
    pub fn stop_instance(
        &self,
        label: &str,
        region: &str,
        user_id: Option<Uuid>,
        username: Option<String>,
    ) -> Result<Job> {
        if self.has_running_destroy_job(label) {
            return Err(Error::Conflict(format!("a destroy job for '{label}' is already running")));
        }
        let mut inputs = HashMap::new();
        inputs.insert("hostname".to_string(), label.to_string());
        inputs.insert("region".to_string(), region.to_string());
        self.dispatch(label, "destroy", Some("destroy".into()), user_id, username, inputs, None)
    }

    pub fn refresh_instances(&self, user_id: Option<Uuid>, username: Option<String>) -> Result<Job> {
        self.run_system_task("refresh_instances", user_id, username)
    }

    /// Dispatch one of the scheduler's fixed named system routines
    /// (spec.md §4.5) as a subprocess under the conventional `system`
    /// service directory — the cloud-provider call itself lives in that
    /// script, never in this process (spec.md's Non-goals treat cloud SDKs
    /// as opaque command invocations).
    pub fn run_system_task(&self, task_name: &str, user_id: Option<Uuid>, username: Option<String>) -> Result<Job> {
        self.dispatch("system", task_name, None, user_id, username, HashMap::new(), None)
    }

    pub fn bulk_stop(
        &self,
        services: Vec<String>,
        user_id: Option<Uuid>,
        username: Option<String>,
    ) -> Result<BulkDispatchResult> {
        self.bulk_dispatch(services, "bulk_stop", user_id, username, |runner, name, uid, uname| {
            runner.stop_service(name, uid, uname)
        })
    }

    pub fn bulk_deploy(
        &self,
        services: Vec<String>,
        user_id: Option<Uuid>,
        username: Option<String>,
    ) -> Result<BulkDispatchResult> {
        self.bulk_dispatch(services, "bulk_deploy", user_id, username, |runner, name, uid, uname| {
            runner.deploy_service(name, uid, uname, HashMap::new())
        })
    }

    fn bulk_dispatch(
        &self,
        services: Vec<String>,
        action: &str,
        user_id: Option<Uuid>,
        username: Option<String>,
        dispatch_one: impl Fn(&Self, &str, Option<Uuid>, Option<String>) -> Result<Job>,
    ) -> Result<BulkDispatchResult> {
        let mut parent = Job::new(
            format!("bulk ({} services)", services.len()),
            action,
            None,
            user_id,
            username.clone(),
            HashMap::new(),
        );
        self.store.jobs.insert(parent.id, parent.clone())?;

        let mut succeeded = Vec::new();
        let mut skipped = Vec::new();
        let mut child_ids = Vec::new();
        for name in &services {
            if !self.service_exists(name) {
                skipped.push(SkippedEntry {
                    name: name.clone(),
                    reason: "unknown service".to_string(),
                });
                continue;
            }
            match dispatch_one(self, name, user_id, username.clone()) {
                Ok(child) => {
                    self.store.jobs.update(&child.id, |j| j.parent_job_id = Some(parent.id))?;
                    child_ids.push(child.id);
                    succeeded.push(name.clone());
                }
                Err(e) => skipped.push(SkippedEntry {
                    name: name.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        // The parent itself has no subprocess; a supervisor task watches
        // every dispatched child to its own terminal status and only then
        // resolves the parent — "completed iff every child did, else
        // failed" (spec.md §4.3). Unknown-service skips don't enter into
        // that verdict, only dispatched children do.
        self.store.jobs.insert(parent.id, parent.clone())?;
        if child_ids.is_empty() {
            parent.finish(JobStatus::Completed);
            self.store.jobs.insert(parent.id, parent.clone())?;
        } else {
            let store = self.store.clone();
            let parent_id = parent.id;
            tokio::spawn(async move {
                loop {
                    let children: Vec<_> = child_ids
                        .iter()
                        .filter_map(|id| store.jobs.get(id))
                        .collect();
                    if children.iter().all(|j| j.status.is_terminal()) {
                        let all_completed = children.iter().all(|j| j.status == JobStatus::Completed);
                        let status = if all_completed { JobStatus::Completed } else { JobStatus::Failed };
                        let _ = store.jobs.update(&parent_id, |p| p.finish(status));
                        break;
                    }
                    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                }
            });
        }

        Ok(BulkDispatchResult {
            total: services.len(),
            job_id: Some(parent.id),
            succeeded,
            skipped,
        })
    }

    /// Re-dispatch a job's original service/script/inputs as an
    /// independent job (no parent link). Authorization against the
    /// current user is the caller's responsibility (clm-authz), since the
    /// Runner has no notion of identity beyond the username it stamps.
    pub fn rerun(&self, job_id: Uuid, user_id: Option<Uuid>, username: Option<String>) -> Result<Job> {
        let original = self
            .store
            .jobs
            .get(&job_id)
            .ok_or_else(|| Error::NotFound(format!("job {job_id} not found")))?;
        self.dispatch(
            original.service.clone(),
            original.action.clone(),
            original.script.clone(),
            user_id,
            username,
            original.inputs.clone(),
            None,
        )
    }

    pub fn get_job(&self, job_id: Uuid) -> Option<Job> {
        self.store.jobs.get(&job_id)
    }

    /// `filter.parent_job_id` restricts results to children of that job,
    /// excluding the parent row itself (spec.md §4.3).
    pub fn list_jobs(&self, filter: JobFilter) -> Vec<Job> {
        self.store
            .jobs
            .list()
            .into_iter()
            .filter(|j| match &filter.parent_job_id {
                Some(pid) => j.parent_job_id == Some(*pid),
                None => true,
            })
            .filter(|j| match filter.user_id {
                Some(uid) => j.user_id == Some(uid),
                None => true,
            })
            .filter(|j| match filter.status {
                Some(status) => j.status == status,
                None => true,
            })
            .collect()
    }

    /// Send a cancellation signal to a running job's monitor task. The Job
    /// stays `running` until the monitor observes the child's exit and
    /// flips status to `cancelled` after the configured grace period.
    pub fn cancel(&self, job_id: Uuid) -> Result<()> {
        let tx = self
            .running
            .read()
            .get(&job_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no running job {job_id} tracked by this process")))?;
        let _ = tx.try_send(());
        Ok(())
    }

    /// Any `Job` row persisted as `running` at process startup belonged to
    /// a prior process lifetime with no live subprocess attached to it —
    /// rewrite it to `failed` (spec.md §9 Design Note).
    pub fn rehydrate(&self) -> Result<usize> {
        let stale: Vec<Uuid> = self
            .store
            .jobs
            .list()
            .into_iter()
            .filter(|j| j.status == JobStatus::Running)
            .map(|j| j.id)
            .collect();
        for id in &stale {
            self.store.jobs.update(id, |job| {
                job.output.push_line("[orphaned: no subprocess survives a process restart]");
                job.finish(JobStatus::Failed);
            })?;
        }
        Ok(stale.len())
    }
}
