//! The tick loop (spec.md §4.5): every 30s, evaluate due [`ScheduledJob`]
//! rows and dispatch them, advancing `next_run_at` before dispatch so a
//! crash mid-tick risks a missed run rather than a double run.
//!
//! Ported from `crates/gateway/src/runtime/schedule_runner.rs`'s
//! `ScheduleRunner::tick`, generalized to CloudLab's single-flight-per-job
//! model (`skip_if_running` keyed by [`JobTypeSpec::collision_key`]
//! rather than the teacher's per-schedule `max_concurrency` counter).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use clm_domain::model::{Job, JobStatus};
use clm_jobs::JobRunner;
use clm_store::Store;

use crate::catchup::{cooldown_minutes, runs_to_fire};
use crate::cron::{cron_next_tz, parse_tz};
use crate::dispatch::dispatch_due;

pub struct Scheduler {
    store: Arc<Store>,
    runner: Arc<JobRunner>,
    services_dir: PathBuf,
}

impl Scheduler {
    pub fn new(store: Arc<Store>, runner: Arc<JobRunner>, services_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            runner,
            services_dir: services_dir.into(),
        }
    }

    /// Run the tick loop until `shutdown` fires, sleeping `interval`
    /// between ticks (spec.md names 30s as the conventional cadence).
    pub async fn run(&self, interval: Duration, shutdown: tokio_util::sync::CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => self.tick(),
            }
        }
    }

    /// One evaluation pass over every enabled, due schedule. Synchronous:
    /// dispatch itself only spawns subprocesses, it doesn't await them.
    pub fn tick(&self) {
        let now = Utc::now();
        let due: Vec<_> = self
            .store
            .schedules
            .list()
            .into_iter()
            .filter(|s| s.is_enabled)
            .filter(|s| s.cooldown_until.map(|t| now >= t).unwrap_or(true))
            .filter(|s| s.next_run_at <= now)
            .collect();

        for schedule in due {
            self.evaluate_one(schedule, now);
        }
    }

    fn evaluate_one(&self, schedule: clm_domain::model::ScheduledJob, now: chrono::DateTime<Utc>) {
        let tz = parse_tz(&schedule.timezone);
        let next_after_this_tick = cron_next_tz(&schedule.cron_expression, &now, tz).unwrap_or(now);

        let n = runs_to_fire(
            schedule.missed_policy,
            &schedule.cron_expression,
            tz,
            schedule.last_run_at,
            &now,
            schedule.max_catchup_runs,
        );

        if n == 0 {
            tracing::debug!(schedule_id = %schedule.id, name = %schedule.name, "no runs to fire this tick, advancing next_run_at");
            let _ = self.store.schedules.update(&schedule.id, |s| {
                s.next_run_at = next_after_this_tick;
            });
            return;
        }

        if schedule.skip_if_running && self.collides_with_running(&schedule) {
            tracing::warn!(schedule_id = %schedule.id, name = %schedule.name, "skipped: a job of this type is already running");
            let _ = self.store.schedules.update(&schedule.id, |s| {
                s.next_run_at = next_after_this_tick;
            });
            return;
        }

        // Advance next_run_at (and last_run_at) before dispatch — a crash
        // between these two lines drops a run instead of duplicating one.
        let _ = self.store.schedules.update(&schedule.id, |s| {
            s.next_run_at = next_after_this_tick;
            s.last_run_at = Some(now);
        });

        let mut dispatched_id = None;
        let mut failed = false;
        for _ in 0..n {
            match dispatch_due(&self.store, &self.runner, &self.services_dir, &schedule) {
                Ok(id) => dispatched_id = id.or(dispatched_id),
                Err(e) => {
                    tracing::warn!(schedule_id = %schedule.id, error = %e, "scheduled dispatch failed");
                    failed = true;
                }
            }
        }

        self.record_outcome(schedule.id, dispatched_id, failed);
    }

    /// True if a currently-running Job shares this schedule's
    /// `collision_key` (matched by job type, not by `ScheduledJob` id —
    /// two different schedules targeting the same service/script still
    /// collide).
    fn collides_with_running(&self, schedule: &clm_domain::model::ScheduledJob) -> bool {
        let key = schedule.spec.collision_key();
        let filter = clm_domain::model::JobFilter {
            parent_job_id: None,
            user_id: None,
            status: None,
        };
        self.runner
            .list_jobs(filter)
            .into_iter()
            .any(|j| j.status == JobStatus::Running && job_collision_key(&j) == key)
    }

    /// Synchronous dispatch gives no terminal status yet for service-script
    /// and inventory-action jobs; failure bookkeeping only applies to the
    /// cases that can fail synchronously (dispatch() erroring before a
    /// subprocess is even spawned — unknown service, unknown system task).
    fn record_outcome(&self, schedule_id: Uuid, dispatched_id: Option<Uuid>, dispatch_failed: bool) {
        let _ = self.store.schedules.update(&schedule_id, |s| {
            s.last_job_id = dispatched_id.or(s.last_job_id);
            if dispatch_failed {
                s.consecutive_failures += 1;
                let cooldown = cooldown_minutes(s.consecutive_failures);
                if cooldown > 0 {
                    s.cooldown_until = Some(Utc::now() + chrono::Duration::minutes(cooldown as i64));
                }
            } else {
                s.consecutive_failures = 0;
                s.cooldown_until = None;
            }
        });
    }
}

fn job_collision_key(job: &Job) -> String {
    match job.script.as_deref() {
        Some(script) => format!("service_script:{}:{}", job.service, script),
        None => format!("system_task:{}", job.action),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::os::unix::fs::PermissionsExt;

    use clm_domain::config::JobsConfig;
    use clm_domain::model::{JobTypeSpec, MissedPolicy, ScheduledJob};

    use super::*;

    fn write_script(service_dir: &std::path::Path, name: &str, body: &str) {
        std::fs::create_dir_all(service_dir).unwrap();
        let path = service_dir.join(format!("{name}.sh"));
        std::fs::write(&path, body).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
    }

    fn seed_schedule(store: &Store, next_run_at: chrono::DateTime<Utc>) -> Uuid {
        let job = ScheduledJob {
            id: Uuid::new_v4(),
            name: "nightly".into(),
            description: String::new(),
            spec: JobTypeSpec::ServiceScript {
                service_name: "demo".into(),
                script_name: "deploy".into(),
                inputs: HashMap::new(),
            },
            cron_expression: "*/15 * * * *".into(),
            timezone: "UTC".into(),
            is_enabled: true,
            skip_if_running: true,
            missed_policy: MissedPolicy::RunOnce,
            max_catchup_runs: 5,
            next_run_at,
            last_run_at: None,
            last_job_id: None,
            consecutive_failures: 0,
            cooldown_until: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let id = job.id;
        store.schedules.insert(id, job).unwrap();
        id
    }

    #[test]
    fn due_schedule_dispatches_and_advances_next_run_at() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("data")).unwrap());
        let services_dir = dir.path().join("services");
        write_script(&services_dir.join("demo"), "deploy", "#!/bin/sh\nexit 0\n");
        let runner = Arc::new(JobRunner::new(store.clone(), JobsConfig::default(), services_dir.clone()));

        let id = seed_schedule(&store, Utc::now() - chrono::Duration::minutes(1));
        let scheduler = Scheduler::new(store.clone(), runner, services_dir);
        scheduler.tick();

        let updated = store.schedules.get(&id).unwrap();
        assert!(updated.next_run_at > Utc::now());
        assert!(updated.last_run_at.is_some());
    }

    #[test]
    fn not_yet_due_schedule_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("data")).unwrap());
        let services_dir = dir.path().join("services");
        let runner = Arc::new(JobRunner::new(store.clone(), JobsConfig::default(), services_dir.clone()));

        let future = Utc::now() + chrono::Duration::hours(1);
        let id = seed_schedule(&store, future);
        let scheduler = Scheduler::new(store.clone(), runner, services_dir);
        scheduler.tick();

        let unchanged = store.schedules.get(&id).unwrap();
        assert_eq!(unchanged.next_run_at, future);
        assert!(unchanged.last_run_at.is_none());
    }

    #[test]
    fn disabled_schedule_never_fires() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("data")).unwrap());
        let services_dir = dir.path().join("services");
        let runner = Arc::new(JobRunner::new(store.clone(), JobsConfig::default(), services_dir.clone()));

        let id = seed_schedule(&store, Utc::now() - chrono::Duration::minutes(1));
        store.schedules.update(&id, |s| s.is_enabled = false).unwrap();
        let scheduler = Scheduler::new(store.clone(), runner, services_dir);
        scheduler.tick();

        let unchanged = store.schedules.get(&id).unwrap();
        assert!(unchanged.last_run_at.is_none());
    }

    #[test]
    fn skip_if_running_collision_advances_without_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("data")).unwrap());
        let services_dir = dir.path().join("services");
        write_script(&services_dir.join("demo"), "deploy", "#!/bin/sh\nsleep 5\n");
        let runner = Arc::new(JobRunner::new(store.clone(), JobsConfig::default(), services_dir.clone()));

        // A running job with the same collision key, dispatched directly.
        runner.deploy_service("demo", None, None, HashMap::new()).unwrap();

        let id = seed_schedule(&store, Utc::now() - chrono::Duration::minutes(1));
        let scheduler = Scheduler::new(store.clone(), runner, services_dir);
        scheduler.tick();

        let updated = store.schedules.get(&id).unwrap();
        // Still advances so the tick doesn't re-evaluate forever.
        assert!(updated.next_run_at > Utc::now());
        assert!(updated.last_run_at.is_none());
    }

    #[test]
    fn failed_dispatch_sets_cooldown() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("data")).unwrap());
        let services_dir = dir.path().join("services");
        // No "demo" service directory created — dispatch will fail with NotFound.
        let runner = Arc::new(JobRunner::new(store.clone(), JobsConfig::default(), services_dir.clone()));

        let id = seed_schedule(&store, Utc::now() - chrono::Duration::minutes(1));
        let scheduler = Scheduler::new(store.clone(), runner, services_dir);
        scheduler.tick();

        let updated = store.schedules.get(&id).unwrap();
        assert_eq!(updated.consecutive_failures, 1);
        assert!(updated.cooldown_until.is_some());
    }
}
