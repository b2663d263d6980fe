//! Subprocess spawning and monitoring.
//!
//! Grounded on `crates/tools/src/{exec.rs,manager.rs}`'s `spawn_monitor`
//! shape — stdout/stderr readers append into a shared, lock-guarded
//! buffer while a separate task drives `child.wait()`/kill/timeout —
//! adapted per `spec.md` §4.3's explicit divergence from the teacher: no
//! `sh -c`, an explicit argv instead. The buffer is flushed to the
//! [`clm_store::Store`] on an interval rather than per line (SPEC_FULL.md
//! §9 Open Question (c)), since a JSON-file store has no cheap way to
//! append.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use uuid::Uuid;

use clm_domain::config::JobsConfig;
use clm_domain::model::{JobStatus, OutputBuffer};
use clm_store::Store;

/// One command invocation: an explicit argv (never passed through a
/// shell), the working directory, and additive environment overrides.
pub struct SpawnSpec {
    pub argv: Vec<String>,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
}

fn is_dangerous_env_var(name: &str, blocklist: &[String]) -> bool {
    let upper = name.to_ascii_uppercase();
    blocklist.iter().any(|b| b.eq_ignore_ascii_case(&upper))
}

/// Spawn `spec` under a fresh tokio task that owns the child process and
/// writes status/output back into `store.jobs` as it runs. Returns a
/// kill-channel sender the caller registers for cancellation.
pub fn spawn_and_monitor(
    store: Arc<Store>,
    config: JobsConfig,
    job_id: Uuid,
    spec: SpawnSpec,
) -> mpsc::Sender<()> {
    let (kill_tx, mut kill_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        let mut cmd = Command::new(&spec.argv[0]);
        cmd.args(&spec.argv[1..]);
        cmd.current_dir(&spec.cwd);
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.stdin(std::process::Stdio::null());

        for (k, v) in &spec.env {
            if is_dangerous_env_var(k, &config.env_blocklist) {
                tracing::warn!(job_id = %job_id, var = %k, "blocked dangerous env var override");
                continue;
            }
            cmd.env(k, v);
        }

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                finish_job(&store, job_id, JobStatus::Failed, &format!("failed to spawn: {e}"));
                return;
            }
        };

        let output = Arc::new(Mutex::new(OutputBuffer::new(config.max_output_chars)));

        let stdout = child.stdout.take();
        let out_buf = output.clone();
        let stdout_task = tokio::spawn(async move {
            if let Some(stdout) = stdout {
                let mut reader = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    out_buf.lock().push_line(&line);
                }
            }
        });

        let stderr = child.stderr.take();
        let err_buf = output.clone();
        let stderr_task = tokio::spawn(async move {
            if let Some(stderr) = stderr {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    err_buf.lock().push_line(&line);
                }
            }
        });

        let mut flush_timer =
            tokio::time::interval(std::time::Duration::from_millis(config.flush_interval_ms));
        flush_timer.tick().await; // first tick fires immediately

        let sleep = tokio::time::sleep(std::time::Duration::from_secs(config.timeout_sec));
        tokio::pin!(sleep);
        let grace = tokio::time::sleep(std::time::Duration::from_secs(config.kill_grace_sec));
        tokio::pin!(grace);
        let mut wait_fut = Box::pin(child.wait());

        let status;
        let mut killed = false;
        let mut grace_armed = false;

        loop {
            tokio::select! {
                _ = flush_timer.tick() => {
                    persist_output(&store, job_id, &output.lock());
                }
                result = &mut wait_fut => {
                    let _ = stdout_task.await;
                    let _ = stderr_task.await;
                    status = match result {
                        Ok(exit) if exit.success() => JobStatus::Completed,
                        Ok(_) if killed => JobStatus::Cancelled,
                        Ok(_) => JobStatus::Failed,
                        Err(e) => {
                            output.lock().push_line(&format!("[process error: {e}]"));
                            JobStatus::Failed
                        }
                    };
                    break;
                }
                _ = kill_rx.recv(), if !grace_armed => {
                    grace_armed = true;
                    killed = true;
                    let _ = child.start_kill();
                }
                _ = &mut grace, if grace_armed => {
                    let _ = child.start_kill();
                }
                _ = &mut sleep => {
                    output.lock().push_line("[timed out]");
                    killed = true;
                    let _ = child.start_kill();
                    let _ = stdout_task.await;
                    let _ = stderr_task.await;
                    status = JobStatus::Failed;
                    break;
                }
            }
        }

        let final_output = output.lock().clone();
        finish_job_with_output(&store, job_id, status, final_output);
    });

    kill_tx
}

fn persist_output(store: &Store, job_id: Uuid, output: &OutputBuffer) {
    let snapshot = output.clone();
    let _ = store.jobs.update(&job_id, |job| {
        job.output = snapshot.clone();
    });
}

fn finish_job(store: &Store, job_id: Uuid, status: JobStatus, last_line: &str) {
    let _ = store.jobs.update(&job_id, |job| {
        job.output.push_line(last_line);
        job.finish(status);
    });
}

fn finish_job_with_output(store: &Store, job_id: Uuid, status: JobStatus, output: OutputBuffer) {
    let _ = store.jobs.update(&job_id, |job| {
        job.output = output.clone();
        job.finish(status);
    });
}
