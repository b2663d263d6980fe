use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Job
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Bounded, char-boundary-safe output buffer shared by running and
/// completed jobs. Mirrors the teacher's `OutputBuffer` (tools/src/manager.rs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputBuffer {
    combined: String,
    max_chars: usize,
}

impl OutputBuffer {
    pub fn new(max_chars: usize) -> Self {
        Self {
            combined: String::new(),
            max_chars,
        }
    }

    pub fn push_line(&mut self, line: &str) {
        self.combined.push_str(line);
        self.combined.push('\n');
        if self.combined.len() > self.max_chars {
            let keep = self.max_chars * 3 / 4;
            let drain_count = self.combined.len() - keep;
            let mut boundary = drain_count;
            while boundary < self.combined.len() && !self.combined.is_char_boundary(boundary) {
                boundary += 1;
            }
            self.combined.drain(..boundary);
            self.combined.insert_str(0, "[... truncated ...]\n");
        }
    }

    pub fn as_str(&self) -> &str {
        &self.combined
    }

    pub fn tail(&self, lines: usize) -> String {
        let all: Vec<&str> = self.combined.lines().collect();
        if all.len() <= lines {
            self.combined.clone()
        } else {
            all[all.len() - lines..].join("\n")
        }
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new(256 * 1024)
    }
}

/// A single invocation of a service script with captured output and a
/// terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub service: String,
    pub action: String,
    pub script: Option<String>,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub output: OutputBuffer,
    pub user_id: Option<Uuid>,
    pub username: Option<String>,
    /// Captured at dispatch time; enables `rerun`.
    pub inputs: HashMap<String, String>,
    pub parent_job_id: Option<Uuid>,
    pub deployment_id: Option<Uuid>,
}

impl Job {
    pub fn new(
        service: impl Into<String>,
        action: impl Into<String>,
        script: Option<String>,
        user_id: Option<Uuid>,
        username: Option<String>,
        inputs: HashMap<String, String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            service: service.into(),
            action: action.into(),
            script,
            status: JobStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            output: OutputBuffer::default(),
            user_id,
            username,
            inputs,
            parent_job_id: None,
            deployment_id: None,
        }
    }

    /// Invariant: `finished_at` is set iff `status != Running` (TESTABLE
    /// PROPERTY 3).
    pub fn finish(&mut self, status: JobStatus) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.finished_at = Some(Utc::now());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFilter {
    pub parent_job_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub status: Option<JobStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub name: String,
    pub reason: String,
}

/// Return shape for bulk dispatch operations (resolves Open Question (a),
/// SPEC_FULL.md §9): serialized directly as the HTTP response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkDispatchResult {
    pub succeeded: Vec<String>,
    pub skipped: Vec<SkippedEntry>,
    pub total: usize,
    pub job_id: Option<Uuid>,
}
