use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Job Runner
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Cap on the in-memory/persisted output buffer per job.
    #[serde(default = "d_max_output_chars")]
    pub max_output_chars: usize,
    /// Hard subprocess timeout.
    #[serde(default = "d_timeout_sec")]
    pub timeout_sec: u64,
    /// Grace period between a cancellation signal and a forced kill.
    #[serde(default = "d_kill_grace_sec")]
    pub kill_grace_sec: u64,
    /// Output flush-to-store cadence while a job is running (SPEC_FULL.md
    /// §9 Open Question (c)).
    #[serde(default = "d_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "d_env_blocklist")]
    pub env_blocklist: Vec<String>,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_output_chars: d_max_output_chars(),
            timeout_sec: d_timeout_sec(),
            kill_grace_sec: d_kill_grace_sec(),
            flush_interval_ms: d_flush_interval_ms(),
            env_blocklist: d_env_blocklist(),
        }
    }
}

fn d_max_output_chars() -> usize {
    1024 * 1024
}
fn d_timeout_sec() -> u64 {
    3600
}
fn d_kill_grace_sec() -> u64 {
    10
}
fn d_flush_interval_ms() -> u64 {
    2000
}
fn d_env_blocklist() -> Vec<String> {
    [
        "LD_PRELOAD",
        "LD_LIBRARY_PATH",
        "LD_AUDIT",
        "DYLD_INSERT_LIBRARIES",
        "DYLD_LIBRARY_PATH",
        "DYLD_FRAMEWORK_PATH",
        "PATH",
        "HOME",
        "USER",
        "SHELL",
        "SSH_AUTH_SOCK",
        "SSH_AGENT_PID",
        "PYTHONPATH",
        "PYTHONSTARTUP",
        "PYTHONHOME",
        "NODE_PATH",
        "NODE_OPTIONS",
        "RUBYLIB",
        "RUBYOPT",
        "PERL5LIB",
        "PERL5OPT",
        "CLASSPATH",
        "BASH_ENV",
        "ENV",
        "CDPATH",
        "IFS",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
