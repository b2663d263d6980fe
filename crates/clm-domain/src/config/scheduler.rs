use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scheduler & background pollers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Scheduler tick cadence.
    #[serde(default = "d_tick_secs")]
    pub tick_secs: u64,
    /// Cost-refresh poller cadence.
    #[serde(default = "d_cost_refresh_secs")]
    pub cost_refresh_secs: u64,
    /// Health poller cadence.
    #[serde(default = "d_health_secs")]
    pub health_secs: u64,
    /// Drift poller cadence.
    #[serde(default = "d_drift_secs")]
    pub drift_secs: u64,
    /// Snapshot poller cadence (no-op unless a pending snapshot exists).
    #[serde(default = "d_snapshot_secs")]
    pub snapshot_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: d_tick_secs(),
            cost_refresh_secs: d_cost_refresh_secs(),
            health_secs: d_health_secs(),
            drift_secs: d_drift_secs(),
            snapshot_secs: d_snapshot_secs(),
        }
    }
}

fn d_tick_secs() -> u64 {
    30
}
fn d_cost_refresh_secs() -> u64 {
    6 * 60 * 60
}
fn d_health_secs() -> u64 {
    60
}
fn d_drift_secs() -> u64 {
    15 * 60
}
fn d_snapshot_secs() -> u64 {
    60
}
