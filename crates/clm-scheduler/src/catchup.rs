//! Missed-run bookkeeping for [`clm_domain::model::MissedPolicy`].
//!
//! Ported from `crates/gateway/src/runtime/schedule_runner.rs`'s
//! `missed_window_count`/`runs_to_fire`, generalized from the teacher's
//! digest-schedule runner to CloudLab's `ScheduledJob`.

use chrono::{DateTime, Utc};

use clm_domain::model::MissedPolicy;

use crate::cron::cron_next_tz;

/// Count how many cron windows were missed between `last_run_at` and `now`.
pub fn missed_window_count(
    cron: &str,
    tz: chrono_tz::Tz,
    last_run_at: Option<DateTime<Utc>>,
    now: &DateTime<Utc>,
    max_catchup: usize,
) -> usize {
    let anchor = match last_run_at {
        Some(t) => t,
        None => return 1,
    };
    let mut count = 0usize;
    let mut cursor = anchor;
    loop {
        match cron_next_tz(cron, &cursor, tz) {
            Some(next) if next <= *now => {
                count += 1;
                cursor = next;
                if count > max_catchup {
                    break;
                }
            }
            _ => break,
        }
    }
    count
}

/// How many runs to actually fire this tick under `policy`.
pub fn runs_to_fire(
    policy: MissedPolicy,
    cron: &str,
    tz: chrono_tz::Tz,
    last_run_at: Option<DateTime<Utc>>,
    now: &DateTime<Utc>,
    max_catchup: usize,
) -> usize {
    let missed = missed_window_count(cron, tz, last_run_at, now, max_catchup);
    match policy {
        MissedPolicy::Skip => {
            if missed > 1 {
                0
            } else {
                missed
            }
        }
        MissedPolicy::RunOnce => missed.min(1),
        MissedPolicy::CatchUp => missed.min(max_catchup),
    }
}

/// Exponential back-off cooldown in minutes: `2^(failures-1)`, capped at 24h.
pub fn cooldown_minutes(consecutive_failures: u32) -> u64 {
    const MAX_COOLDOWN_MINUTES: u64 = 24 * 60;
    if consecutive_failures == 0 {
        return 0;
    }
    let exp = (consecutive_failures - 1).min(20);
    let minutes = 1u64.checked_shl(exp).unwrap_or(MAX_COOLDOWN_MINUTES);
    minutes.min(MAX_COOLDOWN_MINUTES)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn never_run_counts_as_one_missed_window() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(missed_window_count("*/15 * * * *", chrono_tz::UTC, None, &now, 10), 1);
    }

    #[test]
    fn skip_policy_drops_multiple_missed_windows() {
        let last = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 1, 0, 0).unwrap();
        let runs = runs_to_fire(MissedPolicy::Skip, "*/15 * * * *", chrono_tz::UTC, Some(last), &now, 10);
        assert_eq!(runs, 0);
    }

    #[test]
    fn run_once_fires_exactly_once_regardless_of_backlog() {
        let last = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 1, 0, 0).unwrap();
        let runs = runs_to_fire(MissedPolicy::RunOnce, "*/15 * * * *", chrono_tz::UTC, Some(last), &now, 10);
        assert_eq!(runs, 1);
    }

    #[test]
    fn catch_up_fires_every_missed_window_up_to_cap() {
        let last = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 1, 0, 0).unwrap();
        let runs = runs_to_fire(MissedPolicy::CatchUp, "*/15 * * * *", chrono_tz::UTC, Some(last), &now, 2);
        assert_eq!(runs, 2);
    }

    #[test]
    fn cooldown_doubles_each_failure_and_caps_at_24h() {
        assert_eq!(cooldown_minutes(0), 0);
        assert_eq!(cooldown_minutes(1), 1);
        assert_eq!(cooldown_minutes(2), 2);
        assert_eq!(cooldown_minutes(3), 4);
        assert_eq!(cooldown_minutes(30), 24 * 60);
    }
}
