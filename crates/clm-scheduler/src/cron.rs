//! 5-field cron grammar (minute hour day-of-month month day-of-week),
//! timezone- and DST-aware `next_after` computation.
//!
//! Ported from `crates/gateway/src/runtime/schedules.rs`'s
//! `cron_field_matches`/`cron_next_tz` — the teacher's only cron
//! implementation, generalized from its single-purpose digest schedules to
//! CloudLab's `ScheduledJob` rows.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};

pub fn parse_tz(tz: &str) -> chrono_tz::Tz {
    tz.parse::<chrono_tz::Tz>().unwrap_or(chrono_tz::UTC)
}

fn cron_field_matches(field: &str, value: u32) -> bool {
    if field == "*" {
        return true;
    }
    if let Some(step) = field.strip_prefix("*/") {
        if let Ok(n) = step.parse::<u32>() {
            return n > 0 && value % n == 0;
        }
    }
    for part in field.split(',') {
        if let Some((start_s, end_s)) = part.split_once('-') {
            if let (Ok(start), Ok(end)) = (start_s.parse::<u32>(), end_s.parse::<u32>()) {
                if value >= start && value <= end {
                    return true;
                }
            }
        } else if let Ok(n) = part.parse::<u32>() {
            if value == n {
                return true;
            }
        }
    }
    false
}

/// Validate a 5-field cron expression. Returns `Ok(())` or an error message.
pub fn validate_cron(cron: &str) -> Result<(), String> {
    let fields: Vec<&str> = cron.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(format!(
            "expected 5 fields (minute hour dom month dow), got {}",
            fields.len()
        ));
    }
    let names = ["minute", "hour", "day-of-month", "month", "day-of-week"];
    let ranges: [(u32, u32); 5] = [(0, 59), (0, 23), (1, 31), (1, 12), (0, 6)];
    for (i, field) in fields.iter().enumerate() {
        validate_cron_field(field, names[i], ranges[i].0, ranges[i].1)?;
    }
    Ok(())
}

fn validate_cron_field(field: &str, name: &str, min: u32, max: u32) -> Result<(), String> {
    if field == "*" {
        return Ok(());
    }
    if let Some(step) = field.strip_prefix("*/") {
        let n: u32 = step
            .parse()
            .map_err(|_| format!("{name}: invalid step '*/{step}' — expected a number"))?;
        if n == 0 || n > max {
            return Err(format!("{name}: step {n} out of range 1..={max}"));
        }
        return Ok(());
    }
    for part in field.split(',') {
        if let Some((start_s, end_s)) = part.split_once('-') {
            let start: u32 = start_s
                .parse()
                .map_err(|_| format!("{name}: invalid range start '{start_s}'"))?;
            let end: u32 = end_s
                .parse()
                .map_err(|_| format!("{name}: invalid range end '{end_s}'"))?;
            if start < min || start > max || end < min || end > max {
                return Err(format!("{name}: range {start}-{end} out of bounds {min}..={max}"));
            }
            if start > end {
                return Err(format!("{name}: range start {start} > end {end}"));
            }
        } else {
            let n: u32 = part.parse().map_err(|_| format!("{name}: invalid value '{part}'"))?;
            if n < min || n > max {
                return Err(format!("{name}: value {n} out of range {min}..={max}"));
            }
        }
    }
    Ok(())
}

fn cron_matches_naive(cron: &str, dt: &chrono::NaiveDateTime) -> bool {
    let fields: Vec<&str> = cron.split_whitespace().collect();
    if fields.len() != 5 {
        return false;
    }
    cron_field_matches(fields[0], dt.minute())
        && cron_field_matches(fields[1], dt.hour())
        && cron_field_matches(fields[2], dt.day())
        && cron_field_matches(fields[3], dt.month())
        && cron_field_matches(fields[4], dt.weekday().num_days_from_sunday())
}

/// Compute the next occurrence strictly after `after`, evaluated in `tz`.
///
/// DST handling: spring-forward gaps (local times that don't exist) are
/// skipped; fall-back overlaps resolve to the earliest (pre-transition)
/// mapping.
pub fn cron_next_tz(cron: &str, after: &DateTime<Utc>, tz: chrono_tz::Tz) -> Option<DateTime<Utc>> {
    let local_after = after.with_timezone(&tz).naive_local();
    let next_min_secs = 60 - (local_after.second() as i64);
    let mut candidate = local_after + chrono::Duration::seconds(next_min_secs);
    candidate = candidate.with_second(0).unwrap_or(candidate);

    let max_checks = 366 * 24 * 60;
    for _ in 0..max_checks {
        if cron_matches_naive(cron, &candidate) {
            match tz.from_local_datetime(&candidate) {
                chrono::LocalResult::Single(dt) => return Some(dt.with_timezone(&Utc)),
                chrono::LocalResult::Ambiguous(earliest, _) => return Some(earliest.with_timezone(&Utc)),
                chrono::LocalResult::None => {}
            }
        }
        candidate += chrono::Duration::minutes(1);
    }
    None
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn rejects_wrong_field_count() {
        assert!(validate_cron("* * *").is_err());
    }

    #[test]
    fn accepts_every_fifteen_minutes() {
        assert!(validate_cron("*/15 * * * *").is_ok());
    }

    #[test]
    fn rejects_out_of_range_hour() {
        assert!(validate_cron("0 25 * * *").is_err());
    }

    #[test]
    fn next_occurrence_every_fifteen_minutes_is_aligned() {
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 0, 7, 0).unwrap();
        let next = cron_next_tz("*/15 * * * *", &after, chrono_tz::UTC).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 1, 0, 15, 0).unwrap());
    }

    #[test]
    fn next_occurrence_crosses_a_dst_spring_forward_gap() {
        // US/Eastern springs forward at 2026-03-08 02:00 local -> 03:00.
        let after = Utc.with_ymd_and_hms(2026, 3, 8, 6, 30, 0).unwrap(); // 01:30 ET
        let tz = parse_tz("US/Eastern");
        let next = cron_next_tz("30 2 * * *", &after, tz);
        // 02:30 local never exists that day; the next real occurrence is
        // the following day, now at EDT (UTC-4).
        let following_day = Utc.with_ymd_and_hms(2026, 3, 9, 6, 30, 0).unwrap();
        assert_eq!(next, Some(following_day));
    }

    #[test]
    fn next_occurrence_respects_day_of_week() {
        // 2026-01-01 is a Thursday (weekday 4, Sunday=0).
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let next = cron_next_tz("0 9 * * 1", &after, chrono_tz::UTC).unwrap(); // Monday
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap());
    }
}
