//! Parsing and evaluation of the standard 5-field cron dialect.
//!
//! Wraps the `cron` crate with the two operations the dispatcher and the
//! admin validation route both need: `validate_min_interval` (shared so the
//! two can never disagree, per §9) and `previous_fire_at_or_before`, which
//! the `cron` crate doesn't provide directly.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use thiserror::Error;

use crate::error::CronError;

#[derive(Debug, Error)]
pub enum CronExpressionError {
    #[error(transparent)]
    Cron(#[from] CronError),
}

/// Parses `expression` and returns the interval between its first two
/// upcoming fires. Does not itself enforce the minimum; callers compare
/// against their own `min_interval_seconds`.
pub fn fire_interval_seconds(expression: &str) -> Result<i64, CronError> {
    let schedule = parse(expression)?;
    let mut upcoming = schedule.upcoming(Utc);
    let first = upcoming.next().ok_or_else(|| CronError::Parse {
        expression: expression.to_string(),
        reason: "expression never fires".to_string(),
    })?;
    let second = upcoming.next().ok_or_else(|| CronError::Parse {
        expression: expression.to_string(),
        reason: "expression fires only once".to_string(),
    })?;
    Ok((second - first).num_seconds())
}

/// Parses `expression` and fails with [`CronError::IntervalTooShort`] if its
/// fire interval is below `min_interval_seconds`. Used identically by the
/// dispatcher loop (§4.4 step 2a) and the admin create/update validation
/// (§6), so the two can never disagree about what's accepted.
pub fn validate_min_interval(expression: &str, min_interval_seconds: u64) -> Result<(), CronError> {
    let interval = fire_interval_seconds(expression)?;
    if interval < min_interval_seconds as i64 {
        return Err(CronError::IntervalTooShort {
            expression: expression.to_string(),
            interval_seconds: interval,
            minimum_seconds: min_interval_seconds,
        });
    }
    Ok(())
}

/// The `cron` crate parses a 6-field, seconds-leading grammar; the spec's
/// dialect is the standard 5-field minute/hour/dom/month/dow form. Rejects
/// anything that isn't exactly 5 whitespace-separated fields, then prefixes
/// a pinned `0` seconds field before handing off to `Schedule::from_str` so
/// every fire lands on a minute boundary.
fn to_six_field(expression: &str) -> Result<String, CronError> {
    let field_count = expression.split_whitespace().count();
    if field_count != 5 {
        return Err(CronError::Parse {
            expression: expression.to_string(),
            reason: format!("expected a 5-field cron expression, got {field_count} field(s)"),
        });
    }
    Ok(format!("0 {expression}"))
}

pub fn parse(expression: &str) -> Result<Schedule, CronError> {
    let six_field = to_six_field(expression)?;
    Schedule::from_str(&six_field).map_err(|e| CronError::Parse {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

/// The most recent fire time at or before `now`. The `cron` crate only
/// exposes forward iteration (`after`/`upcoming`), so this walks backward in
/// widening windows until it finds one, giving up past five years out (a
/// cron expression that never fires in that span is treated as never firing
/// at all for dispatch purposes).
pub fn previous_fire_at_or_before(schedule: &Schedule, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let max_window = Duration::days(366 * 5);
    let mut window = Duration::hours(1);

    loop {
        let start = now - window;
        let candidate = schedule
            .after(&start)
            .take_while(|fire| *fire <= now)
            .last();

        if candidate.is_some() {
            return candidate;
        }
        if window >= max_window {
            return None;
        }
        window = window * 4;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_minute_has_a_60_second_interval() {
        assert_eq!(fire_interval_seconds("* * * * *").unwrap(), 60);
    }

    #[test]
    fn daily_expression_has_an_86400_second_interval() {
        assert_eq!(fire_interval_seconds("0 2 * * *").unwrap(), 86400);
    }

    #[test]
    fn validate_min_interval_rejects_every_minute_at_a_90s_floor() {
        let err = validate_min_interval("* * * * *", 90).unwrap_err();
        assert!(matches!(err, CronError::IntervalTooShort { .. }));
    }

    #[test]
    fn validate_min_interval_accepts_every_minute_at_the_60s_default() {
        assert!(validate_min_interval("* * * * *", 60).is_ok());
    }

    #[test]
    fn parse_rejects_garbage_expressions() {
        assert!(matches!(
            parse("not a cron expression"),
            Err(CronError::Parse { .. })
        ));
    }

    #[test]
    fn parse_rejects_expressions_that_are_not_exactly_five_fields() {
        assert!(matches!(parse("* * * *"), Err(CronError::Parse { .. })));
        assert!(matches!(parse("0 * * * * *"), Err(CronError::Parse { .. })));
    }

    #[test]
    fn previous_fire_at_or_before_finds_the_prior_minute_boundary() {
        let schedule = parse("* * * * *").unwrap();
        let now = DateTime::parse_from_rfc3339("2026-07-28T10:00:45Z")
            .unwrap()
            .with_timezone(&Utc);
        let prev = previous_fire_at_or_before(&schedule, now).unwrap();
        assert_eq!(prev.to_rfc3339(), "2026-07-28T10:00:00+00:00");
    }

    #[test]
    fn previous_fire_at_or_before_finds_a_sparse_monthly_fire() {
        let schedule = parse("0 2 1 * *").unwrap();
        let now = DateTime::parse_from_rfc3339("2026-07-28T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let prev = previous_fire_at_or_before(&schedule, now).unwrap();
        assert_eq!(prev.to_rfc3339(), "2026-07-01T02:00:00+00:00");
    }
}
