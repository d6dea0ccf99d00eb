//! Cron-backed recurrence.

use std::fmt;
use std::str::FromStr;

use ::cron::Schedule;
use chrono::{DateTime, Utc};

use super::error::ScheduleError;

/// Finds the next occurrence of a recurrence pattern.
pub trait RecurrenceResolver: Send + Sync + fmt::Debug {
    /// First occurrence strictly after `after`.
    fn next_after(&self, pattern: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError>;

    /// Check the pattern's syntax without computing anything.
    fn validate(&self, pattern: &str) -> Result<(), ScheduleError>;
}

/// Normalize a 5-field cron expression to 6-field by prepending "0 " for seconds.
///
/// The `cron` crate requires `sec min hour day-of-month month day-of-week [year]`;
/// configs usually carry the standard 5-field form. `@hourly`-style
/// descriptors pass through untouched.
pub(crate) fn normalize_cron(expr: &str) -> String {
    let trimmed = expr.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    }
}

/// Standard cron patterns via the `cron` crate.
///
/// Day-of-week numbering follows the crate: 1-7 with Sunday = 1, or names
/// (`MON-FRI`).
#[derive(Debug, Default, Clone, Copy)]
pub struct CronRecurrence;

impl CronRecurrence {
    fn parse(pattern: &str) -> Result<Schedule, ScheduleError> {
        Schedule::from_str(&normalize_cron(pattern)).map_err(|e| ScheduleError::InvalidCron {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
    }
}

impl RecurrenceResolver for CronRecurrence {
    fn next_after(&self, pattern: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
        Self::parse(pattern)?
            .after(&after)
            .next()
            .ok_or_else(|| ScheduleError::InvalidCron {
                pattern: pattern.to_string(),
                reason: "pattern has no upcoming occurrence".to_string(),
            })
    }

    fn validate(&self, pattern: &str) -> Result<(), ScheduleError> {
        Self::parse(pattern).map(|_| ())
    }
}
