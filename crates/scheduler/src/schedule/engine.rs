use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use reqsched_core::{parse_duration, parse_jitter, ScheduleSpec, ScheduleStrategy, ValidationError};
use reqsched_template::TemplateEngine;

use super::cron::{CronRecurrence, RecurrenceResolver};
use super::error::ScheduleError;

/// A computed fire instant and the base it was jittered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextFire {
    /// Instant before jitter.
    pub base: DateTime<Utc>,
    /// When to fire: `base` plus any jitter.
    pub at: DateTime<Utc>,
}

/// Computes fire instants for schedule specs.
///
/// Computed schedules and jitter draw on the template engine's shared
/// context, so a seeded context makes jitter reproducible too.
#[derive(Debug, Clone)]
pub struct ScheduleEngine {
    templates: TemplateEngine,
    recurrence: Arc<dyn RecurrenceResolver>,
}

impl ScheduleEngine {
    pub fn new(templates: TemplateEngine, recurrence: Arc<dyn RecurrenceResolver>) -> Self {
        Self {
            templates,
            recurrence,
        }
    }

    /// Engine with the default cron resolver.
    pub fn with_cron(templates: TemplateEngine) -> Self {
        Self::new(templates, Arc::new(CronRecurrence))
    }

    pub fn templates(&self) -> &TemplateEngine {
        &self.templates
    }

    /// Current time according to the shared evaluation clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.templates.context().now()
    }

    /// Next instant for `spec`, relative to `reference`.
    ///
    /// Absolute instants are returned as-is even when already in the past;
    /// the caller decides what "overdue" means.
    pub fn compute_next(
        &self,
        spec: &ScheduleSpec,
        reference: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, ScheduleError> {
        self.compute_fire(spec, reference).map(|fire| fire.at)
    }

    /// Like [`compute_next`](Self::compute_next), also reporting the
    /// un-jittered base so callers can tell a repeated instant from a new one.
    pub fn compute_fire(
        &self,
        spec: &ScheduleSpec,
        reference: DateTime<Utc>,
    ) -> Result<NextFire, ScheduleError> {
        let base = match spec.strategy()? {
            ScheduleStrategy::Absolute(epoch) => from_epoch(epoch)?,
            ScheduleStrategy::Relative(duration) => {
                let delta = parse_duration(duration)?;
                reference.checked_add_signed(delta).ok_or_else(|| {
                    ScheduleError::OutOfRange(format!("{reference} + {duration}"))
                })?
            }
            ScheduleStrategy::Computed(expr) => from_epoch(self.templates.evaluate_to_integer(expr)?)?,
            ScheduleStrategy::Recurring(pattern) => self.recurrence.next_after(pattern, reference)?,
        };

        let at = match spec.jitter() {
            Some(jitter) => self.apply_jitter(base, jitter)?,
            None => base,
        };
        Ok(NextFire { base, at })
    }

    /// Delay `base` by a uniform offset in `[0, magnitude]`.
    fn apply_jitter(&self, base: DateTime<Utc>, jitter: &str) -> Result<DateTime<Utc>, ScheduleError> {
        let magnitude = parse_jitter(jitter)?;
        if magnitude <= TimeDelta::zero() {
            return Ok(base);
        }
        let offset = self.templates.context().random_offset(magnitude);
        base.checked_add_signed(offset)
            .ok_or_else(|| ScheduleError::OutOfRange(format!("{base} + jitter {jitter}")))
    }

    /// Check a spec without computing an instant.
    pub fn validate(&self, spec: &ScheduleSpec) -> Result<(), ScheduleError> {
        match spec.strategy()? {
            ScheduleStrategy::Absolute(epoch) if epoch < 0 => {
                return Err(ValidationError::field("schedule.epoch", "must not be negative").into())
            }
            ScheduleStrategy::Absolute(epoch) => {
                from_epoch(epoch)?;
            }
            ScheduleStrategy::Relative(duration) => {
                parse_duration(duration)?;
            }
            ScheduleStrategy::Computed(expr) => self.templates.validate(expr)?,
            ScheduleStrategy::Recurring(pattern) => self.recurrence.validate(pattern)?,
        }

        if let Some(jitter) = spec.jitter() {
            if parse_jitter(jitter)? < TimeDelta::zero() {
                return Err(ValidationError::field("schedule.jitter", "must not be negative").into());
            }
        }
        Ok(())
    }
}

fn from_epoch(epoch: i64) -> Result<DateTime<Utc>, ScheduleError> {
    DateTime::from_timestamp(epoch, 0)
        .ok_or_else(|| ScheduleError::OutOfRange(format!("epoch {epoch}")))
}
