//! Schedule computation.
//!
//! [`ScheduleEngine`] turns a [`reqsched_core::ScheduleSpec`] into the next
//! instant a request should fire. Recurring patterns go through a pluggable
//! [`RecurrenceResolver`]; [`CronRecurrence`] is the default.

pub(crate) mod cron;
mod engine;
mod error;

#[cfg(test)]
mod tests;

pub use self::cron::{CronRecurrence, RecurrenceResolver};
pub use self::engine::{NextFire, ScheduleEngine};
pub use self::error::ScheduleError;
