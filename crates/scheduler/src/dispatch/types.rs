use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqsched_core::config::{
    DEFAULT_CONCURRENCY, DEFAULT_POLL_INTERVAL_MS, DEFAULT_SHUTDOWN_GRACE_SECS,
    DEFAULT_TIMEOUT_SECS, DEFAULT_WORKERS,
};
use reqsched_core::{HttpMethod, RequestDefinition, ResolvedRequest, Settings};
use serde::Serialize;

/// Dispatcher tuning. Zero values fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Poll loops in continuous mode.
    pub workers: usize,
    /// Ceiling on simultaneous in-flight sends.
    pub concurrency: usize,
    pub poll_interval: Duration,
    /// Per-send timeout.
    pub timeout: Duration,
    /// How long in-flight sends may run after `stop()` before being aborted.
    pub shutdown_grace: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            concurrency: DEFAULT_CONCURRENCY,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
        }
    }
}

impl From<&Settings> for DispatchConfig {
    fn from(s: &Settings) -> Self {
        Self {
            workers: s.workers,
            concurrency: s.concurrency,
            poll_interval: s.poll_interval(),
            timeout: s.timeout(),
            shutdown_grace: s.shutdown_grace(),
        }
    }
}

impl DispatchConfig {
    pub(crate) fn normalized(self) -> Self {
        let defaults = Self::default();
        Self {
            workers: if self.workers == 0 { defaults.workers } else { self.workers },
            concurrency: if self.concurrency == 0 {
                defaults.concurrency
            } else {
                self.concurrency
            },
            poll_interval: if self.poll_interval.is_zero() {
                defaults.poll_interval
            } else {
                self.poll_interval
            },
            timeout: if self.timeout.is_zero() {
                defaults.timeout
            } else {
                self.timeout
            },
            shutdown_grace: self.shutdown_grace,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Resolve everything once and report; nothing is sent.
    DryRun,
    /// Send every definition exactly once, then return.
    Once,
    /// Poll for due requests until `stop()`.
    Continuous,
}

/// One definition as it would be sent in dry-run mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DryRunEntry {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved: Option<ResolvedRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a single dispatch attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchOutcome {
    pub name: String,
    pub method: HttpMethod,
    pub url: String,
    pub scheduled_for: DateTime<Utc>,
    pub status: Option<u16>,
    pub status_line: Option<String>,
    pub duration: Duration,
    pub error: Option<String>,
    /// A response arrived with a 2xx status.
    pub success: bool,
}

impl DispatchOutcome {
    /// Outcome with nothing sent yet; `url` is the unresolved template.
    pub(crate) fn unsent(definition: &RequestDefinition, scheduled_for: DateTime<Utc>) -> Self {
        Self {
            name: definition.name.clone(),
            method: definition.http.method,
            url: definition.http.url.clone(),
            scheduled_for,
            status: None,
            status_line: None,
            duration: Duration::ZERO,
            error: None,
            success: false,
        }
    }

    pub(crate) fn failed(
        definition: &RequestDefinition,
        scheduled_for: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::unsent(definition, scheduled_for)
        }
    }

    /// A response came back, but not 2xx.
    pub fn is_non_success(&self) -> bool {
        self.status.is_some() && !self.success
    }
}

/// Counters for a run. Snapshot of [`StatsCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Sends started.
    pub dispatched: u64,
    pub succeeded: u64,
    /// Responses with a non-2xx status.
    pub non_success: u64,
    /// Transport errors and timeouts.
    pub failed: u64,
    pub resolve_errors: u64,
    pub schedule_errors: u64,
    /// Due or queued dispatches dropped because the dispatcher stopped.
    pub abandoned: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub dispatched: AtomicU64,
    pub succeeded: AtomicU64,
    pub non_success: AtomicU64,
    pub failed: AtomicU64,
    pub resolve_errors: AtomicU64,
    pub schedule_errors: AtomicU64,
    pub abandoned: AtomicU64,
}

impl StatsCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            non_success: self.non_success.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            resolve_errors: self.resolve_errors.load(Ordering::Relaxed),
            schedule_errors: self.schedule_errors.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}

/// What a run produced, by mode.
#[derive(Debug, Clone, PartialEq)]
pub enum RunReport {
    DryRun(Vec<DryRunEntry>),
    Once(Vec<DispatchOutcome>),
    Continuous(DispatchStats),
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("dispatcher is already running")]
    AlreadyRunning,

    #[error("dispatch task failed: {0}")]
    TaskFailed(String),
}
