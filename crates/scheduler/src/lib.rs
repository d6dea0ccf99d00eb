//! Scheduling and dispatch of templated HTTP requests.
//!
//! - [`schedule`] computes when a request fires (absolute, relative, computed,
//!   recurring, plus delay-only jitter).
//! - [`loader`] reads request definitions from YAML/JSON files.
//! - [`transport`] sends resolved requests over HTTP.
//! - [`dispatch`] runs definitions in dry-run, once, or continuous mode under
//!   a concurrency ceiling.

pub mod dispatch;
pub mod loader;
pub mod resolve;
pub mod schedule;
pub mod transport;

pub use dispatch::{
    ConcurrencyGate, DispatchConfig, DispatchError, DispatchOutcome, DispatchStats, Dispatcher,
    DryRunEntry, RunMode, RunReport,
};
pub use loader::{ConfigLoader, LoadError, LoadResult, LoadStatus, LoadedConfig};
pub use resolve::resolve_request;
pub use schedule::{CronRecurrence, NextFire, RecurrenceResolver, ScheduleEngine, ScheduleError};
pub use transport::{HttpTransport, ReqwestTransport, TransportError, TransportResponse};
