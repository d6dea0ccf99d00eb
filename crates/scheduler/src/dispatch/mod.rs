//! Request dispatcher: dry-run, once, and continuous modes under a shared
//! concurrency gate.

mod gate;
mod runner;
mod types;


pub use gate::ConcurrencyGate;
pub use runner::Dispatcher;
pub use types::{
    DispatchConfig, DispatchError, DispatchOutcome, DispatchStats, DryRunEntry, RunMode, RunReport,
};
