//! Request definition loader for YAML and JSON config files.
//!
//! Two-pass: the top level (`requests`, `variables`, `seed`) is parsed first,
//! then each request is deserialized and validated on its own so one bad
//! entry does not sink the rest.

mod core;
mod error;

#[cfg(test)]
mod tests;

pub use self::core::{ConfigLoader, LoadedConfig};
pub use self::error::{LoadError, LoadResult, LoadStatus};
