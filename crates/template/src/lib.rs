//! Expression evaluation for request templates.
//!
//! Strings carrying `{{ ... }}` actions are evaluated against a shared
//! [`EvaluationContext`] (clock, sequence counter, variables, seeded RNG).
//! [`DynamicResolver`] walks a whole [`reqsched_core::HttpTemplate`] and
//! produces a concrete payload.

pub mod context;
pub mod engine;
pub mod error;
mod functions;
mod lexer;
mod parser;
pub mod resolver;
mod value;

pub use context::{Clock, EvaluationContext, FixedClock, SystemClock};
pub use engine::TemplateEngine;
pub use error::TemplateError;
pub use resolver::{DynamicResolver, FieldPath, ResolveError, ResolvedPayload};
pub use value::Value;
