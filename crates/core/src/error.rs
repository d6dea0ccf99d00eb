use thiserror::Error;

/// Configuration-time validation failures for a single request definition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error(
        "schedule: exactly one schedule strategy must be specified (epoch, relative, template, or cron), found {found}"
    )]
    ScheduleCardinality { found: usize },

    #[error("invalid duration '{input}': {reason}")]
    Duration { input: String, reason: String },

    #[error("invalid HTTP method: {0}")]
    Method(String),

    #[error("{field}: {message}")]
    Field { field: String, message: String },
}

impl ValidationError {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Field {
            field: field.into(),
            message: message.into(),
        }
    }
}
