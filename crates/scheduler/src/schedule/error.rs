use reqsched_core::ValidationError;
use reqsched_template::TemplateError;

/// Errors from computing or validating a schedule.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScheduleError {
    #[error(transparent)]
    Validation(ValidationError),

    #[error("invalid duration '{input}': {reason}")]
    InvalidDuration { input: String, reason: String },

    #[error("invalid cron expression '{pattern}': {reason}")]
    InvalidCron { pattern: String, reason: String },

    #[error("schedule template failed: {0}")]
    Template(#[from] TemplateError),

    #[error("scheduled instant out of range: {0}")]
    OutOfRange(String),
}

impl From<ValidationError> for ScheduleError {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::Duration { input, reason } => {
                ScheduleError::InvalidDuration { input, reason }
            }
            other => ScheduleError::Validation(other),
        }
    }
}
