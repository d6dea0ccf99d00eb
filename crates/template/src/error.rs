use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    #[error("template parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    #[error("function \"{0}\" not defined")]
    UnknownFunction(String),

    #[error("template execution failed: {0}")]
    Execution(String),

    /// The template ran but its output is not a base-10 integer.
    #[error("template result '{0}' is not a valid integer")]
    NotAnInteger(String),
}

impl TemplateError {
    pub(crate) fn parse(offset: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn exec(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }
}
