//! Error types and per-request load results for the config loader.

use std::path::PathBuf;

/// Errors that abort loading a whole config file.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Filesystem I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML syntax or top-level shape error.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON syntax or top-level shape error.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported file extension '{extension}' (use .yaml, .yml, or .json)")]
    UnsupportedExtension { extension: String },

    /// Every request was rejected, or none were declared.
    #[error("no valid requests in config ({rejected} rejected)")]
    Empty { rejected: usize },
}

/// Outcome of loading one entry of the `requests` list.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadResult {
    /// Position in the `requests` list.
    pub index: usize,
    /// The entry's `name`, when it had one.
    pub name: Option<String>,
    pub status: LoadStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadStatus {
    Loaded,
    /// Parse or validation error; the entry was skipped.
    Rejected { error: String },
}
