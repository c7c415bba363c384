use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Tributary
#[derive(Error, Debug)]
pub enum TributaryError {
    /// Query text is empty and no query vector was supplied
    #[error("Query is empty: provide query text or a query vector")]
    EmptyQuery,

    /// Query vector has no components
    #[error("Query vector is empty")]
    EmptyVector,

    /// Query vector has zero magnitude, cosine similarity is undefined
    #[error("Query vector has zero magnitude")]
    ZeroMagnitude,

    /// Pagination bounds rejected before dispatch
    #[error("Invalid pagination: offset={offset}, limit={limit} (limit must be 1..={max})")]
    InvalidPagination { offset: i64, limit: i64, max: usize },

    /// A request parameter is outside its domain
    #[error("Invalid request parameter '{name}': {message}")]
    InvalidParameter { name: String, message: String },

    /// Every source failed, timed out or was cancelled
    #[error("All {attempted} sources failed: {}", .failures.join("; "))]
    AllSourcesFailed {
        attempted: usize,
        failures: Vec<String>,
    },

    /// The search observed cancellation before finishing
    #[error("Search cancelled")]
    Cancelled,

    /// A single source reported an error
    #[error("Source '{source_id}' failed: {message}")]
    Source { source_id: String, message: String },

    /// Text index errors
    #[error("Index error: {0}")]
    Index(String),

    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TributaryError {
    /// Whether the caller caused this error (bad input rather than a backend fault)
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyQuery
                | Self::EmptyVector
                | Self::ZeroMagnitude
                | Self::InvalidPagination { .. }
                | Self::InvalidParameter { .. }
        )
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for Tributary operations
pub type Result<T> = std::result::Result<T, TributaryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_sources_failed_message_lists_failures() {
        let err = TributaryError::AllSourcesFailed {
            attempted: 2,
            failures: vec!["jira: timed out".to_string(), "slack: boom".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("All 2 sources failed"));
        assert!(msg.contains("jira: timed out; slack: boom"));
    }

    #[test]
    fn test_input_error_classification() {
        assert!(TributaryError::EmptyQuery.is_input_error());
        assert!(TributaryError::InvalidPagination {
            offset: -1,
            limit: 10,
            max: 100
        }
        .is_input_error());
        assert!(!TributaryError::AllSourcesFailed {
            attempted: 1,
            failures: vec![]
        }
        .is_input_error());
    }
}
