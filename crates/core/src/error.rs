//! Error types for kbqa.
//!
//! This module defines a unified error enum that covers all error categories
//! in the application: configuration, I/O, LLM, knowledge (indexes and
//! retrieval), prompt, web search and serialization errors.

use thiserror::Error;

/// Unified error type for kbqa.
///
/// All fallible functions return `Result<T, AppError>`.
/// We never panic; errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors (missing providers, credentials, bad values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Knowledge base, index and retrieval errors
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Web search provider errors
    #[error("Search error: {0}")]
    Search(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether this error must abort a whole query instead of failing a
    /// single escalation phase.
    ///
    /// Only configuration errors qualify: escalating to another tier cannot
    /// fix a missing provider or a rejected credential.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Config(_))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_config_errors_are_fatal() {
        assert!(AppError::Config("missing key".to_string()).is_fatal());
        assert!(!AppError::Llm("timeout".to_string()).is_fatal());
        assert!(!AppError::Knowledge("corrupt index".to_string()).is_fatal());
        assert!(!AppError::Search("502".to_string()).is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = AppError::Search("rate limited".to_string());
        assert_eq!(err.to_string(), "Search error: rate limited");
    }

    #[test]
    fn test_from_serde_json() {
        let err: AppError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, AppError::Serialization(_)));
    }
}
