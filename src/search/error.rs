//! Error types for search operations

use crate::error::AppError;

/// Result type for search operations
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Errors that can occur during search operations
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Argument rejected before any backend I/O
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Query object not usable with this engine
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Backend request failed or was rejected
    #[error("Backend error: {0}")]
    Backend(String),

    /// Backend payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Subsystem is not available (shut down or no runtime)
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SearchError::Serialization(err.to_string())
        } else {
            SearchError::Backend(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Serialization(err.to_string())
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::InvalidArgument(msg) | SearchError::InvalidQuery(msg) => {
                AppError::Validation(msg)
            }
            SearchError::InvalidConfiguration(msg) => AppError::Configuration(msg),
            SearchError::Backend(msg) => AppError::Backend(msg),
            SearchError::Serialization(msg) => AppError::Serialization(msg),
            SearchError::Unavailable(msg) => AppError::Internal(msg),
        }
    }
}
