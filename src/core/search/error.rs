//! Search Error Types

use thiserror::Error;

/// Search collaborator errors
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Search backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for search operations
pub type Result<T> = std::result::Result<T, SearchError>;
