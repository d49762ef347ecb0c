//! LLM Error Types
//!
//! Error handling for LLM client operations.

use thiserror::Error;

/// LLM operation errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API error: {status} {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("LLM client is not available")]
    Unavailable,

    #[error("Stream aborted: {0}")]
    StreamAborted(String),
}

impl LlmError {
    /// Build an API error from a status code and response body,
    /// keeping only the leading portion of the body.
    pub fn api(status: u16, body: &str) -> Self {
        const MAX_BODY: usize = 500;
        let message = if body.len() > MAX_BODY {
            let mut end = MAX_BODY;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &body[..end])
        } else {
            body.to_string()
        };
        LlmError::Api { status, message }
    }
}

/// Result type alias for LLM operations
pub type Result<T> = std::result::Result<T, LlmError>;
