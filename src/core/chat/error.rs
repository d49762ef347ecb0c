//! Chat Error Types

use thiserror::Error;

use crate::core::llm::LlmError;
use crate::core::search::SearchError;

/// Errors surfacing from a chat turn
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),
}

/// Result type alias for chat operations
pub type Result<T> = std::result::Result<T, ChatError>;
