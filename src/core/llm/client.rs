//! LLM Client Trait
//!
//! The provider contract: request/response chat, channel-based streaming,
//! and a one-shot availability probe. Concrete implementations live in
//! `providers` and own only wire encoding, decoding, and the probe.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::error::{LlmError, Result};
use super::types::{LlmChatRequest, LlmChatResponse};

/// A chunk of streamed content.
///
/// A successful stream delivers zero or more non-final chunks followed by
/// exactly one chunk with `is_final = true` (possibly empty). Transport
/// failures deliver one `Err` item instead, after which the channel closes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Content delta
    pub content: String,
    /// Whether this is the terminal chunk
    pub is_final: bool,
    /// Finish reason reported by the backend (terminal chunks only)
    pub finish_reason: Option<String>,
}

impl StreamChunk {
    pub fn delta(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_final: false,
            finish_reason: None,
        }
    }

    pub fn done(content: impl Into<String>, finish_reason: Option<String>) -> Self {
        Self {
            content: content.into(),
            is_final: true,
            finish_reason,
        }
    }
}

/// Receiver half of a streaming chat response.
pub type StreamReceiver = mpsc::Receiver<std::result::Result<StreamChunk, LlmError>>;

/// Interface implemented by every LLM backend driver.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Backend identifier ("ollama", "openai", "gemini").
    fn name(&self) -> &'static str;

    /// Perform a chat completion, blocking until the full response.
    async fn chat(&self, request: LlmChatRequest) -> Result<LlmChatResponse>;

    /// Perform a streaming chat completion. Token chunks arrive on the
    /// returned channel in wire order.
    async fn stream_chat(&self, request: LlmChatRequest) -> Result<StreamReceiver>;

    /// One-shot availability probe against the backend.
    /// Must not block longer than the configured request timeout.
    async fn check_availability(&self) -> bool;
}

/// Drain a stream receiver into a callback, accumulating the full content.
///
/// The callback receives `(chunk, done)` exactly as the backend produced it.
/// Returns the concatenated content of all chunks.
pub async fn drain_stream<F>(mut rx: StreamReceiver, mut on_chunk: F) -> Result<String>
where
    F: FnMut(&str, bool) + Send,
{
    let mut content = String::new();
    while let Some(item) = rx.recv().await {
        match item {
            Ok(chunk) => {
                content.push_str(&chunk.content);
                on_chunk(&chunk.content, chunk.is_final);
                if chunk.is_final {
                    return Ok(content);
                }
            }
            Err(e) => return Err(e),
        }
    }
    // Channel closed without a terminal chunk: the producer died mid-stream.
    Err(LlmError::StreamAborted(
        "stream ended without terminal chunk".to_string(),
    ))
}
