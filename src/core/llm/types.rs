//! LLM Message Types
//!
//! Core types for chat messages, requests, and responses.

use serde::{Deserialize, Serialize};

// ============================================================================
// Message Types
// ============================================================================

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message sent to or received from an LLM backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: MessageRole,
    pub content: String,
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request for a chat completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmChatRequest {
    pub messages: Vec<LlmMessage>,
    /// Overrides the backend's configured model when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Sampling temperature (0.0 - 2.0); backend default when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

impl LlmChatRequest {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            model: None,
            temperature: None,
            max_tokens: None,
            stream: false,
        }
    }

    pub fn add_system_message(&mut self, content: impl Into<String>) {
        self.messages.push(LlmMessage::system(content));
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.messages.push(LlmMessage::user(content));
    }

    pub fn add_message(&mut self, message: LlmMessage) {
        self.messages.push(message);
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

impl Default for LlmChatRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Response from a chat completion
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmChatResponse {
    pub content: String,
    pub model: String,
    pub finish_reason: Option<String>,
    /// Token counts; zero means the backend did not report them.
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}
