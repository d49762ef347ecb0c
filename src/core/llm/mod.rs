//! LLM Client Module
//!
//! Provides a uniform interface over multiple LLM providers with:
//! - Channel-based token streaming
//! - RAG workflow primitives with injectable prompt templates
//! - Resilient parsing of model-emitted JSON
//! - Cached availability tracking with periodic re-probing
//!
//! # Module Structure
//!
//! - `client`: the `LlmClient` driver trait and stream chunk types
//! - `providers`: OpenAI, Gemini, and Ollama driver implementations
//! - `facade`: provider-agnostic RAG primitives
//! - `manager`: driver registry and availability management
//! - `prompts`: prompt templates and locale handling
//! - `streaming`: provider wire-format frame parsers
//! - `intent` / `json`: judgement result types and resilient extraction

pub mod client;
pub mod error;
pub mod facade;
pub mod intent;
pub mod json;
pub mod manager;
pub mod prompts;
pub mod providers;
pub mod streaming;
pub mod types;

// Re-export commonly used types
pub use client::{drain_stream, LlmClient, StreamChunk, StreamReceiver};
pub use error::{LlmError, Result};
pub use facade::LlmFacade;
pub use intent::{ChatIntent, IntentDetectionResult, RelevanceEvaluationResult};
pub use manager::{AvailabilityCache, LlmClientManager};
pub use prompts::{PromptTemplates, UserLocale};
pub use providers::{GeminiClient, OllamaClient, OpenAiClient};
pub use streaming::{StreamFormat, StreamParser};
pub use types::{LlmChatRequest, LlmChatResponse, LlmMessage, MessageRole};
