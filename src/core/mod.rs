//! Core Modules
//!
//! - `llm`: multi-provider LLM clients, RAG primitives, availability management
//! - `search`: document search and fetch collaborator interface
//! - `chat`: session store and the multi-phase chat orchestrator
//! - `markdown`: Markdown-to-safe-HTML rendering collaborator

pub mod chat;
pub mod llm;
pub mod markdown;
pub mod search;
