use std::path::Path;

use serde::{Deserialize, Serialize};

/// Which LLM backend drives RAG chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmType {
    #[default]
    None,
    Ollama,
    Openai,
    Gemini,
}

impl LlmType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmType::None => "none",
            LlmType::Ollama => "ollama",
            LlmType::Openai => "openai",
            LlmType::Gemini => "gemini",
        }
    }
}

impl std::fmt::Display for LlmType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level RAG chat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Master switch for the RAG chat feature.
    pub enabled: bool,
    /// The active backend; `none` disables chat regardless of `enabled`.
    pub llm_type: LlmType,

    pub ollama: OllamaConfig,
    pub openai: OpenAiConfig,
    pub gemini: GeminiConfig,

    /// Sampling temperature for answer generation (0.0 - 2.0).
    pub temperature: f64,
    /// Maximum tokens per generated answer.
    pub max_tokens: u32,

    /// How many documents a context search may return.
    pub context_max_documents: usize,
    /// Character budget for the answer-generation context block.
    pub context_max_chars: usize,
    /// Cap on the evaluator's relevant-document selection.
    pub evaluation_max_relevant_docs: usize,
    /// Bound on retained conversation history per session.
    pub history_max_messages: usize,

    /// Base system prompt shared by answer, FAQ, and summary generation.
    pub system_prompt: String,

    /// Seconds between backend availability probes; <= 0 disables the task.
    pub availability_check_interval_secs: i64,
    /// Seconds a session may stay idle before eviction; <= 0 disables.
    pub session_idle_timeout_secs: i64,

    /// Comma-separated fields requested when fetching full document content.
    pub content_fields: String,
}

/// Ollama backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub api_url: String,
    pub model: String,
    pub timeout_ms: u64,
}

/// OpenAI-compatible backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_ms: u64,
}

/// Google Gemini backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_ms: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            llm_type: LlmType::None,
            ollama: OllamaConfig::default(),
            openai: OpenAiConfig::default(),
            gemini: GeminiConfig::default(),
            temperature: 0.7,
            max_tokens: 2000,
            context_max_documents: 5,
            context_max_chars: 10_000,
            evaluation_max_relevant_docs: 3,
            history_max_messages: 10,
            system_prompt: "You are a helpful assistant that answers questions \
                            based on the provided documents. Always cite your \
                            sources using [1], [2], etc."
                .to_string(),
            availability_check_interval_secs: 60,
            session_idle_timeout_secs: 3600,
            content_fields: "doc_id,title,url,content".to_string(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
            timeout_ms: 60_000,
        }
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            timeout_ms: 60_000,
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: String::new(),
            model: "gemini-2.0-flash".to_string(),
            timeout_ms: 60_000,
        }
    }
}

impl RagConfig {
    /// Load configuration from a TOML file.
    /// Returns `Default` if the file is missing or unparseable.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse config at {}: {e} - using defaults",
                        path.display()
                    );
                    Self::default()
                }
            },
            Err(_) => {
                tracing::debug!("No config file at {} - using defaults", path.display());
                Self::default()
            }
        }
    }

    /// The fetch field list as individual trimmed names.
    pub fn content_field_list(&self) -> Vec<String> {
        self.content_fields
            .split(',')
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect()
    }
}
