//! Ollama Backend Driver
//!
//! Local inference over Ollama's chat API: no authentication, NDJSON
//! streaming, and an availability probe that also verifies the configured
//! model is actually installed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::config::{OllamaConfig, RagConfig};
use crate::core::llm::client::{LlmClient, StreamReceiver};
use crate::core::llm::error::{LlmError, Result};
use crate::core::llm::streaming::StreamFormat;
use crate::core::llm::types::{LlmChatRequest, LlmChatResponse};

use super::spawn_stream_reader;

pub struct OllamaClient {
    config: OllamaConfig,
    default_temperature: f64,
    default_max_tokens: u32,
    client: Client,
}

impl OllamaClient {
    pub fn new(rag_config: &RagConfig) -> Self {
        let config = rag_config.ollama.clone();
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            config,
            default_temperature: rag_config.temperature,
            default_max_tokens: rag_config.max_tokens,
            client,
        }
    }

    fn resolve_model<'a>(&'a self, request: &'a LlmChatRequest) -> &'a str {
        request
            .model
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.config.model)
    }

    fn build_request_body(&self, request: &LlmChatRequest, stream: bool) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| serde_json::json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();

        serde_json::json!({
            "model": self.resolve_model(request),
            "messages": messages,
            "stream": stream,
            "options": {
                "temperature": request.temperature.unwrap_or(self.default_temperature),
                "num_predict": request.max_tokens.unwrap_or(self.default_max_tokens),
            }
        })
    }

    /// Check whether the configured model appears in a `/api/tags` body.
    /// A blank configured model accepts any installed model; an
    /// unparseable body is treated as available.
    fn is_model_available(&self, tags_body: &str) -> bool {
        if self.config.model.trim().is_empty() {
            return true;
        }
        let Ok(json) = serde_json::from_str::<serde_json::Value>(tags_body) else {
            tracing::debug!("[LLM:OLLAMA] Failed to parse models response");
            return true;
        };
        let Some(models) = json["models"].as_array() else {
            tracing::warn!("Configured model not found in Ollama. model={}", self.config.model);
            return false;
        };
        let found = models
            .iter()
            .filter_map(|m| m["name"].as_str())
            .any(|name| name == self.config.model);
        if !found {
            tracing::warn!("Configured model not found in Ollama. model={}", self.config.model);
        }
        found
    }

    async fn post(&self, body: &serde_json::Value) -> Result<reqwest::Response> {
        if self.config.api_url.trim().is_empty() {
            return Err(LlmError::Config(
                "Ollama API URL is not configured".to_string(),
            ));
        }
        let url = format!("{}/api/chat", self.config.api_url.trim_end_matches('/'));
        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(
                "Ollama API error. url={}, statusCode={}, body={}",
                url,
                status.as_u16(),
                text
            );
            return Err(LlmError::api(status.as_u16(), &text));
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn chat(&self, request: LlmChatRequest) -> Result<LlmChatResponse> {
        let body = self.build_request_body(&request, false);
        tracing::debug!(
            "[LLM:OLLAMA] Sending chat request. model={}, messageCount={}",
            body["model"],
            request.messages.len()
        );

        let response = self.post(&body).await?;
        let body_text = response.text().await?;
        let json: serde_json::Value = serde_json::from_str(&body_text)
            .map_err(|e| LlmError::InvalidResponse(format!("unparseable response body: {e}")))?;

        let mut chat_response = LlmChatResponse::default();
        if let Some(content) = json["message"]["content"].as_str() {
            chat_response.content = content.to_string();
        }
        if let Some(reason) = json["done_reason"].as_str() {
            chat_response.finish_reason = Some(reason.to_string());
        }
        if let Some(model) = json["model"].as_str() {
            chat_response.model = model.to_string();
        }
        chat_response.prompt_tokens =
            json["prompt_eval_count"].as_u64().unwrap_or(0) as u32;
        chat_response.completion_tokens = json["eval_count"].as_u64().unwrap_or(0) as u32;
        chat_response.total_tokens = chat_response.prompt_tokens + chat_response.completion_tokens;

        Ok(chat_response)
    }

    async fn stream_chat(&self, request: LlmChatRequest) -> Result<StreamReceiver> {
        let body = self.build_request_body(&request, true);
        tracing::debug!(
            "[LLM:OLLAMA] Starting streaming chat request. model={}, messageCount={}",
            body["model"],
            request.messages.len()
        );

        let response = self.post(&body).await?;
        Ok(spawn_stream_reader(response, StreamFormat::Ollama, "OLLAMA"))
    }

    async fn check_availability(&self) -> bool {
        if self.config.api_url.trim().is_empty() {
            tracing::debug!("[LLM:OLLAMA] Not available. apiUrl is blank");
            return false;
        }

        let url = format!("{}/api/tags", self.config.api_url.trim_end_matches('/'));
        match self.client.get(&url).send().await {
            Ok(response) => {
                if !response.status().is_success() {
                    tracing::debug!(
                        "[LLM:OLLAMA] Availability check failed. url={}, statusCode={}",
                        url,
                        response.status().as_u16()
                    );
                    return false;
                }
                let body = response.text().await.unwrap_or_default();
                self.is_model_available(&body)
            }
            Err(e) => {
                tracing::debug!("[LLM:OLLAMA] Not available. url={}, error={}", url, e);
                false
            }
        }
    }
}
