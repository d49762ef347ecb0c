//! OpenAI Backend Driver
//!
//! OpenAI-compatible chat completions API with Bearer authentication and
//! SSE streaming.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::config::{OpenAiConfig, RagConfig};
use crate::core::llm::client::{LlmClient, StreamReceiver};
use crate::core::llm::error::{LlmError, Result};
use crate::core::llm::streaming::StreamFormat;
use crate::core::llm::types::{LlmChatRequest, LlmChatResponse};

use super::spawn_stream_reader;

pub struct OpenAiClient {
    config: OpenAiConfig,
    default_temperature: f64,
    default_max_tokens: u32,
    client: Client,
}

impl OpenAiClient {
    pub fn new(rag_config: &RagConfig) -> Self {
        let config = rag_config.openai.clone();
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

    /// Newer model families take `max_completion_tokens` instead of the
    /// legacy `max_tokens` key.
    fn use_max_completion_tokens(model: &str) -> bool {
        model.starts_with("o1")
            || model.starts_with("o3")
            || model.starts_with("o4")
            || model.starts_with("gpt-5")
    }

    fn resolve_model<'a>(&'a self, request: &'a LlmChatRequest) -> &'a str {
        request
            .model
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.config.model)
    }

    fn build_request_body(&self, request: &LlmChatRequest, stream: bool) -> serde_json::Value {
        let model = self.resolve_model(request);
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| serde_json::json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": stream,
            "temperature": request.temperature.unwrap_or(self.default_temperature),
        });

        let max_tokens_key = if Self::use_max_completion_tokens(model) {
            "max_completion_tokens"
        } else {
            "max_tokens"
        };
        body[max_tokens_key] =
            serde_json::json!(request.max_tokens.unwrap_or(self.default_max_tokens));

        body
    }

    async fn post(&self, body: &serde_json::Value) -> Result<reqwest::Response> {
        if self.config.api_key.trim().is_empty() {
            return Err(LlmError::Config(
                "OpenAI API key is not configured".to_string(),
            ));
        }
        let url = format!("{}/chat/completions", self.config.api_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(
                "OpenAI API error. url={}, statusCode={}, body={}",
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
impl LlmClient for OpenAiClient {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn chat(&self, request: LlmChatRequest) -> Result<LlmChatResponse> {
        let body = self.build_request_body(&request, false);
        tracing::debug!(
            "[LLM:OPENAI] Sending chat request. model={}, messageCount={}",
            body["model"],
            request.messages.len()
        );

        let response = self.post(&body).await?;
        let body_text = response.text().await?;
        let json: serde_json::Value = serde_json::from_str(&body_text)
            .map_err(|e| LlmError::InvalidResponse(format!("unparseable response body: {e}")))?;

        let mut chat_response = LlmChatResponse::default();
        if let Some(choice) = json["choices"].as_array().and_then(|a| a.first()) {
            if let Some(content) = choice["message"]["content"].as_str() {
                chat_response.content = content.to_string();
            }
            if let Some(reason) = choice["finish_reason"].as_str() {
                chat_response.finish_reason = Some(reason.to_string());
            }
        }
        if let Some(model) = json["model"].as_str() {
            chat_response.model = model.to_string();
        }
        if let Some(usage) = json["usage"].as_object() {
            chat_response.prompt_tokens =
                usage.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
            chat_response.completion_tokens = usage
                .get("completion_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32;
            chat_response.total_tokens =
                usage.get("total_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        }

        Ok(chat_response)
    }

    async fn stream_chat(&self, request: LlmChatRequest) -> Result<StreamReceiver> {
        let body = self.build_request_body(&request, true);
        tracing::debug!(
            "[LLM:OPENAI] Starting streaming chat request. model={}, messageCount={}",
            body["model"],
            request.messages.len()
        );

        let response = self.post(&body).await?;
        Ok(spawn_stream_reader(response, StreamFormat::OpenAi, "OPENAI"))
    }

    async fn check_availability(&self) -> bool {
        if self.config.api_key.trim().is_empty() {
            tracing::debug!("[LLM:OPENAI] Not available. apiKey is blank");
            return false;
        }
        if self.config.api_url.trim().is_empty() {
            tracing::debug!("[LLM:OPENAI] Not available. apiUrl is blank");
            return false;
        }

        let url = format!("{}/models", self.config.api_url.trim_end_matches('/'));
        match self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .send()
            .await
        {
            Ok(response) => {
                let available = response.status().is_success();
                tracing::debug!(
                    "[LLM:OPENAI] Availability check. url={}, statusCode={}, available={}",
                    url,
                    response.status().as_u16(),
                    available
                );
                available
            }
            Err(e) => {
                tracing::debug!("[LLM:OPENAI] Not available. url={}, error={}", url, e);
                false
            }
        }
    }
}
