//! Google Gemini Backend Driver
//!
//! Gemini's generateContent API: the API key travels as a query parameter,
//! system messages merge into `systemInstruction`, the assistant role is
//! wire-named `model`, and streaming delivers a JSON array line by line.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::config::{GeminiConfig, RagConfig};
use crate::core::llm::client::{LlmClient, StreamReceiver};
use crate::core::llm::error::{LlmError, Result};
use crate::core::llm::streaming::StreamFormat;
use crate::core::llm::types::{LlmChatRequest, LlmChatResponse, MessageRole};

use super::spawn_stream_reader;

/// Gemini role for model responses (equivalent to "assistant" elsewhere).
const ROLE_MODEL: &str = "model";

pub struct GeminiClient {
    config: GeminiConfig,
    default_temperature: f64,
    default_max_tokens: u32,
    client: Client,
}

impl GeminiClient {
    pub fn new(rag_config: &RagConfig) -> Self {
        let config = rag_config.gemini.clone();
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

    fn build_api_url(&self, model: &str, stream: bool) -> String {
        let action = if stream {
            "streamGenerateContent"
        } else {
            "generateContent"
        };
        format!(
            "{}/models/{}:{}?key={}",
            self.config.api_url.trim_end_matches('/'),
            model,
            action,
            self.config.api_key
        )
    }

    fn build_request_body(&self, request: &LlmChatRequest) -> serde_json::Value {
        // System messages concatenate into systemInstruction rather than
        // appearing in contents.
        let mut system_message: Option<String> = None;
        let mut contents = Vec::new();
        for message in &request.messages {
            match message.role {
                MessageRole::System => match &mut system_message {
                    Some(existing) => {
                        existing.push('\n');
                        existing.push_str(&message.content);
                    }
                    None => system_message = Some(message.content.clone()),
                },
                MessageRole::User | MessageRole::Assistant => {
                    let role = if message.role == MessageRole::Assistant {
                        ROLE_MODEL
                    } else {
                        "user"
                    };
                    contents.push(serde_json::json!({
                        "role": role,
                        "parts": [{ "text": message.content }]
                    }));
                }
            }
        }

        let mut body = serde_json::json!({
            "contents": contents,
            "generationConfig": {
                "temperature": request.temperature.unwrap_or(self.default_temperature),
                "maxOutputTokens": request.max_tokens.unwrap_or(self.default_max_tokens),
            }
        });
        if let Some(system) = system_message {
            body["systemInstruction"] = serde_json::json!({ "parts": [{ "text": system }] });
        }
        body
    }

    async fn post(&self, url: &str, body: &serde_json::Value) -> Result<reqwest::Response> {
        if self.config.api_key.trim().is_empty() {
            return Err(LlmError::Config(
                "Gemini API key is not configured".to_string(),
            ));
        }
        let response = self.client.post(url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(
                "Gemini API error. statusCode={}, body={}",
                status.as_u16(),
                text
            );
            return Err(LlmError::api(status.as_u16(), &text));
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn chat(&self, request: LlmChatRequest) -> Result<LlmChatResponse> {
        let model = self.resolve_model(&request).to_string();
        let url = self.build_api_url(&model, false);
        let body = self.build_request_body(&request);
        tracing::debug!(
            "[LLM:GEMINI] Sending chat request. model={}, messageCount={}",
            model,
            request.messages.len()
        );

        let response = self.post(&url, &body).await?;
        let body_text = response.text().await?;
        let json: serde_json::Value = serde_json::from_str(&body_text)
            .map_err(|e| LlmError::InvalidResponse(format!("unparseable response body: {e}")))?;

        let mut chat_response = LlmChatResponse::default();
        if let Some(candidate) = json["candidates"].as_array().and_then(|a| a.first()) {
            if let Some(text) = candidate["content"]["parts"]
                .as_array()
                .and_then(|p| p.first())
                .and_then(|p| p["text"].as_str())
            {
                chat_response.content = text.to_string();
            }
            if let Some(reason) = candidate["finishReason"].as_str() {
                chat_response.finish_reason = Some(reason.to_string());
            }
        }
        chat_response.model = json["modelVersion"]
            .as_str()
            .unwrap_or(&model)
            .to_string();
        if let Some(usage) = json["usageMetadata"].as_object() {
            chat_response.prompt_tokens = usage
                .get("promptTokenCount")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32;
            chat_response.completion_tokens = usage
                .get("candidatesTokenCount")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32;
            chat_response.total_tokens = usage
                .get("totalTokenCount")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32;
        }

        Ok(chat_response)
    }

    async fn stream_chat(&self, request: LlmChatRequest) -> Result<StreamReceiver> {
        let model = self.resolve_model(&request).to_string();
        let url = self.build_api_url(&model, true);
        let body = self.build_request_body(&request);
        tracing::debug!(
            "[LLM:GEMINI] Starting streaming chat request. model={}, messageCount={}",
            model,
            request.messages.len()
        );

        let response = self.post(&url, &body).await?;
        Ok(spawn_stream_reader(response, StreamFormat::Gemini, "GEMINI"))
    }

    async fn check_availability(&self) -> bool {
        if self.config.api_key.trim().is_empty() {
            tracing::debug!("[LLM:GEMINI] Not available. apiKey is blank");
            return false;
        }
        if self.config.api_url.trim().is_empty() {
            tracing::debug!("[LLM:GEMINI] Not available. apiUrl is blank");
            return false;
        }

        let url = format!(
            "{}/models?key={}",
            self.config.api_url.trim_end_matches('/'),
            self.config.api_key
        );
        match self.client.get(&url).send().await {
            Ok(response) => {
                let available = response.status().is_success();
                tracing::debug!(
                    "[LLM:GEMINI] Availability check. statusCode={}, available={}",
                    response.status().as_u16(),
                    available
                );
                available
            }
            Err(e) => {
                tracing::debug!("[LLM:GEMINI] Not available. error={}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::llm::types::LlmMessage;

    fn test_client() -> GeminiClient {
        let mut rag_config = RagConfig::default();
        rag_config.gemini.api_key = "AIzaTest".to_string();
        rag_config.gemini.model = "gemini-2.0-flash".to_string();
        GeminiClient::new(&rag_config)
    }

    #[test]
    fn test_api_url_carries_key_and_action() {
        let client = test_client();
        let url = client.build_api_url("gemini-2.0-flash", false);
        assert!(url.ends_with("/models/gemini-2.0-flash:generateContent?key=AIzaTest"));

        let stream_url = client.build_api_url("gemini-2.0-flash", true);
        assert!(stream_url.contains(":streamGenerateContent?key="));
    }

    #[test]
    fn test_system_messages_merge_into_instruction() {
        let client = test_client();
        let mut request = LlmChatRequest::new();
        request.add_system_message("first");
        request.add_system_message("second");
        request.add_user_message("hello");

        let body = client.build_request_body(&request);
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "first\nsecond"
        );
        // System messages do not appear in contents
        assert_eq!(body["contents"].as_array().unwrap().len(), 1);
        assert_eq!(body["contents"][0]["role"], "user");
    }

    #[test]
    fn test_assistant_role_is_wire_named_model() {
        let client = test_client();
        let mut request = LlmChatRequest::new();
        request.add_user_message("q");
        request.add_message(LlmMessage::assistant("a"));

        let body = client.build_request_body(&request);
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][1]["parts"][0]["text"], "a");
    }

    #[test]
    fn test_generation_config() {
        let client = test_client();
        let mut request = LlmChatRequest::new().with_temperature(0.3).with_max_tokens(500);
        request.add_user_message("q");

        let body = client.build_request_body(&request);
        assert_eq!(body["generationConfig"]["temperature"], 0.3);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 500);
    }

    #[tokio::test]
    async fn test_blank_api_key_is_config_error() {
        let rag_config = RagConfig::default();
        let client = GeminiClient::new(&rag_config);

        let mut request = LlmChatRequest::new();
        request.add_user_message("hi");
        let result = client.chat(request).await;
        assert!(matches!(result, Err(LlmError::Config(_))));
    }

    #[test]
    fn test_no_system_instruction_when_absent() {
        let client = test_client();
        let mut request = LlmChatRequest::new();
        request.add_user_message("q");
        let body = client.build_request_body(&request);
        assert!(body.get("systemInstruction").is_none());
    }
}
