//! RAG Primitives
//!
//! [`LlmFacade`] layers the RAG workflow operations over one backend
//! driver: intent detection, relevance evaluation, and the answer
//! generators. It owns prompt construction and response parsing; the
//! driver underneath owns only the wire.
//!
//! Classification failures never escape this module — intent detection
//! falls back to searching with the user's own words, and evaluation falls
//! back to treating every hit as relevant. The pipeline must not stall on
//! a malformed judgement.

use std::sync::Arc;
use std::time::Instant;

use crate::config::RagConfig;
use crate::core::search::Document;

use super::client::{LlmClient, StreamReceiver};
use super::error::Result;
use super::intent::{IntentDetectionResult, RelevanceEvaluationResult};
use super::json;
use super::prompts::{self, PromptTemplates, UserLocale};
use super::types::{LlmChatRequest, LlmChatResponse, LlmMessage};

/// Tokens allotted to the small classifier calls.
const JUDGEMENT_MAX_TOKENS: u32 = 500;
/// Temperature for the classifier calls; judgements should be stable.
const JUDGEMENT_TEMPERATURE: f64 = 0.3;
/// Characters reserved when truncating a context block mid-document.
const TRUNCATION_RESERVE: usize = 100;

/// Provider-agnostic RAG operations over a single backend driver.
pub struct LlmFacade {
    client: Arc<dyn LlmClient>,
    templates: Arc<PromptTemplates>,
    config: Arc<RagConfig>,
    locale: UserLocale,
}

impl LlmFacade {
    pub fn new(
        client: Arc<dyn LlmClient>,
        templates: Arc<PromptTemplates>,
        config: Arc<RagConfig>,
        locale: UserLocale,
    ) -> Self {
        Self {
            client,
            templates,
            config,
            locale,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.client.name()
    }

    // ========================================================================
    // Judgements
    // ========================================================================

    /// Classify the user's message. Never fails: any backend or parse
    /// problem falls back to a search with the original message.
    pub async fn detect_intent(&self, user_message: &str) -> IntentDetectionResult {
        let start = Instant::now();
        let prompt = self.build_intent_detection_prompt(user_message);
        tracing::debug!("[RAG:INTENT] Starting intent detection. userMessage={}", user_message);

        let mut request = LlmChatRequest::new()
            .with_temperature(JUDGEMENT_TEMPERATURE)
            .with_max_tokens(JUDGEMENT_MAX_TOKENS);
        request.add_user_message(prompt);

        let response = match self.client.chat(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    "Failed to detect intent, falling back to search. error={}, elapsed={}ms",
                    e,
                    start.elapsed().as_millis()
                );
                return IntentDetectionResult::fallback_search(user_message);
            }
        };

        // A response with no extractable intent field is a parse failure,
        // not an unclear classification.
        if json::extract_string(&response.content, "intent").is_empty() {
            tracing::warn!(
                "Unparseable intent response, falling back to search. response={}",
                response.content
            );
            return IntentDetectionResult::fallback_search(user_message);
        }

        let result = IntentDetectionResult::parse(&response.content);
        tracing::debug!(
            "[RAG:INTENT] Intent detection completed. intent={}, query={:?}, reasoning={}, elapsed={}ms",
            result.intent.as_str(),
            result.query,
            result.reasoning,
            start.elapsed().as_millis()
        );
        result
    }

    /// Judge which search hits are relevant. Never fails: any backend or
    /// parse problem falls back to treating every hit as relevant.
    pub async fn evaluate_results(
        &self,
        user_message: &str,
        query: &str,
        search_results: &[Document],
    ) -> RelevanceEvaluationResult {
        let start = Instant::now();
        tracing::debug!(
            "[RAG:EVAL] Starting result evaluation. query={}, resultCount={}",
            query,
            search_results.len()
        );

        let prompt = self.build_evaluation_prompt(user_message, query, search_results);
        let mut request = LlmChatRequest::new()
            .with_temperature(JUDGEMENT_TEMPERATURE)
            .with_max_tokens(JUDGEMENT_MAX_TOKENS);
        request.add_user_message(prompt);

        let content = match self.client.chat(request).await {
            Ok(response) => response.content,
            Err(e) => {
                tracing::warn!(
                    "Failed to evaluate results, using all results. error={}, elapsed={}ms",
                    e,
                    start.elapsed().as_millis()
                );
                return RelevanceEvaluationResult::fallback_all_relevant(all_doc_ids(
                    search_results,
                ));
            }
        };

        let result = match json::try_extract_bool(&content, "has_relevant") {
            None => {
                tracing::warn!(
                    "Unparseable evaluation response, using all results. response={}",
                    content
                );
                RelevanceEvaluationResult::fallback_all_relevant(all_doc_ids(search_results))
            }
            Some(false) => RelevanceEvaluationResult::no_relevant_results(),
            Some(true) => {
                // Out-of-range indexes are silently dropped; the cap applies
                // after filtering.
                let mut seen = std::collections::HashSet::new();
                let mut indexes: Vec<usize> = json::extract_int_array(&content, "relevant_indexes")
                    .into_iter()
                    .filter(|i| *i >= 1 && (*i as usize) <= search_results.len())
                    .map(|i| i as usize)
                    .filter(|i| seen.insert(*i))
                    .collect();
                indexes.truncate(self.config.evaluation_max_relevant_docs);

                let doc_ids: Vec<String> = indexes
                    .iter()
                    .map(|i| search_results[i - 1].doc_id().to_string())
                    .filter(|id| !id.is_empty())
                    .collect();
                RelevanceEvaluationResult::with_relevant_docs(doc_ids, indexes)
            }
        };

        tracing::debug!(
            "[RAG:EVAL] Result evaluation completed. hasRelevant={}, relevantDocIds={:?}, elapsed={}ms",
            result.has_relevant_results,
            result.relevant_doc_ids,
            start.elapsed().as_millis()
        );
        result
    }

    // ========================================================================
    // Answer generation
    // ========================================================================

    /// Generate a grounded answer, blocking until the full response.
    pub async fn generate_answer(
        &self,
        user_message: &str,
        documents: &[Document],
        history: &[LlmMessage],
    ) -> Result<LlmChatResponse> {
        tracing::debug!(
            "[RAG:ANSWER] generate_answer. documentCount={}, historySize={}",
            documents.len(),
            history.len()
        );
        let context = self.build_context(documents);
        let request = self.build_answer_request(user_message, &context, history, false);
        self.client.chat(request).await
    }

    /// Generate a grounded answer as a token stream.
    pub async fn stream_generate_answer(
        &self,
        user_message: &str,
        documents: &[Document],
        history: &[LlmMessage],
    ) -> Result<StreamReceiver> {
        tracing::debug!(
            "[RAG:ANSWER] stream_generate_answer. documentCount={}, historySize={}",
            documents.len(),
            history.len()
        );
        let context = self.build_context(documents);
        let request = self.build_answer_request(user_message, &context, history, true);
        self.client.stream_chat(request).await
    }

    /// FAQ variant: direct, concise, cited answers.
    pub async fn generate_faq_answer_response(
        &self,
        user_message: &str,
        documents: &[Document],
        history: &[LlmMessage],
    ) -> Result<StreamReceiver> {
        let context = self.build_context(documents);
        let system_prompt = prompts::render(
            self.templates.faq_system(),
            &[
                ("systemPrompt", self.config.system_prompt.as_str()),
                ("context", context.as_str()),
                ("languageInstruction", &self.locale.language_instruction()),
            ],
        );
        let request = self.build_streaming_request(system_prompt, history, user_message);
        self.client.stream_chat(request).await
    }

    /// Summarize specific documents from their full content. Unlike the
    /// answer context, document content is not truncated here.
    pub async fn generate_summary_response(
        &self,
        user_message: &str,
        documents: &[Document],
        history: &[LlmMessage],
    ) -> Result<StreamReceiver> {
        let mut document_content = String::new();
        for doc in documents {
            document_content.push_str("=== Document ===\n");
            if !doc.title().is_empty() {
                document_content.push_str("Title: ");
                document_content.push_str(doc.title());
                document_content.push('\n');
            }
            if !doc.url().is_empty() {
                document_content.push_str("URL: ");
                document_content.push_str(doc.url());
                document_content.push('\n');
            }
            if !doc.content().is_empty() {
                document_content.push_str("Content:\n");
                document_content.push_str(doc.content());
                document_content.push_str("\n\n");
            }
        }

        let system_prompt = prompts::render(
            self.templates.summary_system(),
            &[
                ("systemPrompt", self.config.system_prompt.as_str()),
                ("documentContent", document_content.as_str()),
                ("languageInstruction", &self.locale.language_instruction()),
            ],
        );
        let request = self.build_streaming_request(system_prompt, history, user_message);
        self.client.stream_chat(request).await
    }

    /// Ask the user to clarify a too-vague question.
    pub async fn generate_unclear_intent_response(
        &self,
        user_message: &str,
        history: &[LlmMessage],
    ) -> Result<StreamReceiver> {
        let system_prompt = prompts::render(
            self.templates.unclear_intent_system(),
            &[("languageInstruction", &self.locale.language_instruction())],
        );
        let request = self.build_streaming_request(system_prompt, history, user_message);
        self.client.stream_chat(request).await
    }

    /// Tell the user the search came back empty.
    pub async fn generate_no_results_response(
        &self,
        user_message: &str,
        history: &[LlmMessage],
    ) -> Result<StreamReceiver> {
        let system_prompt = prompts::render(
            self.templates.no_results_system(),
            &[("languageInstruction", &self.locale.language_instruction())],
        );
        let request = self.build_streaming_request(system_prompt, history, user_message);
        self.client.stream_chat(request).await
    }

    /// Tell the user the requested document URL is not in the index.
    pub async fn generate_document_not_found_response(
        &self,
        user_message: &str,
        document_url: &str,
        history: &[LlmMessage],
    ) -> Result<StreamReceiver> {
        let system_prompt = prompts::render(
            self.templates.document_not_found_system(),
            &[
                ("documentUrl", document_url),
                ("languageInstruction", &self.locale.language_instruction()),
            ],
        );
        let request = self.build_streaming_request(system_prompt, history, user_message);
        self.client.stream_chat(request).await
    }

    /// Answer without any document context.
    pub async fn generate_direct_answer(
        &self,
        user_message: &str,
        history: &[LlmMessage],
    ) -> Result<StreamReceiver> {
        let system_prompt = prompts::render(
            self.templates.direct_answer_system(),
            &[
                ("systemPrompt", self.config.system_prompt.as_str()),
                ("languageInstruction", &self.locale.language_instruction()),
            ],
        );
        let request = self.build_streaming_request(system_prompt, history, user_message);
        self.client.stream_chat(request).await
    }

    // ========================================================================
    // Prompt construction
    // ========================================================================

    fn build_intent_detection_prompt(&self, user_message: &str) -> String {
        prompts::render(
            self.templates.intent_detection(),
            &[
                ("userMessage", user_message),
                ("languageInstruction", &self.locale.language_instruction()),
            ],
        )
    }

    fn build_evaluation_prompt(
        &self,
        user_message: &str,
        query: &str,
        search_results: &[Document],
    ) -> String {
        let mut results_text = String::new();
        for (i, doc) in search_results.iter().enumerate() {
            results_text.push_str(&format!(
                "[{}] Title: {}\nDescription: {}\n\n",
                i + 1,
                doc.title(),
                doc.content_description()
            ));
        }

        prompts::render(
            self.templates.evaluation(),
            &[
                (
                    "maxRelevantDocs",
                    &self.config.evaluation_max_relevant_docs.to_string(),
                ),
                ("userMessage", user_message),
                ("query", query),
                ("searchResults", results_text.as_str()),
                ("languageInstruction", &self.locale.language_instruction()),
            ],
        )
    }

    /// Build the numbered context block, truncated to the configured
    /// character budget with a `...` marker when content is cut.
    pub(crate) fn build_context(&self, documents: &[Document]) -> String {
        let max_chars = self.config.context_max_chars;
        let mut context =
            String::from("The following are documents that contain information to answer the question:\n\n");

        let mut index = 1;
        let mut truncated = false;
        for doc in documents {
            let mut doc_block = format!("[{}] ", index);
            if !doc.title().is_empty() {
                doc_block.push_str(doc.title());
                doc_block.push('\n');
            }
            if !doc.url().is_empty() {
                doc_block.push_str("URL: ");
                doc_block.push_str(doc.url());
                doc_block.push('\n');
            }
            // Prefer full content, fall back to the description
            let doc_content = if !doc.content().is_empty() {
                doc.content()
            } else {
                doc.content_description()
            };
            if !doc_content.is_empty() {
                doc_block.push_str(doc_content);
                doc_block.push('\n');
            }
            doc_block.push('\n');

            if context.len() + doc_block.len() > max_chars {
                let remaining = max_chars
                    .saturating_sub(context.len())
                    .saturating_sub(TRUNCATION_RESERVE);
                if remaining > 0 && doc_block.len() > remaining {
                    let mut cut = remaining;
                    while !doc_block.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    doc_block.truncate(cut);
                    doc_block.push_str("...\n\n");
                    context.push_str(&doc_block);
                }
                truncated = true;
                break;
            }

            context.push_str(&doc_block);
            index += 1;
        }

        tracing::debug!(
            "[RAG:CONTEXT] Context built. contextLength={}, documentsIncluded={}, truncated={}",
            context.len(),
            index - 1,
            truncated
        );
        context
    }

    fn build_answer_request(
        &self,
        user_message: &str,
        context: &str,
        history: &[LlmMessage],
        stream: bool,
    ) -> LlmChatRequest {
        let system_prompt = prompts::render(
            self.templates.answer_system(),
            &[
                ("systemPrompt", self.config.system_prompt.as_str()),
                ("context", context),
                ("languageInstruction", &self.locale.language_instruction()),
            ],
        );
        self.build_streaming_request(system_prompt, history, user_message)
            .with_stream(stream)
    }

    fn build_streaming_request(
        &self,
        system_prompt: String,
        history: &[LlmMessage],
        user_message: &str,
    ) -> LlmChatRequest {
        let mut request = LlmChatRequest::new()
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens)
            .with_stream(true);
        request.add_system_message(system_prompt);
        for message in history {
            request.add_message(message.clone());
        }
        request.add_user_message(user_message);
        request
    }
}

fn all_doc_ids(documents: &[Document]) -> Vec<String> {
    documents
        .iter()
        .map(|doc| doc.doc_id().to_string())
        .filter(|id| !id.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::llm::client::StreamChunk;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    /// Backend that replays canned responses in call order.
    struct ScriptedClient {
        responses: std::sync::Mutex<std::collections::VecDeque<String>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: std::sync::Mutex::new(
                    responses.into_iter().map(|s| s.to_string()).collect(),
                ),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn chat(&self, _request: LlmChatRequest) -> Result<LlmChatResponse> {
            let content = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default();
            Ok(LlmChatResponse {
                content,
                model: "scripted".to_string(),
                ..Default::default()
            })
        }

        async fn stream_chat(&self, _request: LlmChatRequest) -> Result<StreamReceiver> {
            let content = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default();
            let (tx, rx) = mpsc::channel(8);
            tokio::spawn(async move {
                let _ = tx.send(Ok(StreamChunk::delta(content))).await;
                let _ = tx
                    .send(Ok(StreamChunk::done("", Some("stop".to_string()))))
                    .await;
            });
            Ok(rx)
        }

        async fn check_availability(&self) -> bool {
            true
        }
    }

    fn facade_with(responses: Vec<&str>, config: RagConfig) -> LlmFacade {
        LlmFacade::new(
            Arc::new(ScriptedClient::new(responses)),
            Arc::new(PromptTemplates::default()),
            Arc::new(config),
            UserLocale::english(),
        )
    }

    fn doc(id: &str, title: &str, description: &str) -> Document {
        let mut d = Document::new();
        d.set("doc_id", id);
        d.set("title", title);
        d.set("content_description", description);
        d
    }

    #[tokio::test]
    async fn test_detect_intent_search() {
        let facade = facade_with(
            vec!["{\"intent\":\"search\",\"query\":\"+Fess +Docker\",\"reasoning\":\"ok\"}"],
            RagConfig::default(),
        );
        let result = facade.detect_intent("How to install Fess on Docker").await;
        assert_eq!(result.intent, crate::core::llm::ChatIntent::Search);
        assert_eq!(result.query.as_deref(), Some("+Fess +Docker"));
    }

    #[tokio::test]
    async fn test_detect_intent_malformed_falls_back_to_search() {
        let facade = facade_with(vec!["I cannot"], RagConfig::default());
        let result = facade.detect_intent("hello there").await;
        assert_eq!(result.intent, crate::core::llm::ChatIntent::Search);
        assert_eq!(result.query.as_deref(), Some("hello there"));
    }

    #[tokio::test]
    async fn test_detect_intent_code_fenced() {
        let facade = facade_with(
            vec!["```json\n{\"intent\":\"unclear\",\"reasoning\":\"vague\"}\n```"],
            RagConfig::default(),
        );
        let result = facade.detect_intent("hello").await;
        assert_eq!(result.intent, crate::core::llm::ChatIntent::Unclear);
    }

    #[tokio::test]
    async fn test_evaluate_results_selects_and_maps() {
        let facade = facade_with(
            vec!["{\"has_relevant\":true,\"relevant_indexes\":[1,3]}"],
            RagConfig::default(),
        );
        let hits = vec![doc("a", "A", "da"), doc("b", "B", "db"), doc("c", "C", "dc")];
        let result = facade.evaluate_results("q", "+q", &hits).await;
        assert!(result.has_relevant_results);
        assert_eq!(result.relevant_indexes, vec![1, 3]);
        assert_eq!(result.relevant_doc_ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_evaluate_results_filters_out_of_range() {
        let facade = facade_with(
            vec!["{\"has_relevant\":true,\"relevant_indexes\":[0,2,9]}"],
            RagConfig::default(),
        );
        let hits = vec![doc("a", "A", "da"), doc("b", "B", "db")];
        let result = facade.evaluate_results("q", "+q", &hits).await;
        assert_eq!(result.relevant_indexes, vec![2]);
        assert_eq!(result.relevant_doc_ids, vec!["b"]);
    }

    #[tokio::test]
    async fn test_evaluate_results_caps_selection() {
        let mut config = RagConfig::default();
        config.evaluation_max_relevant_docs = 2;
        let facade = facade_with(
            vec!["{\"has_relevant\":true,\"relevant_indexes\":[1,2,3]}"],
            config,
        );
        let hits = vec![doc("a", "A", "da"), doc("b", "B", "db"), doc("c", "C", "dc")];
        let result = facade.evaluate_results("q", "+q", &hits).await;
        assert_eq!(result.relevant_indexes.len(), 2);
        assert_eq!(result.relevant_doc_ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_evaluate_results_unparseable_keeps_all() {
        let facade = facade_with(vec!["no json here"], RagConfig::default());
        let hits = vec![doc("a", "A", "da"), doc("b", "B", "db")];
        let result = facade.evaluate_results("q", "+q", &hits).await;
        assert!(result.has_relevant_results);
        assert_eq!(result.relevant_doc_ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_evaluate_results_explicit_false() {
        let facade = facade_with(
            vec!["{\"has_relevant\":false,\"relevant_indexes\":[]}"],
            RagConfig::default(),
        );
        let hits = vec![doc("a", "A", "da")];
        let result = facade.evaluate_results("q", "+q", &hits).await;
        assert!(!result.has_relevant_results);
        assert!(result.relevant_doc_ids.is_empty());
    }

    #[tokio::test]
    async fn test_generate_direct_answer_streams() {
        let facade = facade_with(vec!["The answer is 42."], RagConfig::default());
        let rx = facade.generate_direct_answer("question", &[]).await.unwrap();
        let content = crate::core::llm::drain_stream(rx, |_, _| {}).await.unwrap();
        assert_eq!(content, "The answer is 42.");
    }

    #[test]
    fn test_build_context_numbers_and_falls_back_to_description() {
        let facade = facade_with(vec![], RagConfig::default());
        let mut with_content = doc("a", "First", "desc-a");
        with_content.set("content", "full content a");
        with_content.set("url", "https://x/a");
        let description_only = doc("b", "Second", "desc-b");

        let context = facade.build_context(&[with_content, description_only]);
        assert!(context.contains("[1] First"));
        assert!(context.contains("URL: https://x/a"));
        assert!(context.contains("full content a"));
        assert!(context.contains("[2] Second"));
        assert!(context.contains("desc-b"));
    }

    #[test]
    fn test_build_context_respects_char_budget() {
        let mut config = RagConfig::default();
        config.context_max_chars = 300;
        let facade = facade_with(vec![], config);

        let mut big = doc("a", "Big", "");
        big.set("content", "x".repeat(2000));
        let context = facade.build_context(&[big.clone(), big]);
        assert!(context.len() <= 300);
        assert!(context.contains("..."));
    }

    #[test]
    fn test_build_context_budget_smaller_than_header() {
        let mut config = RagConfig::default();
        config.context_max_chars = 10;
        let facade = facade_with(vec![], config);
        let mut d = doc("a", "T", "");
        d.set("content", "body");
        // Header alone exceeds the budget; no document block is appended.
        let context = facade.build_context(&[d]);
        assert!(!context.contains("[1]"));
    }
}
