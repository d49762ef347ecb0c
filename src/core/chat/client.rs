//! Chat Orchestrator
//!
//! Drives the multi-phase RAG state machine: intent detection, document
//! search, relevance evaluation, content fetch, and answer generation.
//! Token chunks fan out to the caller and to an internal accumulator whose
//! final contents are rendered to HTML and persisted with the assistant
//! turn. The session is mutated only after the final answer phase
//! completes, so a failed or cancelled turn leaves no trace in history.

use std::sync::Arc;
use std::time::Instant;

use crate::config::RagConfig;
use crate::core::llm::{drain_stream, ChatIntent, LlmClientManager, LlmMessage, UserLocale};
use crate::core::markdown::{escape_html, MarkdownRenderer};
use crate::core::search::{Document, SearchAdapter};

use super::error::Result;
use super::phase::{ChatPhase, ChatPhaseCallback};
use super::session::{ChatMessage, ChatSessionManager, ChatSource};

/// One chat turn as submitted by the caller.
#[derive(Debug, Clone)]
pub struct ChatTurnRequest {
    pub session_id: Option<String>,
    pub user_message: String,
    pub user_id: Option<String>,
    pub locale: UserLocale,
}

impl ChatTurnRequest {
    pub fn new(user_message: impl Into<String>) -> Self {
        Self {
            session_id: None,
            user_message: user_message.into(),
            user_id: None,
            locale: UserLocale::english(),
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_locale(mut self, locale: UserLocale) -> Self {
        self.locale = locale;
        self
    }
}

/// Result of a completed chat turn.
#[derive(Debug, Clone)]
pub struct ChatResult {
    pub session_id: String,
    pub message: ChatMessage,
    pub sources: Vec<Document>,
}

/// RAG chat orchestrator.
pub struct ChatClient {
    llm_manager: Arc<LlmClientManager>,
    session_manager: Arc<ChatSessionManager>,
    search_adapter: Arc<dyn SearchAdapter>,
    markdown_renderer: Arc<dyn MarkdownRenderer>,
    config: Arc<RagConfig>,
}

impl ChatClient {
    pub fn new(
        llm_manager: Arc<LlmClientManager>,
        session_manager: Arc<ChatSessionManager>,
        search_adapter: Arc<dyn SearchAdapter>,
        markdown_renderer: Arc<dyn MarkdownRenderer>,
        config: Arc<RagConfig>,
    ) -> Self {
        Self {
            llm_manager,
            session_manager,
            search_adapter,
            markdown_renderer,
            config,
        }
    }

    /// Whether RAG chat can serve requests.
    pub async fn is_available(&self) -> bool {
        self.llm_manager.available().await
    }

    // ========================================================================
    // Simple flows
    // ========================================================================

    /// Single-search chat: search with the raw user message, answer from
    /// the hits, attach every hit as a source.
    pub async fn chat(&self, request: ChatTurnRequest) -> Result<ChatResult> {
        let start = Instant::now();
        tracing::debug!(
            "[RAG] Starting chat request. sessionId={:?}, userMessage={}",
            request.session_id,
            request.user_message
        );

        let session = self
            .session_manager
            .get_or_create(request.session_id.as_deref(), request.user_id.as_deref())
            .await;
        let history = extract_history(&*session.lock().await);
        let search_results = self.search_documents(&request.user_message).await;

        let facade = self.llm_manager.facade(request.locale.clone()).await?;
        let response = facade
            .generate_answer(&request.user_message, &search_results, &history)
            .await
            .map_err(|e| {
                tracing::warn!("Failed to get response from LLM. error={}", e);
                e
            })?;

        let result = self
            .persist_turn(&session, &request.user_message, response.content, None, &search_results)
            .await;

        tracing::debug!(
            "[RAG] Chat request completed. sessionId={}, sourcesCount={}, elapsed={}ms",
            result.session_id,
            result.sources.len(),
            start.elapsed().as_millis()
        );
        Ok(result)
    }

    /// Single-search streaming chat. Chunks reach `on_chunk` as they
    /// arrive; the full answer is persisted afterwards.
    pub async fn stream_chat<F>(
        &self,
        request: ChatTurnRequest,
        mut on_chunk: F,
    ) -> Result<ChatResult>
    where
        F: FnMut(&str, bool) + Send,
    {
        let start = Instant::now();
        tracing::debug!(
            "[RAG] Starting streaming chat request. sessionId={:?}, userMessage={}",
            request.session_id,
            request.user_message
        );

        let session = self
            .session_manager
            .get_or_create(request.session_id.as_deref(), request.user_id.as_deref())
            .await;
        let history = extract_history(&*session.lock().await);
        let search_results = self.search_documents(&request.user_message).await;

        let facade = self.llm_manager.facade(request.locale.clone()).await?;
        let rx = facade
            .stream_generate_answer(&request.user_message, &search_results, &history)
            .await?;
        let content = drain_stream(rx, |chunk, done| on_chunk(chunk, done))
            .await
            .map_err(|e| {
                tracing::warn!("Failed to stream response from LLM. error={}", e);
                e
            })?;

        let result = self
            .persist_turn(&session, &request.user_message, content, None, &search_results)
            .await;

        tracing::debug!(
            "[RAG] Streaming chat request completed. sessionId={}, elapsed={}ms",
            result.session_id,
            start.elapsed().as_millis()
        );
        Ok(result)
    }

    // ========================================================================
    // Phased flow
    // ========================================================================

    /// The multi-phase pipeline: intent detection, search, evaluation,
    /// fetch, and answer generation, with phase events and token chunks
    /// delivered through `callback`.
    pub async fn stream_chat_phased(
        &self,
        request: ChatTurnRequest,
        callback: &mut dyn ChatPhaseCallback,
    ) -> Result<ChatResult> {
        let start = Instant::now();
        tracing::debug!(
            "[RAG] Starting phased chat request. sessionId={:?}, userMessage={}",
            request.session_id,
            request.user_message
        );

        let session = self
            .session_manager
            .get_or_create(request.session_id.as_deref(), request.user_id.as_deref())
            .await;
        let history = extract_history(&*session.lock().await);

        let mut accumulated = String::new();
        let mut sources: Vec<Document> = Vec::new();
        // The phase in progress, for error attribution; the machine's
        // initial state is INTENT.
        let mut current_phase = ChatPhase::Intent;

        let outcome = self
            .run_pipeline(
                &request,
                &history,
                callback,
                &mut accumulated,
                &mut sources,
                &mut current_phase,
            )
            .await;

        if let Err(e) = outcome {
            tracing::warn!(
                "Error during phased chat. phase={}, error={}, elapsed={}ms",
                current_phase,
                e,
                start.elapsed().as_millis()
            );
            callback.on_error(current_phase, &e.to_string());
            return Err(e);
        }

        // Render the accumulated Markdown; fall back to escaping on failure.
        let html_content = match self.markdown_renderer.render(&accumulated) {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!("Markdown rendering failed, escaping raw text. error={}", e);
                escape_html(&accumulated)
            }
        };

        let result = self
            .persist_turn(
                &session,
                &request.user_message,
                accumulated,
                Some(html_content),
                &sources,
            )
            .await;

        tracing::debug!(
            "[RAG] Phased chat request completed. sessionId={}, sourcesCount={}, responseLength={}, elapsed={}ms",
            result.session_id,
            result.sources.len(),
            result.message.content.len(),
            start.elapsed().as_millis()
        );
        Ok(result)
    }

    /// The state machine proper. Transitions depend on the intent
    /// judgement and on intermediate emptiness checks; every answer-
    /// producing state drains the backend stream into the accumulator
    /// while forwarding each chunk to the caller.
    #[allow(clippy::too_many_arguments)]
    async fn run_pipeline(
        &self,
        request: &ChatTurnRequest,
        history: &[LlmMessage],
        callback: &mut dyn ChatPhaseCallback,
        accumulated: &mut String,
        sources: &mut Vec<Document>,
        current_phase: &mut ChatPhase,
    ) -> Result<()> {
        let facade = self.llm_manager.facade(request.locale.clone()).await?;
        let user_message = &request.user_message;

        // Phase 1: intent detection (never fails; falls back internally)
        callback.on_phase_start(ChatPhase::Intent, ChatPhase::Intent.label(), None);
        let intent_result = facade.detect_intent(user_message).await;
        callback.on_phase_complete(ChatPhase::Intent);
        tracing::debug!(
            "[RAG] Phase intent completed. intent={}, query={:?}",
            intent_result.intent.as_str(),
            intent_result.query
        );

        match intent_result.intent {
            ChatIntent::Unclear => {
                *current_phase = ChatPhase::Answer;
                callback.on_phase_start(ChatPhase::Answer, ChatPhase::Answer.label(), None);
                let rx = facade
                    .generate_unclear_intent_response(user_message, history)
                    .await?;
                *accumulated = drain_stream(rx, |chunk, done| callback.on_chunk(chunk, done)).await?;
                callback.on_phase_complete(ChatPhase::Answer);
            }

            ChatIntent::Summary => {
                let document_url = intent_result.document_url.clone().unwrap_or_default();

                *current_phase = ChatPhase::Search;
                callback.on_phase_start(
                    ChatPhase::Search,
                    "Searching for document...",
                    Some(&document_url),
                );
                let url_results = self.search_by_url(&document_url).await?;
                callback.on_phase_complete(ChatPhase::Search);
                tracing::debug!(
                    "[RAG] Phase search completed. documentUrl={}, resultCount={}",
                    document_url,
                    url_results.len()
                );

                if url_results.is_empty() {
                    *current_phase = ChatPhase::Answer;
                    callback.on_phase_start(ChatPhase::Answer, ChatPhase::Answer.label(), None);
                    let rx = facade
                        .generate_document_not_found_response(user_message, &document_url, history)
                        .await?;
                    *accumulated =
                        drain_stream(rx, |chunk, done| callback.on_chunk(chunk, done)).await?;
                    callback.on_phase_complete(ChatPhase::Answer);
                } else {
                    *current_phase = ChatPhase::Fetch;
                    callback.on_phase_start(ChatPhase::Fetch, ChatPhase::Fetch.label(), None);
                    let doc_ids: Vec<String> = url_results
                        .iter()
                        .map(|doc| doc.doc_id().to_string())
                        .filter(|id| !id.is_empty())
                        .collect();
                    let full_docs = self.fetch_full_content(&doc_ids).await?;
                    callback.on_phase_complete(ChatPhase::Fetch);
                    *sources = full_docs.clone();

                    *current_phase = ChatPhase::Answer;
                    callback.on_phase_start(ChatPhase::Answer, "Generating summary...", None);
                    let rx = facade
                        .generate_summary_response(user_message, &full_docs, history)
                        .await?;
                    *accumulated =
                        drain_stream(rx, |chunk, done| callback.on_chunk(chunk, done)).await?;
                    callback.on_phase_complete(ChatPhase::Answer);
                }
            }

            ChatIntent::Search | ChatIntent::Faq => {
                let query = intent_result
                    .query
                    .as_deref()
                    .filter(|q| !q.trim().is_empty())
                    .unwrap_or(user_message);

                // Phase 2: search
                *current_phase = ChatPhase::Search;
                callback.on_phase_start(ChatPhase::Search, ChatPhase::Search.label(), Some(query));
                let search_results = self
                    .search_adapter
                    .search(query, self.config.context_max_documents)
                    .await?;
                callback.on_phase_complete(ChatPhase::Search);
                tracing::debug!(
                    "[RAG] Phase search completed. query={}, resultCount={}",
                    query,
                    search_results.len()
                );

                if search_results.is_empty() {
                    *current_phase = ChatPhase::Answer;
                    callback.on_phase_start(ChatPhase::Answer, ChatPhase::Answer.label(), None);
                    let rx = facade
                        .generate_no_results_response(user_message, history)
                        .await?;
                    *accumulated =
                        drain_stream(rx, |chunk, done| callback.on_chunk(chunk, done)).await?;
                    callback.on_phase_complete(ChatPhase::Answer);
                    return Ok(());
                }

                // Phase 3: evaluate (never fails; falls back internally)
                *current_phase = ChatPhase::Evaluate;
                callback.on_phase_start(ChatPhase::Evaluate, ChatPhase::Evaluate.label(), None);
                let eval_result = facade
                    .evaluate_results(user_message, query, &search_results)
                    .await;
                callback.on_phase_complete(ChatPhase::Evaluate);

                if !eval_result.has_relevant_results {
                    *current_phase = ChatPhase::Answer;
                    callback.on_phase_start(ChatPhase::Answer, ChatPhase::Answer.label(), None);
                    let rx = facade
                        .generate_no_results_response(user_message, history)
                        .await?;
                    *accumulated =
                        drain_stream(rx, |chunk, done| callback.on_chunk(chunk, done)).await?;
                    callback.on_phase_complete(ChatPhase::Answer);
                    return Ok(());
                }

                // Phase 4: fetch full content for the approved subset
                *current_phase = ChatPhase::Fetch;
                callback.on_phase_start(ChatPhase::Fetch, ChatPhase::Fetch.label(), None);
                let full_docs = self.fetch_full_content(&eval_result.relevant_doc_ids).await?;
                callback.on_phase_complete(ChatPhase::Fetch);
                *sources = full_docs.clone();

                // Phase 5: answer (FAQ variant when the intent was FAQ)
                *current_phase = ChatPhase::Answer;
                callback.on_phase_start(ChatPhase::Answer, ChatPhase::Answer.label(), None);
                let rx = if intent_result.intent == ChatIntent::Faq {
                    facade
                        .generate_faq_answer_response(user_message, &full_docs, history)
                        .await?
                } else {
                    facade
                        .stream_generate_answer(user_message, &full_docs, history)
                        .await?
                };
                *accumulated = drain_stream(rx, |chunk, done| callback.on_chunk(chunk, done)).await?;
                callback.on_phase_complete(ChatPhase::Answer);
            }
        }

        Ok(())
    }

    // ========================================================================
    // Collaborator access
    // ========================================================================

    /// Search used by the simple flows: failures degrade to no results.
    async fn search_documents(&self, query: &str) -> Vec<Document> {
        if query.trim().is_empty() {
            return Vec::new();
        }
        match self
            .search_adapter
            .search(query, self.config.context_max_documents)
            .await
        {
            Ok(docs) => docs,
            Err(e) => {
                tracing::warn!("Failed to search documents. query={}, error={}", query, e);
                Vec::new()
            }
        }
    }

    /// Exact-URL lookup for the summary path.
    async fn search_by_url(&self, url: &str) -> Result<Vec<Document>> {
        if url.trim().is_empty() {
            return Ok(Vec::new());
        }
        let query = format!("url:\"{url}\"");
        Ok(self
            .search_adapter
            .search(&query, self.config.context_max_documents)
            .await?)
    }

    /// Fetch full content for the evaluation-approved subset.
    async fn fetch_full_content(&self, doc_ids: &[String]) -> Result<Vec<Document>> {
        if doc_ids.is_empty() {
            tracing::debug!("[RAG] Fetch full content called with empty docIds.");
            return Ok(Vec::new());
        }
        let fields = self.config.content_field_list();
        let docs = self.search_adapter.fetch_by_ids(doc_ids, &fields).await?;
        tracing::debug!(
            "[RAG] Full content fetched. docIdCount={}, fetchedCount={}",
            doc_ids.len(),
            docs.len()
        );
        Ok(docs)
    }

    /// Append the turn to the session, trim history, and build the result.
    async fn persist_turn(
        &self,
        session: &Arc<tokio::sync::Mutex<super::session::ChatSession>>,
        user_message: &str,
        assistant_content: String,
        html_content: Option<String>,
        sources: &[Document],
    ) -> ChatResult {
        let mut assistant_message = ChatMessage::assistant(assistant_content);
        assistant_message.html_content = html_content;
        for (i, doc) in sources.iter().enumerate() {
            assistant_message.add_source(ChatSource {
                index: i + 1,
                document: doc.clone(),
            });
        }

        let mut session = session.lock().await;
        session.add_message(ChatMessage::user(user_message));
        session.add_message(assistant_message.clone());
        session.trim_history(self.config.history_max_messages);

        ChatResult {
            session_id: session.session_id.clone(),
            message: assistant_message,
            sources: sources.to_vec(),
        }
    }
}

/// Conversation history as LLM messages, excluding system turns.
fn extract_history(session: &super::session::ChatSession) -> Vec<LlmMessage> {
    session
        .messages
        .iter()
        .filter_map(|message| {
            if message.is_user() {
                Some(LlmMessage::user(message.content.clone()))
            } else if message.is_assistant() {
                Some(LlmMessage::assistant(message.content.clone()))
            } else {
                None
            }
        })
        .collect()
}
