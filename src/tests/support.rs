//! Test Doubles
//!
//! Scripted LLM backend, fixed-response search adapter, and a recording
//! phase callback for asserting event order.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::chat::{ChatPhase, ChatPhaseCallback};
use crate::core::llm::{
    LlmChatRequest, LlmChatResponse, LlmClient, LlmError, StreamChunk, StreamReceiver,
};
use crate::core::search::{Document, SearchAdapter, SearchError};

// ============================================================================
// Scripted LLM backend
// ============================================================================

/// One canned backend interaction.
pub enum Scripted {
    /// Returned whole from `chat`; streamed as a single delta.
    Text(String),
    /// Streamed as one delta per element.
    Chunks(Vec<String>),
    /// Both `chat` and `stream_chat` fail with an API error.
    Fail(String),
}

impl Scripted {
    pub fn text(s: &str) -> Self {
        Scripted::Text(s.to_string())
    }

    pub fn chunks(parts: &[&str]) -> Self {
        Scripted::Chunks(parts.iter().map(|s| s.to_string()).collect())
    }
}

/// Backend that replays a script in call order under a fixed name.
pub struct ScriptedLlmClient {
    name: &'static str,
    script: Mutex<VecDeque<Scripted>>,
}

impl ScriptedLlmClient {
    pub fn new(name: &'static str, script: Vec<Scripted>) -> Self {
        Self {
            name,
            script: Mutex::new(script.into_iter().collect()),
        }
    }

    fn next(&self) -> Scripted {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Scripted::Text(String::new()))
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn chat(&self, _request: LlmChatRequest) -> Result<LlmChatResponse, LlmError> {
        match self.next() {
            Scripted::Text(content) => Ok(LlmChatResponse {
                content,
                model: "scripted".to_string(),
                ..Default::default()
            }),
            Scripted::Chunks(parts) => Ok(LlmChatResponse {
                content: parts.concat(),
                model: "scripted".to_string(),
                ..Default::default()
            }),
            Scripted::Fail(message) => Err(LlmError::api(500, &message)),
        }
    }

    async fn stream_chat(&self, _request: LlmChatRequest) -> Result<StreamReceiver, LlmError> {
        let parts = match self.next() {
            Scripted::Text(content) => vec![content],
            Scripted::Chunks(parts) => parts,
            Scripted::Fail(message) => return Err(LlmError::api(500, &message)),
        };
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            for part in parts {
                if tx.send(Ok(StreamChunk::delta(part))).await.is_err() {
                    return;
                }
            }
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

// ============================================================================
// Static search adapter
// ============================================================================

/// Adapter answering from fixed tables, recording every query.
pub struct StaticSearchAdapter {
    /// Hits per exact query string; unknown queries return no hits.
    hits: HashMap<String, Vec<Document>>,
    /// Full documents per doc_id for fetch.
    full_docs: HashMap<String, Document>,
    /// When set, every fetch fails with a backend error.
    fail_fetch: bool,
    pub queries: Mutex<Vec<String>>,
    pub fetched_ids: Mutex<Vec<Vec<String>>>,
}

impl StaticSearchAdapter {
    pub fn new() -> Self {
        Self {
            hits: HashMap::new(),
            full_docs: HashMap::new(),
            fail_fetch: false,
            queries: Mutex::new(Vec::new()),
            fetched_ids: Mutex::new(Vec::new()),
        }
    }

    pub fn with_hits(mut self, query: &str, docs: Vec<Document>) -> Self {
        self.hits.insert(query.to_string(), docs);
        self
    }

    pub fn with_full_doc(mut self, doc: Document) -> Self {
        self.full_docs.insert(doc.doc_id().to_string(), doc);
        self
    }

    pub fn with_failing_fetch(mut self) -> Self {
        self.fail_fetch = true;
        self
    }

    pub fn recorded_queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchAdapter for StaticSearchAdapter {
    async fn search(&self, query: &str, max_docs: usize) -> Result<Vec<Document>, SearchError> {
        self.queries.lock().unwrap().push(query.to_string());
        let mut docs = self.hits.get(query).cloned().unwrap_or_default();
        docs.truncate(max_docs);
        Ok(docs)
    }

    async fn fetch_by_ids(
        &self,
        doc_ids: &[String],
        _fields: &[String],
    ) -> Result<Vec<Document>, SearchError> {
        self.fetched_ids.lock().unwrap().push(doc_ids.to_vec());
        if self.fail_fetch {
            return Err(SearchError::Backend("fetch backend unavailable".to_string()));
        }
        Ok(doc_ids
            .iter()
            .filter_map(|id| self.full_docs.get(id).cloned())
            .collect())
    }
}

// ============================================================================
// Recording callback
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Start(&'static str, String, Option<String>),
    Complete(&'static str),
    Chunk(String, bool),
    Error(&'static str, String),
}

/// Callback that records every event for later assertions.
#[derive(Default)]
pub struct RecordingCallback {
    pub events: Vec<Event>,
}

impl RecordingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags of the phases started, in order.
    pub fn started_phases(&self) -> Vec<&'static str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Start(tag, _, _) => Some(*tag),
                _ => None,
            })
            .collect()
    }

    /// Every start must be followed by exactly one complete for the same
    /// tag before the next start.
    pub fn assert_brackets_paired(&self) {
        let mut open: Option<&'static str> = None;
        for event in &self.events {
            match event {
                Event::Start(tag, _, _) => {
                    assert!(open.is_none(), "phase {tag} started while {open:?} open");
                    open = Some(tag);
                }
                Event::Complete(tag) => {
                    assert_eq!(open, Some(*tag), "unbalanced complete for {tag}");
                    open = None;
                }
                _ => {}
            }
        }
        assert!(open.is_none(), "phase {open:?} never completed");
    }

    pub fn concatenated_chunks(&self) -> String {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Chunk(content, _) => Some(content.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn terminal_chunk_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, Event::Chunk(_, true)))
            .count()
    }

    pub fn errors(&self) -> Vec<(&'static str, String)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Error(tag, message) => Some((*tag, message.clone())),
                _ => None,
            })
            .collect()
    }
}

impl ChatPhaseCallback for RecordingCallback {
    fn on_phase_start(&mut self, phase: ChatPhase, label: &str, detail: Option<&str>) {
        self.events.push(Event::Start(
            phase.tag(),
            label.to_string(),
            detail.map(|d| d.to_string()),
        ));
    }

    fn on_phase_complete(&mut self, phase: ChatPhase) {
        self.events.push(Event::Complete(phase.tag()));
    }

    fn on_chunk(&mut self, chunk: &str, done: bool) {
        self.events.push(Event::Chunk(chunk.to_string(), done));
    }

    fn on_error(&mut self, phase: ChatPhase, message: &str) {
        self.events.push(Event::Error(phase.tag(), message.to_string()));
    }
}

// ============================================================================
// Document helpers
// ============================================================================

pub fn hit(doc_id: &str, title: &str, description: &str) -> Document {
    let mut doc = Document::new();
    doc.set("doc_id", doc_id);
    doc.set("title", title);
    doc.set("content_description", description);
    doc
}

pub fn full_doc(doc_id: &str, title: &str, url: &str, content: &str) -> Document {
    let mut doc = Document::new();
    doc.set("doc_id", doc_id);
    doc.set("title", title);
    doc.set("url", url);
    doc.set("content", content);
    doc
}
