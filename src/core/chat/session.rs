//! Chat Session Store
//!
//! In-process mapping from session id to conversation state with bounded
//! history. Sessions are created on first request, mutated only by the
//! orchestrator at the end of a successful turn, and evicted after idling
//! past the configured window. Nothing survives a process restart.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::core::search::Document;

// ============================================================================
// Messages
// ============================================================================

/// Role of a stored chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

/// A cited source document attached to an assistant turn.
/// Sources are numbered from 1 in the order they were shown to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSource {
    pub index: usize,
    pub document: Document,
}

/// One turn of a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    /// Original model-emitted Markdown for assistant turns
    pub content: String,
    /// Rendered sanitized HTML; assistant turns only, and only when
    /// rendering succeeded
    pub html_content: Option<String>,
    pub sources: Vec<ChatSource>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            html_content: None,
            sources: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            html_content: None,
            sources: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == ChatRole::User
    }

    pub fn is_assistant(&self) -> bool {
        self.role == ChatRole::Assistant
    }

    pub fn add_source(&mut self, source: ChatSource) {
        self.sources.push(source);
    }
}

// ============================================================================
// Session
// ============================================================================

/// One conversation: identity plus ordered message history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub session_id: String,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(session_id: String, user_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            user_id,
            created_at: now,
            last_activity: now,
            messages: Vec::new(),
        }
    }

    pub fn add_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.touch();
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Trim oldest history until `len <= max_messages`. Entries are removed
    /// in user/assistant pairs so the remaining history keeps alternating.
    /// Idempotent: trimming twice equals trimming once.
    pub fn trim_history(&mut self, max_messages: usize) {
        while self.messages.len() > max_messages {
            let remove = if self.messages.len() >= 2
                && self.messages[0].is_user()
                && self.messages[1].is_assistant()
            {
                2
            } else {
                1
            };
            // Pair removal may land exactly one below the bound; that is fine.
            self.messages.drain(..remove);
        }
    }
}

// ============================================================================
// Session manager
// ============================================================================

/// Thread-safe session registry. `get_or_create` is atomic per id; each
/// session carries its own lock so a turn's append-and-trim is serialized
/// without holding the map.
pub struct ChatSessionManager {
    sessions: RwLock<HashMap<String, Arc<Mutex<ChatSession>>>>,
}

impl ChatSessionManager {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Return the session for a known id, or allocate a new one with a
    /// server-chosen opaque id.
    pub async fn get_or_create(
        &self,
        session_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Arc<Mutex<ChatSession>> {
        if let Some(id) = session_id {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(id) {
                return session.clone();
            }
        }

        let mut sessions = self.sessions.write().await;
        // Re-check under the write lock so concurrent creators converge
        if let Some(id) = session_id {
            if let Some(session) = sessions.get(id) {
                return session.clone();
            }
        }

        let id = Uuid::new_v4().to_string();
        let session = Arc::new(Mutex::new(ChatSession::new(
            id.clone(),
            user_id.map(|u| u.to_string()),
        )));
        sessions.insert(id.clone(), session.clone());
        tracing::debug!("[RAG] Created chat session. sessionId={}", id);
        session
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<Mutex<ChatSession>>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn remove(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Spawn a periodic sweep evicting sessions idle past the window.
    /// A non-positive window disables the task. The owner aborts the
    /// handle on shutdown.
    pub fn start_eviction_task(
        self: &std::sync::Arc<Self>,
        max_idle_secs: i64,
    ) -> Option<tokio::task::JoinHandle<()>> {
        if max_idle_secs <= 0 {
            tracing::debug!("Session eviction is disabled. window={}", max_idle_secs);
            return None;
        }
        let manager = self.clone();
        let handle = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(max_idle_secs as u64));
            // Skip the immediate first tick; nothing can be idle yet.
            interval.tick().await;
            loop {
                interval.tick().await;
                manager.evict_idle(max_idle_secs).await;
            }
        });
        tracing::debug!("Started session eviction task. window={}s", max_idle_secs);
        Some(handle)
    }

    /// Evict sessions idle longer than `max_idle_secs`. Returns the number
    /// of sessions removed. A non-positive window disables eviction.
    pub async fn evict_idle(&self, max_idle_secs: i64) -> usize {
        if max_idle_secs <= 0 {
            return 0;
        }
        let cutoff = Utc::now() - Duration::seconds(max_idle_secs);

        let mut expired = Vec::new();
        {
            let sessions = self.sessions.read().await;
            for (id, session) in sessions.iter() {
                if session.lock().await.last_activity < cutoff {
                    expired.push(id.clone());
                }
            }
        }

        let mut sessions = self.sessions.write().await;
        let mut removed = 0;
        for id in expired {
            if sessions.remove(&id).is_some() {
                tracing::info!("Evicted idle chat session. sessionId={}", id);
                removed += 1;
            }
        }
        removed
    }
}

impl Default for ChatSessionManager {
    fn default() -> Self {
        Self::new()
    }
}
