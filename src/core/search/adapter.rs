//! Search Adapter
//!
//! Interface to the external document index. The index itself is a
//! collaborator; this crate only constructs lexical queries against it
//! (`title:"X"^2`, `+term`, `OR` grouping, phrase quoting, and the
//! exact-URL form `url:"..."`) and reads back attribute-bag documents.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::Result;

/// A document returned by the index: an arbitrary string-keyed attribute
/// bag with typed accessors for the fields this crate reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(pub serde_json::Map<String, serde_json::Value>);

impl Document {
    pub fn new() -> Self {
        Self(serde_json::Map::new())
    }

    /// A string attribute, or empty string when absent or non-string.
    pub fn get_str(&self, key: &str) -> &str {
        self.0.get(key).and_then(|v| v.as_str()).unwrap_or("")
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0
            .insert(key.into(), serde_json::Value::String(value.into()));
    }

    pub fn doc_id(&self) -> &str {
        self.get_str("doc_id")
    }

    pub fn title(&self) -> &str {
        self.get_str("title")
    }

    pub fn url(&self) -> &str {
        self.get_str("url")
    }

    pub fn content(&self) -> &str {
        self.get_str("content")
    }

    pub fn content_description(&self) -> &str {
        self.get_str("content_description")
    }
}

/// Interface to the document index.
#[async_trait]
pub trait SearchAdapter: Send + Sync {
    /// Run a lexical query, returning at most `max_docs` hits.
    async fn search(&self, query: &str, max_docs: usize) -> Result<Vec<Document>>;

    /// Fetch full content for specific documents, restricted to `fields`.
    async fn fetch_by_ids(&self, doc_ids: &[String], fields: &[String]) -> Result<Vec<Document>>;
}
