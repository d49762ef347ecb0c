//! Intent and Relevance Types
//!
//! Results of the two LLM judgement calls in the pipeline: what the user
//! wants, and which search hits are worth fetching.

use serde::{Deserialize, Serialize};

use super::json;

// ============================================================================
// Intent
// ============================================================================

/// Classification of a user message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatIntent {
    Search,
    Faq,
    Summary,
    Unclear,
}

impl ChatIntent {
    /// Parse a classifier-emitted intent value. Unknown values collapse
    /// to `Unclear`.
    pub fn from_value(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "search" => ChatIntent::Search,
            "faq" => ChatIntent::Faq,
            "summary" => ChatIntent::Summary,
            _ => ChatIntent::Unclear,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChatIntent::Search => "search",
            ChatIntent::Faq => "faq",
            ChatIntent::Summary => "summary",
            ChatIntent::Unclear => "unclear",
        }
    }
}

/// Result of intent detection.
///
/// Each variant carries exactly the fields its intent requires: a lexical
/// query for search/FAQ, a document URL for summary, nothing for unclear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentDetectionResult {
    pub intent: ChatIntent,
    pub query: Option<String>,
    pub document_url: Option<String>,
    pub reasoning: String,
}

impl IntentDetectionResult {
    pub fn search(query: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            intent: ChatIntent::Search,
            query: Some(query.into()),
            document_url: None,
            reasoning: reasoning.into(),
        }
    }

    pub fn faq(query: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            intent: ChatIntent::Faq,
            query: Some(query.into()),
            document_url: None,
            reasoning: reasoning.into(),
        }
    }

    pub fn summary(document_url: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            intent: ChatIntent::Summary,
            query: None,
            document_url: Some(document_url.into()),
            reasoning: reasoning.into(),
        }
    }

    pub fn unclear(reasoning: impl Into<String>) -> Self {
        Self {
            intent: ChatIntent::Unclear,
            query: None,
            document_url: None,
            reasoning: reasoning.into(),
        }
    }

    /// Fallback when the classifier output is unusable: search with the
    /// user's own words so the pipeline proceeds and downstream evaluation
    /// filters irrelevance.
    pub fn fallback_search(user_message: impl Into<String>) -> Self {
        Self::search(user_message, "Fallback: intent detection failed")
    }

    /// Parse a classifier response (possibly code-fenced, possibly partial).
    pub fn parse(response: &str) -> Self {
        let intent = ChatIntent::from_value(&json::extract_string(response, "intent"));
        let reasoning = json::extract_string(response, "reasoning");

        match intent {
            ChatIntent::Search => Self::search(json::extract_string(response, "query"), reasoning),
            ChatIntent::Faq => Self::faq(json::extract_string(response, "query"), reasoning),
            ChatIntent::Summary => {
                Self::summary(json::extract_string(response, "url"), reasoning)
            }
            ChatIntent::Unclear => Self::unclear(reasoning),
        }
    }

    /// Render back to the classifier's JSON shape.
    pub fn render(&self) -> String {
        let mut obj = serde_json::Map::new();
        obj.insert(
            "intent".to_string(),
            serde_json::Value::String(self.intent.as_str().to_string()),
        );
        if let Some(query) = &self.query {
            obj.insert(
                "query".to_string(),
                serde_json::Value::String(query.clone()),
            );
        }
        if let Some(url) = &self.document_url {
            obj.insert("url".to_string(), serde_json::Value::String(url.clone()));
        }
        obj.insert(
            "reasoning".to_string(),
            serde_json::Value::String(self.reasoning.clone()),
        );
        serde_json::Value::Object(obj).to_string()
    }
}

// ============================================================================
// Relevance Evaluation
// ============================================================================

/// Result of evaluating search hits for relevance.
///
/// When `has_relevant_results` is false both lists are empty. Indexes are
/// 1-based, unique, within the input range, and capped by configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevanceEvaluationResult {
    pub has_relevant_results: bool,
    pub relevant_indexes: Vec<usize>,
    pub relevant_doc_ids: Vec<String>,
}

impl RelevanceEvaluationResult {
    pub fn no_relevant_results() -> Self {
        Self {
            has_relevant_results: false,
            relevant_indexes: Vec::new(),
            relevant_doc_ids: Vec::new(),
        }
    }

    pub fn with_relevant_docs(doc_ids: Vec<String>, indexes: Vec<usize>) -> Self {
        Self {
            has_relevant_results: !doc_ids.is_empty(),
            relevant_indexes: indexes,
            relevant_doc_ids: doc_ids,
        }
    }

    /// Fallback when the evaluator output is unusable: treat every hit as
    /// relevant rather than dropping the user's question.
    pub fn fallback_all_relevant(doc_ids: Vec<String>) -> Self {
        let indexes = (1..=doc_ids.len()).collect();
        Self {
            has_relevant_results: !doc_ids.is_empty(),
            relevant_indexes: indexes,
            relevant_doc_ids: doc_ids,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_from_value() {
        assert_eq!(ChatIntent::from_value("search"), ChatIntent::Search);
        assert_eq!(ChatIntent::from_value("FAQ"), ChatIntent::Faq);
        assert_eq!(ChatIntent::from_value(" Summary "), ChatIntent::Summary);
        assert_eq!(ChatIntent::from_value("banana"), ChatIntent::Unclear);
        assert_eq!(ChatIntent::from_value(""), ChatIntent::Unclear);
    }

    #[test]
    fn test_parse_search_intent() {
        let result = IntentDetectionResult::parse(
            "{\"intent\":\"search\",\"query\":\"+Fess +Docker\",\"reasoning\":\"Tutorial query\"}",
        );
        assert_eq!(result.intent, ChatIntent::Search);
        assert_eq!(result.query.as_deref(), Some("+Fess +Docker"));
        assert!(result.document_url.is_none());
    }

    #[test]
    fn test_parse_summary_intent() {
        let result = IntentDetectionResult::parse(
            "{\"intent\":\"summary\",\"url\":\"https://x/y\",\"reasoning\":\"URL given\"}",
        );
        assert_eq!(result.intent, ChatIntent::Summary);
        assert_eq!(result.document_url.as_deref(), Some("https://x/y"));
        assert!(result.query.is_none());
    }

    #[test]
    fn test_parse_unknown_intent_is_unclear() {
        let result = IntentDetectionResult::parse("{\"intent\":\"nonsense\"}");
        assert_eq!(result.intent, ChatIntent::Unclear);
    }

    #[test]
    fn test_parse_fenced_matches_unfenced() {
        let raw = "{\"intent\":\"faq\",\"query\":\"install\",\"reasoning\":\"faq\"}";
        let fenced = format!("```json\n{raw}\n```");
        assert_eq!(
            IntentDetectionResult::parse(raw),
            IntentDetectionResult::parse(&fenced)
        );
    }

    #[test]
    fn test_render_parse_roundtrip() {
        let cases = vec![
            IntentDetectionResult::search("title:\"Fess\"^2", "product search"),
            IntentDetectionResult::faq("+install +guide", "how-to"),
            IntentDetectionResult::summary("https://example.com/doc", "url given"),
            IntentDetectionResult::unclear("too vague"),
        ];
        for case in cases {
            assert_eq!(IntentDetectionResult::parse(&case.render()), case);
        }
    }

    #[test]
    fn test_no_relevant_results_is_empty() {
        let result = RelevanceEvaluationResult::no_relevant_results();
        assert!(!result.has_relevant_results);
        assert!(result.relevant_indexes.is_empty());
        assert!(result.relevant_doc_ids.is_empty());
    }

    #[test]
    fn test_fallback_all_relevant() {
        let result = RelevanceEvaluationResult::fallback_all_relevant(vec![
            "a".to_string(),
            "b".to_string(),
        ]);
        assert!(result.has_relevant_results);
        assert_eq!(result.relevant_indexes, vec![1, 2]);
        assert_eq!(result.relevant_doc_ids, vec!["a", "b"]);
    }

    #[test]
    fn test_fallback_all_relevant_empty() {
        let result = RelevanceEvaluationResult::fallback_all_relevant(Vec::new());
        assert!(!result.has_relevant_results);
    }
}
