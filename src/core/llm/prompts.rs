//! Prompt Templates
//!
//! Every RAG primitive has a built-in default prompt; deployments override
//! any of them with opaque template strings. Substitution is plain text
//! replacement over the documented `{{...}}` placeholders — no template
//! engine.
//!
//! Recognized placeholders: `{{userMessage}}`, `{{query}}`,
//! `{{searchResults}}`, `{{documentUrl}}`, `{{maxRelevantDocs}}`,
//! `{{systemPrompt}}`, `{{context}}`, `{{documentContent}}`,
//! `{{languageInstruction}}`.

use serde::{Deserialize, Serialize};

// ============================================================================
// Default templates
// ============================================================================

/// Default prompt for intent detection
pub const DEFAULT_INTENT_DETECTION_PROMPT: &str = r#"Analyze the following user question and determine the intent.
Return a JSON object with:
- "intent": one of:
  - "search": user wants to search for documents
  - "summary": user wants a summary of a specific document (extract URL from question)
  - "faq": user is asking a FAQ-type question
  - "unclear": cannot determine what documents to search (question is too vague)
- "query": Lucene query string for search (required for search/faq intents)
- "url": the document URL to summarize (required for summary intent)
- "reasoning": brief explanation of your decision

LUCENE QUERY GUIDELINES:
- Proper nouns/product names: use quotation marks (e.g., "Fess")
- Title boosting: for important terms, use title:"term"^2
- Required terms: use + prefix (e.g., +Fess +Docker)
- Optional/synonym terms: use OR grouping (e.g., (tutorial OR guide OR howto))
- Multi-word phrases: use quotation marks

IMPORTANT RULES:
1. ALWAYS generate a Lucene query for search/faq intents. Use "unclear" only if truly ambiguous.
2. Do NOT answer from your own knowledge. All responses must be based on document search.
3. If user mentions a specific URL or document path, use "summary" intent.

EXAMPLES:
Input: "Fess"
Output: {"intent":"search","query":"title:\"Fess\"^2 OR \"Fess\"","reasoning":"Product name search"}

Input: "How to use Fess with Docker"
Output: {"intent":"search","query":"+\"Fess\" +Docker (usage OR howto OR tutorial)","reasoning":"Tutorial query"}

{{languageInstruction}}
Question: {{userMessage}}

Response (JSON only):"#;

/// Default prompt for relevance evaluation
pub const DEFAULT_EVALUATION_PROMPT: &str = r#"Given the user question and search results, identify the most relevant documents.
Return a JSON object with:
- "relevant_indexes": array of 1-based indexes of relevant documents (max {{maxRelevantDocs}})
- "has_relevant": boolean indicating if any results are relevant

Question: {{userMessage}}
Query: {{query}}

Search Results:
{{searchResults}}
Response (JSON only):"#;

/// Default system prompt for answer generation
pub const DEFAULT_ANSWER_SYSTEM_PROMPT: &str = "{{systemPrompt}}\n\n{{context}}{{languageInstruction}}";

/// Default system prompt for FAQ answer generation
pub const DEFAULT_FAQ_SYSTEM_PROMPT: &str = r#"{{systemPrompt}}

The user is asking a frequently asked question. Provide a direct, concise answer based solely on the following documents. If the answer is clearly stated in the documents, provide it without unnecessary elaboration. Always cite your sources using [1], [2], etc.

{{context}}{{languageInstruction}}"#;

/// Default system prompt for document summary generation
pub const DEFAULT_SUMMARY_SYSTEM_PROMPT: &str = r#"{{systemPrompt}}

You are summarizing specific documents for the user. Base your summary ONLY on the provided document content. Do NOT add information from your own knowledge.

Document content:
{{documentContent}}{{languageInstruction}}"#;

/// Default system prompt for unclear intent responses
pub const DEFAULT_UNCLEAR_INTENT_SYSTEM_PROMPT: &str = r#"You are a helpful assistant for a document search system. The user's question is too vague to determine what documents to search for. Generate a polite message asking for clarification. Ask them:
- What specific topic or document are they looking for?
- Can they provide more details or keywords?
- What kind of information would be helpful?

IMPORTANT: Do NOT provide any answers from your own knowledge. Only ask for clarification to help with document search.{{languageInstruction}}"#;

/// Default system prompt for no-results responses
pub const DEFAULT_NO_RESULTS_SYSTEM_PROMPT: &str = r#"You are a helpful assistant for a document search system. The search for relevant documents returned no results matching the user's query. Generate a polite message informing the user that no documents matching their query were found. Suggest ways they could refine their search, such as:
- Using different keywords
- Being more specific or more general
- Checking for spelling errors
- Trying related terms

IMPORTANT: Do NOT provide any answers from your own knowledge. Only inform them about the search results and offer suggestions for refining their search.{{languageInstruction}}"#;

/// Default system prompt for document-not-found responses
pub const DEFAULT_DOCUMENT_NOT_FOUND_SYSTEM_PROMPT: &str = r#"You are a helpful assistant for a document search system. The user requested a summary of a document, but the specified URL was not found in the system. URL searched: {{documentUrl}}

Generate a polite message informing the user that:
- The specified document could not be found
- The URL might be incorrect or the document may not be indexed
- They can try searching with keywords instead

IMPORTANT: Do NOT provide any information from your own knowledge. Only inform them about the search result.{{languageInstruction}}"#;

/// Default system prompt for direct answers (no document search)
pub const DEFAULT_DIRECT_ANSWER_SYSTEM_PROMPT: &str = "{{systemPrompt}}{{languageInstruction}}";

// ============================================================================
// Locale
// ============================================================================

/// The caller's language preference, propagated into every generated prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLocale {
    /// ISO 639-1 language code ("en", "ja", ...)
    pub language: String,
    /// English display name of the language ("Japanese", ...)
    pub display_language: String,
}

impl UserLocale {
    pub fn new(language: impl Into<String>, display_language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            display_language: display_language.into(),
        }
    }

    pub fn english() -> Self {
        Self::new("en", "English")
    }

    /// The language instruction injected into prompts: empty for English,
    /// an explicit directive for everything else.
    pub fn language_instruction(&self) -> String {
        if self.language == "en" {
            String::new()
        } else {
            format!("IMPORTANT: You MUST respond in {}.", self.display_language)
        }
    }
}

impl Default for UserLocale {
    fn default() -> Self {
        Self::english()
    }
}

// ============================================================================
// Template set
// ============================================================================

/// Override-able prompt template set. `None` fields use the built-in
/// defaults above. Set once at startup, read-only afterward.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptTemplates {
    pub intent_detection: Option<String>,
    pub evaluation: Option<String>,
    pub answer_system: Option<String>,
    pub faq_system: Option<String>,
    pub summary_system: Option<String>,
    pub unclear_intent_system: Option<String>,
    pub no_results_system: Option<String>,
    pub document_not_found_system: Option<String>,
    pub direct_answer_system: Option<String>,
}

impl PromptTemplates {
    pub fn intent_detection(&self) -> &str {
        self.intent_detection
            .as_deref()
            .unwrap_or(DEFAULT_INTENT_DETECTION_PROMPT)
    }

    pub fn evaluation(&self) -> &str {
        self.evaluation.as_deref().unwrap_or(DEFAULT_EVALUATION_PROMPT)
    }

    pub fn answer_system(&self) -> &str {
        self.answer_system
            .as_deref()
            .unwrap_or(DEFAULT_ANSWER_SYSTEM_PROMPT)
    }

    pub fn faq_system(&self) -> &str {
        self.faq_system.as_deref().unwrap_or(DEFAULT_FAQ_SYSTEM_PROMPT)
    }

    pub fn summary_system(&self) -> &str {
        self.summary_system
            .as_deref()
            .unwrap_or(DEFAULT_SUMMARY_SYSTEM_PROMPT)
    }

    pub fn unclear_intent_system(&self) -> &str {
        self.unclear_intent_system
            .as_deref()
            .unwrap_or(DEFAULT_UNCLEAR_INTENT_SYSTEM_PROMPT)
    }

    pub fn no_results_system(&self) -> &str {
        self.no_results_system
            .as_deref()
            .unwrap_or(DEFAULT_NO_RESULTS_SYSTEM_PROMPT)
    }

    pub fn document_not_found_system(&self) -> &str {
        self.document_not_found_system
            .as_deref()
            .unwrap_or(DEFAULT_DOCUMENT_NOT_FOUND_SYSTEM_PROMPT)
    }

    pub fn direct_answer_system(&self) -> &str {
        self.direct_answer_system
            .as_deref()
            .unwrap_or(DEFAULT_DIRECT_ANSWER_SYSTEM_PROMPT)
    }
}

/// Substitute `{{key}}` placeholders by plain text replacement.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{{{key}}}}}"), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_placeholders() {
        let out = render(
            "Q: {{userMessage}} ({{query}})",
            &[("userMessage", "hello"), ("query", "+hi")],
        );
        assert_eq!(out, "Q: hello (+hi)");
    }

    #[test]
    fn test_render_leaves_unknown_placeholders() {
        let out = render("{{known}} {{unknown}}", &[("known", "x")]);
        assert_eq!(out, "x {{unknown}}");
    }

    #[test]
    fn test_english_locale_has_no_instruction() {
        assert_eq!(UserLocale::english().language_instruction(), "");
    }

    #[test]
    fn test_non_english_locale_instruction() {
        let locale = UserLocale::new("ja", "Japanese");
        assert_eq!(
            locale.language_instruction(),
            "IMPORTANT: You MUST respond in Japanese."
        );
    }

    #[test]
    fn test_defaults_used_when_unset() {
        let templates = PromptTemplates::default();
        assert!(templates.intent_detection().contains("LUCENE QUERY GUIDELINES"));
        assert!(templates.evaluation().contains("{{maxRelevantDocs}}"));
        assert!(templates.summary_system().contains("{{documentContent}}"));
    }

    #[test]
    fn test_override_wins() {
        let templates = PromptTemplates {
            intent_detection: Some("custom {{userMessage}}".to_string()),
            ..Default::default()
        };
        assert_eq!(templates.intent_detection(), "custom {{userMessage}}");
    }

    #[test]
    fn test_default_templates_carry_language_placeholder() {
        for template in [
            DEFAULT_INTENT_DETECTION_PROMPT,
            DEFAULT_ANSWER_SYSTEM_PROMPT,
            DEFAULT_FAQ_SYSTEM_PROMPT,
            DEFAULT_SUMMARY_SYSTEM_PROMPT,
            DEFAULT_UNCLEAR_INTENT_SYSTEM_PROMPT,
            DEFAULT_NO_RESULTS_SYSTEM_PROMPT,
            DEFAULT_DOCUMENT_NOT_FOUND_SYSTEM_PROMPT,
            DEFAULT_DIRECT_ANSWER_SYSTEM_PROMPT,
        ] {
            assert!(template.contains("{{languageInstruction}}"));
        }
    }
}
