//! Resilient JSON Extraction
//!
//! LLM classifier output is JSON in the best case, code-fenced JSON often,
//! and free text sometimes. Every extractor strips code fences, attempts a
//! structured parse, and falls back to a field-specific regex before giving
//! up with the field's zero value.

use once_cell::sync::Lazy;
use regex::Regex;

/// Strip Markdown code fence markers from a model response.
pub fn strip_code_fences(response: &str) -> &str {
    let mut stripped = response.trim();
    if let Some(rest) = stripped.strip_prefix("```json") {
        stripped = rest;
    } else if let Some(rest) = stripped.strip_prefix("```") {
        stripped = rest;
    }
    if let Some(rest) = stripped.strip_suffix("```") {
        stripped = rest;
    }
    stripped.trim()
}

/// Extract a string field, or empty string when absent.
pub fn extract_string(json: &str, key: &str) -> String {
    let clean = strip_code_fences(json);
    if let Ok(root) = serde_json::from_str::<serde_json::Value>(clean) {
        if let Some(value) = root.get(key).and_then(|v| v.as_str()) {
            return value.to_string();
        }
        return String::new();
    }
    extract_string_fallback(clean, key)
}

fn extract_string_fallback(json: &str, key: &str) -> String {
    let pattern = format!(
        "\"{}\"\\s*:\\s*\"((?:[^\"\\\\]|\\\\.)*)\"",
        regex::escape(key)
    );
    match Regex::new(&pattern) {
        Ok(re) => re
            .captures(json)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().replace("\\\"", "\"").replace("\\\\", "\\"))
            .unwrap_or_default(),
        Err(_) => String::new(),
    }
}

/// Extract a boolean field, distinguishing a present value from an
/// absent or unextractable one.
pub fn try_extract_bool(json: &str, key: &str) -> Option<bool> {
    let clean = strip_code_fences(json);
    if let Ok(root) = serde_json::from_str::<serde_json::Value>(clean) {
        return root.get(key).and_then(|v| v.as_bool());
    }
    let pattern = format!("\"{}\"\\s*:\\s*(true|false)", regex::escape(key));
    match Regex::new(&pattern) {
        Ok(re) => re
            .captures(clean)
            .map(|c| c[1].eq_ignore_ascii_case("true")),
        Err(_) => None,
    }
}

/// Extract a boolean field, or false when absent.
pub fn extract_bool(json: &str, key: &str) -> bool {
    try_extract_bool(json, key).unwrap_or(false)
}

static INT_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());

/// Extract an integer array field, or empty when absent.
pub fn extract_int_array(json: &str, key: &str) -> Vec<i64> {
    let clean = strip_code_fences(json);
    if let Ok(root) = serde_json::from_str::<serde_json::Value>(clean) {
        if let Some(items) = root.get(key).and_then(|v| v.as_array()) {
            return items.iter().filter_map(|v| v.as_i64()).collect();
        }
        return Vec::new();
    }
    let pattern = format!("\"{}\"\\s*:\\s*\\[([^\\]]*)\\]", regex::escape(key));
    match Regex::new(&pattern) {
        Ok(re) => re
            .captures(clean)
            .and_then(|c| c.get(1))
            .map(|m| {
                m.as_str()
                    .split(',')
                    .map(|s| s.trim())
                    .filter(|s| INT_ITEM.is_match(s))
                    .filter_map(|s| s.parse().ok())
                    .collect()
            })
            .unwrap_or_default(),
        Err(_) => Vec::new(),
    }
}
