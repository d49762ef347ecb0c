//! Markdown Rendering
//!
//! Assistant answers are model-emitted Markdown; callers get sanitized
//! HTML alongside. Rendering is a collaborator behind a trait; the
//! built-in implementation renders CommonMark and neutralizes raw HTML by
//! escaping it. When rendering fails, the orchestrator falls back to
//! HTML-escaping the raw Markdown.

use pulldown_cmark::{html, Event, Options, Parser};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Markdown rendering failed: {0}")]
    Render(String),
}

/// Markdown-to-safe-HTML collaborator.
pub trait MarkdownRenderer: Send + Sync {
    fn render(&self, markdown: &str) -> Result<String, RenderError>;
}

/// Built-in CommonMark renderer.
///
/// Raw HTML blocks and inline HTML in the source are re-emitted as escaped
/// text, so model output cannot inject markup into the rendered answer.
pub struct CommonMarkRenderer {
    options: Options,
}

impl CommonMarkRenderer {
    pub fn new() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        Self { options }
    }
}

impl Default for CommonMarkRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer for CommonMarkRenderer {
    fn render(&self, markdown: &str) -> Result<String, RenderError> {
        let parser = Parser::new_ext(markdown, self.options).map(|event| match event {
            Event::Html(raw) => Event::Text(raw),
            Event::InlineHtml(raw) => Event::Text(raw),
            other => other,
        });
        let mut output = String::with_capacity(markdown.len() * 2);
        html::push_html(&mut output, parser);
        Ok(output)
    }
}

/// Escape HTML special characters.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
