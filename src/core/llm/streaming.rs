//! Streaming Frame Parsers
//!
//! Decodes provider-specific streaming wire formats into [`StreamChunk`]s.
//! Each provider delivers tokens differently: OpenAI uses Server-Sent
//! Events, Gemini returns a JSON array spread across lines, and Ollama
//! emits newline-delimited JSON. The parser buffers raw bytes so TCP
//! fragmentation never splits a frame.

use super::client::StreamChunk;

/// Provider wire format selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    /// SSE lines: `data: {json}` terminated by `data: [DONE]`
    OpenAi,
    /// JSON array delivered line by line: `[`, `{...}`, `,{...}`, `]`
    Gemini,
    /// One JSON object per line with a boolean `done` field
    Ollama,
}

/// Incremental parser for provider streaming responses
pub struct StreamParser {
    format: StreamFormat,
    buffer: String,
}

impl StreamParser {
    pub fn new(format: StreamFormat) -> Self {
        Self {
            format,
            buffer: String::new(),
        }
    }

    /// Feed incoming data and extract any complete chunks.
    pub fn parse(&mut self, data: &str) -> Vec<StreamChunk> {
        self.buffer.push_str(data);

        let mut chunks = Vec::new();
        while let Some(line_end) = self.buffer.find('\n') {
            let line = self.buffer[..line_end].trim().to_string();
            self.buffer.drain(..=line_end);

            if line.is_empty() {
                continue;
            }

            match self.format {
                StreamFormat::OpenAi => Self::parse_openai_line(&line, &mut chunks),
                StreamFormat::Gemini => Self::parse_gemini_line(&line, &mut chunks),
                StreamFormat::Ollama => Self::parse_ollama_line(&line, &mut chunks),
            }
        }

        chunks
    }

    /// Flush a final unterminated line at end of stream.
    pub fn finish(&mut self) -> Vec<StreamChunk> {
        if self.buffer.trim().is_empty() {
            self.buffer.clear();
            return Vec::new();
        }
        let rest = std::mem::take(&mut self.buffer);
        self.parse(&format!("{rest}\n"))
    }

    fn parse_openai_line(line: &str, chunks: &mut Vec<StreamChunk>) {
        let Some(data) = line.strip_prefix("data: ") else {
            return;
        };
        let data = data.trim();

        if data == "[DONE]" {
            chunks.push(StreamChunk::done("", Some("stop".to_string())));
            return;
        }

        let Ok(json) = serde_json::from_str::<serde_json::Value>(data) else {
            tracing::warn!("Skipping malformed OpenAI stream line. line={}", line);
            return;
        };

        let Some(choice) = json["choices"].as_array().and_then(|a| a.first()) else {
            return;
        };

        let content = choice["delta"]["content"].as_str().unwrap_or("");
        let finish_reason = choice["finish_reason"]
            .as_str()
            .filter(|r| *r != "null")
            .map(|r| r.to_string());

        if finish_reason.is_some() {
            chunks.push(StreamChunk::done(content, finish_reason));
        } else if !content.is_empty() {
            chunks.push(StreamChunk::delta(content));
        }
    }

    fn parse_gemini_line(line: &str, chunks: &mut Vec<StreamChunk>) {
        // Array framing: skip the bracket/separator lines, strip a leading
        // comma from element lines.
        let mut element = line;
        if element == "[" || element == "]" || element == "," {
            return;
        }
        if let Some(stripped) = element.strip_prefix(',') {
            element = stripped.trim_start();
        }

        let Ok(json) = serde_json::from_str::<serde_json::Value>(element) else {
            tracing::warn!("Skipping malformed Gemini stream line. line={}", line);
            return;
        };

        let Some(candidate) = json["candidates"].as_array().and_then(|a| a.first()) else {
            return;
        };

        let content = candidate["content"]["parts"]
            .as_array()
            .and_then(|p| p.first())
            .and_then(|p| p["text"].as_str())
            .unwrap_or("");
        let finish_reason = candidate["finishReason"]
            .as_str()
            .filter(|r| *r != "null")
            .map(|r| r.to_string());

        if finish_reason.is_some() {
            chunks.push(StreamChunk::done(content, finish_reason));
        } else if !content.is_empty() {
            chunks.push(StreamChunk::delta(content));
        }
    }

    fn parse_ollama_line(line: &str, chunks: &mut Vec<StreamChunk>) {
        let Ok(json) = serde_json::from_str::<serde_json::Value>(line) else {
            tracing::warn!("Skipping malformed Ollama stream line. line={}", line);
            return;
        };

        let content = json["message"]["content"].as_str().unwrap_or("");
        let done = json["done"].as_bool().unwrap_or(false);

        if done {
            let finish_reason = json["done_reason"]
                .as_str()
                .map(|r| r.to_string())
                .or_else(|| Some("stop".to_string()));
            chunks.push(StreamChunk::done(content, finish_reason));
        } else if !content.is_empty() {
            chunks.push(StreamChunk::delta(content));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_sse_parsing() {
        let mut parser = StreamParser::new(StreamFormat::OpenAi);

        let data = "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"},\"finish_reason\":null}]}\n\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\" world\"},\"finish_reason\":null}]}\n\n\
                    data: [DONE]\n\n";

        let chunks = parser.parse(data);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].content, "Hello");
        assert!(!chunks[0].is_final);
        assert_eq!(chunks[1].content, " world");
        assert!(chunks[2].is_final);
    }

    #[test]
    fn test_openai_finish_reason_terminates() {
        let mut parser = StreamParser::new(StreamFormat::OpenAi);
        let chunks = parser
            .parse("data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n");
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_final);
        assert_eq!(chunks[0].finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_openai_split_across_reads() {
        let mut parser = StreamParser::new(StreamFormat::OpenAi);
        let first = parser.parse("data: {\"choices\":[{\"delta\":{\"co");
        assert!(first.is_empty());
        let second = parser.parse("ntent\":\"Hi\"},\"finish_reason\":null}]}\n");
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].content, "Hi");
    }

    #[test]
    fn test_openai_malformed_line_skipped() {
        let mut parser = StreamParser::new(StreamFormat::OpenAi);
        let chunks = parser.parse(
            "data: {not json}\ndata: {\"choices\":[{\"delta\":{\"content\":\"ok\"},\"finish_reason\":null}]}\n",
        );
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "ok");
    }

    #[test]
    fn test_gemini_array_lines() {
        let mut parser = StreamParser::new(StreamFormat::Gemini);

        let data = "[\n\
            {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hel\"}]}}]}\n\
            ,{\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"lo\"}]},\"finishReason\":\"STOP\"}]}\n\
            ]\n";

        let chunks = parser.parse(data);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "Hel");
        assert!(!chunks[0].is_final);
        assert_eq!(chunks[1].content, "lo");
        assert!(chunks[1].is_final);
        assert_eq!(chunks[1].finish_reason.as_deref(), Some("STOP"));
    }

    #[test]
    fn test_gemini_separator_only_lines() {
        let mut parser = StreamParser::new(StreamFormat::Gemini);
        assert!(parser.parse("[\n,\n]\n").is_empty());
    }

    #[test]
    fn test_ollama_ndjson() {
        let mut parser = StreamParser::new(StreamFormat::Ollama);

        let data = "{\"message\":{\"content\":\"Hi\"},\"done\":false}\n\
                    {\"message\":{\"content\":\"!\"},\"done\":false}\n\
                    {\"message\":{\"content\":\"\"},\"done\":true,\"done_reason\":\"stop\"}\n";

        let chunks = parser.parse(data);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].content, "Hi");
        assert!(chunks[2].is_final);
        assert_eq!(chunks[2].finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_ollama_done_without_reason_defaults_stop() {
        let mut parser = StreamParser::new(StreamFormat::Ollama);
        let chunks = parser.parse("{\"message\":{\"content\":\"x\"},\"done\":true}\n");
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_final);
        assert_eq!(chunks[0].finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut parser = StreamParser::new(StreamFormat::Ollama);
        assert!(parser
            .parse("{\"message\":{\"content\":\"tail\"},\"done\":false}")
            .is_empty());
        let chunks = parser.finish();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "tail");
    }
}
