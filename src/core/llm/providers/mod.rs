//! LLM Backend Drivers
//!
//! Concrete wire adapters for the supported providers. Each driver owns
//! request encoding, response decoding, the streaming frame parser
//! selection, and its availability probe; everything above the wire lives
//! in the facade.

mod gemini;
mod ollama;
mod openai;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

use futures_util::StreamExt;
use tokio::sync::mpsc;

use super::client::{StreamChunk, StreamReceiver};
use super::error::LlmError;
use super::streaming::{StreamFormat, StreamParser};

/// Read a streaming HTTP response body into a chunk channel.
///
/// Frames are decoded with the provider's [`StreamParser`]; the reader
/// stops after the terminal chunk and guarantees exactly one is delivered
/// on success. A transport failure mid-stream delivers one `Err` instead.
pub(crate) fn spawn_stream_reader(
    response: reqwest::Response,
    format: StreamFormat,
    provider: &'static str,
) -> StreamReceiver {
    let (tx, rx) = mpsc::channel(64);

    tokio::spawn(async move {
        let mut stream = response.bytes_stream();
        let mut parser = StreamParser::new(format);
        let mut chunk_count = 0usize;

        while let Some(item) = stream.next().await {
            match item {
                Ok(bytes) => {
                    for chunk in parser.parse(&String::from_utf8_lossy(&bytes)) {
                        let is_final = chunk.is_final;
                        chunk_count += 1;
                        if tx.send(Ok(chunk)).await.is_err() {
                            return;
                        }
                        if is_final {
                            tracing::debug!(
                                "[LLM:{}] Completed streaming chat. chunkCount={}",
                                provider,
                                chunk_count
                            );
                            return;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("[LLM:{}] Stream read failed. error={}", provider, e);
                    let _ = tx.send(Err(LlmError::Http(e))).await;
                    return;
                }
            }
        }

        // Body ended without an explicit terminal frame; flush any
        // buffered tail and synthesize the terminal chunk.
        for chunk in parser.finish() {
            let is_final = chunk.is_final;
            if tx.send(Ok(chunk)).await.is_err() {
                return;
            }
            if is_final {
                return;
            }
        }
        let _ = tx
            .send(Ok(StreamChunk::done("", Some("stop".to_string()))))
            .await;
    });

    rx
}
