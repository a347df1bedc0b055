//! Ollama client (`POST /api/chat`, newline-delimited JSON stream)

use super::{
    BackendKind, ChatMessage, ModelBackend, StreamChunk, map_request_error, read_error_body,
};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const BACKEND_NAME: &str = "ollama";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatLine {
    #[serde(default)]
    message: Option<LineMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LineMessage {
    #[serde(default)]
    content: String,
}

/// Local model server
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    idle_timeout: Duration,
}

impl OllamaBackend {
    /// `idle_timeout` bounds connection setup and every gap between chunks
    pub fn new(base_url: impl Into<String>, idle_timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(idle_timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            idle_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    fn timeout_error(&self) -> AppError {
        AppError::Timeout {
            backend: BACKEND_NAME.to_string(),
            timeout_seconds: self.idle_timeout.as_secs(),
        }
    }
}

/// Split complete lines off the front of `pending`
fn drain_lines(pending: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
        let line: Vec<u8> = pending.drain(..=pos).collect();
        let text = String::from_utf8_lossy(&line).trim().to_string();
        if !text.is_empty() {
            lines.push(text);
        }
    }
    lines
}

/// Convert one NDJSON line into a chunk
fn parse_line(line: &str) -> StreamChunk {
    match serde_json::from_str::<ChatLine>(line) {
        Ok(parsed) => {
            if let Some(error) = parsed.error {
                return StreamChunk::failed(error);
            }
            StreamChunk {
                content: parsed.message.map(|m| m.content).unwrap_or_default(),
                done: parsed.done,
                completion_tokens: parsed.eval_count,
                prompt_tokens: parsed.prompt_eval_count,
                error: None,
            }
        }
        Err(e) => StreamChunk::failed(format!("malformed stream line: {}", e)),
    }
}

#[async_trait]
impl ModelBackend for OllamaBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn chat_stream(
        &self,
        cancel: CancellationToken,
        model: &str,
        messages: &[ChatMessage],
        on_chunk: &mut (dyn FnMut(StreamChunk) + Send),
    ) -> AppResult<()> {
        let url = self.chat_url();
        let request = self.client.post(&url).json(&ChatRequest {
            model,
            messages,
            stream: true,
        });

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            sent = tokio::time::timeout(self.idle_timeout, request.send()) => match sent {
                Err(_) => return Err(self.timeout_error()),
                Ok(result) => result
                    .map_err(|e| map_request_error(BACKEND_NAME, &url, self.idle_timeout, e))?,
            },
        };

        let status = response.status();
        if !status.is_success() {
            let body = read_error_body(response, &cancel, self.idle_timeout).await?;
            if status == reqwest::StatusCode::NOT_FOUND || body.contains("not found") {
                return Err(AppError::ModelNotFound {
                    backend: BACKEND_NAME.to_string(),
                    model: model.to_string(),
                });
            }
            return Err(AppError::BackendUnavailable {
                backend: BACKEND_NAME.to_string(),
                url,
                reason: format!("HTTP {}: {}", status, body.trim()),
            });
        }

        let mut body = response.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();
        let mut chunks_received = 0usize;

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
                next = tokio::time::timeout(self.idle_timeout, body.next()) => next,
            };

            match next {
                Err(_) => return Err(self.timeout_error()),
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    return Err(AppError::StreamInterrupted {
                        backend: BACKEND_NAME.to_string(),
                        chunks_received,
                        reason: e.to_string(),
                    });
                }
                Ok(Some(Ok(bytes))) => {
                    pending.extend_from_slice(&bytes);
                    for line in drain_lines(&mut pending) {
                        let chunk = parse_line(&line);
                        let finished = chunk.done || chunk.error.is_some();
                        chunks_received += 1;
                        on_chunk(chunk);
                        if finished {
                            return Ok(());
                        }
                    }
                }
            }
        }

        // Trailing line without a newline
        let rest = String::from_utf8_lossy(&pending).trim().to_string();
        if !rest.is_empty() {
            on_chunk(parse_line(&rest));
        }

        tracing::debug!(
            backend = BACKEND_NAME,
            model = %model,
            chunks = chunks_received,
            "Stream ended without done marker"
        );
        Ok(())
    }
}
