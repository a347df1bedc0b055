//! OpenRouter client (OpenAI-compatible `/chat/completions` over SSE)

use super::{
    BackendKind, ChatMessage, ModelBackend, StreamChunk, map_request_error, read_error_body,
};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const BACKEND_NAME: &str = "openrouter";
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Delta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Cloud backend for every paid tier
#[derive(Clone)]
pub struct OpenRouterBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    idle_timeout: Duration,
}

impl std::fmt::Debug for OpenRouterBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterBackend")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl OpenRouterBackend {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        idle_timeout: Duration,
    ) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(idle_timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            idle_timeout,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn timeout_error(&self) -> AppError {
        AppError::Timeout {
            backend: BACKEND_NAME.to_string(),
            timeout_seconds: self.idle_timeout.as_secs(),
        }
    }
}

/// Convert one SSE `data:` payload into a chunk
fn parse_event(data: &str) -> StreamChunk {
    match serde_json::from_str::<CompletionChunk>(data) {
        Ok(parsed) => {
            if let Some(error) = parsed.error {
                return StreamChunk::failed(error.message);
            }
            let usage = parsed.usage;
            let (content, finished) = parsed
                .choices
                .into_iter()
                .next()
                .map(|choice| {
                    (
                        choice.delta.content.unwrap_or_default(),
                        choice.finish_reason.is_some(),
                    )
                })
                .unwrap_or_default();

            StreamChunk {
                content,
                done: finished,
                prompt_tokens: usage.as_ref().and_then(|u| u.prompt_tokens),
                completion_tokens: usage.as_ref().and_then(|u| u.completion_tokens),
                error: None,
            }
        }
        Err(e) => StreamChunk::failed(format!("malformed SSE payload: {}", e)),
    }
}

#[async_trait]
impl ModelBackend for OpenRouterBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Cloud
    }

    async fn chat_stream(
        &self,
        cancel: CancellationToken,
        model: &str,
        messages: &[ChatMessage],
        on_chunk: &mut (dyn FnMut(StreamChunk) + Send),
    ) -> AppResult<()> {
        let url = self.completions_url();
        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("X-Title", "rigchat")
            .json(&CompletionRequest {
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
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(AppError::ModelNotFound {
                    backend: BACKEND_NAME.to_string(),
                    model: model.to_string(),
                });
            }
            let reason = match status {
                reqwest::StatusCode::UNAUTHORIZED => "invalid API key".to_string(),
                reqwest::StatusCode::TOO_MANY_REQUESTS => "rate limited".to_string(),
                _ => format!("HTTP {}: {}", status, body.trim()),
            };
            return Err(AppError::BackendUnavailable {
                backend: BACKEND_NAME.to_string(),
                url,
                reason,
            });
        }

        let mut events = response.bytes_stream().eventsource();
        let mut chunks_received = 0usize;
        let mut finished = false;

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
                next = tokio::time::timeout(self.idle_timeout, events.next()) => next,
            };

            let event = match next {
                Err(_) => return Err(self.timeout_error()),
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    return Err(AppError::StreamInterrupted {
                        backend: BACKEND_NAME.to_string(),
                        chunks_received,
                        reason: e.to_string(),
                    });
                }
                Ok(Some(Ok(event))) => event,
            };

            let data = event.data.trim();
            if data.is_empty() {
                continue;
            }
            if data == DONE_SENTINEL {
                break;
            }

            let chunk = parse_event(data);
            chunks_received += 1;
            let failed = chunk.error.is_some();
            finished |= chunk.done;
            on_chunk(chunk);
            if failed {
                return Ok(());
            }
        }

        // Some providers end with [DONE] and never send a finish_reason
        if !finished {
            on_chunk(StreamChunk::done(None, None));
        }
        Ok(())
    }
}
