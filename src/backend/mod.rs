//! Model backends
//!
//! The session only sees [`ModelBackend`]. Two HTTP implementations ship with
//! the crate: [`OllamaBackend`] for the local tier and [`OpenRouterBackend`]
//! for every cloud tier.

pub mod ollama;
pub mod openrouter;

pub use ollama::OllamaBackend;
pub use openrouter::OpenRouterBackend;

use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message sent to a backend
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One increment of a streamed response
///
/// A chunk-level failure is reported through `error`; the call itself still
/// returns `Ok`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamChunk {
    pub content: String,
    pub done: bool,
    pub completion_tokens: Option<u32>,
    pub prompt_tokens: Option<u32>,
    pub error: Option<String>,
}

impl StreamChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn done(prompt_tokens: Option<u32>, completion_tokens: Option<u32>) -> Self {
        Self {
            done: true,
            prompt_tokens,
            completion_tokens,
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Where a backend runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Cloud,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Cloud => "cloud",
        }
    }
}

/// Chat completion backend with streaming output
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Short name for logs and error messages
    fn name(&self) -> &str;

    fn kind(&self) -> BackendKind;

    /// Stream a chat completion, calling `on_chunk` for every increment
    ///
    /// Returns `Err` only for call-level failures (unreachable service, unknown
    /// model, timeout, cancellation).
    async fn chat_stream(
        &self,
        cancel: CancellationToken,
        model: &str,
        messages: &[ChatMessage],
        on_chunk: &mut (dyn FnMut(StreamChunk) + Send),
    ) -> AppResult<()>;
}

/// Map a transport error from reqwest to the session's error taxonomy
pub(crate) fn map_request_error(
    backend: &str,
    url: &str,
    timeout: Duration,
    err: reqwest::Error,
) -> AppError {
    if err.is_timeout() {
        AppError::Timeout {
            backend: backend.to_string(),
            timeout_seconds: timeout.as_secs(),
        }
    } else {
        AppError::BackendUnavailable {
            backend: backend.to_string(),
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Read the body of a non-2xx response for the error message
///
/// Bounded by `idle_timeout` and `cancel`. A body that stalls yields an empty
/// string so the caller can still classify the failure by status.
pub(crate) async fn read_error_body(
    response: reqwest::Response,
    cancel: &CancellationToken,
    idle_timeout: Duration,
) -> AppResult<String> {
    tokio::select! {
        _ = cancel.cancelled() => Err(AppError::Cancelled),
        body = tokio::time::timeout(idle_timeout, response.text()) => match body {
            Ok(text) => Ok(text.unwrap_or_default()),
            Err(_) => {
                tracing::debug!("Error response body stalled, classifying by status only");
                Ok(String::new())
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_serializes_lowercase_role() {
        let json = serde_json::to_value(ChatMessage::user("hi")).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "hi");
    }

    #[test]
    fn test_chunk_constructors() {
        assert_eq!(StreamChunk::text("a").content, "a");
        assert!(StreamChunk::done(Some(1), Some(2)).done);
        assert_eq!(
            StreamChunk::failed("boom").error.as_deref(),
            Some("boom")
        );
    }
}
