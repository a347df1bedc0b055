//! Background stream worker and its event protocol
//!
//! Every stream posts `Start`, zero or more `Token`s, then exactly one
//! terminal event (`Complete`, `Error` or `Cancelled`). Events carry the
//! message id so the session can drop anything from a superseded stream.

use super::CancelHandle;
use crate::backend::{ChatMessage, ModelBackend, StreamChunk};
use crate::error::AppError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Timing and token counts for a finished stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamStats {
    pub duration: Duration,
    pub time_to_first_token: Option<Duration>,
    pub chunks: usize,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

impl StreamStats {
    /// Output tokens per second, if the backend reported a count
    pub fn tokens_per_second(&self) -> Option<f64> {
        let tokens = self.completion_tokens?;
        let secs = self.duration.as_secs_f64();
        (secs > 0.0).then(|| f64::from(tokens) / secs)
    }
}

/// Messages posted from the worker to the event loop
#[derive(Debug)]
pub enum StreamEvent {
    Start {
        message_id: String,
    },
    Token {
        message_id: String,
        content: String,
    },
    Complete {
        message_id: String,
        stats: StreamStats,
    },
    Error {
        message_id: String,
        error: AppError,
    },
    Cancelled {
        message_id: String,
    },
}

impl StreamEvent {
    pub fn message_id(&self) -> &str {
        match self {
            Self::Start { message_id }
            | Self::Token { message_id, .. }
            | Self::Complete { message_id, .. }
            | Self::Error { message_id, .. }
            | Self::Cancelled { message_id } => message_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Complete { .. } | Self::Error { .. } | Self::Cancelled { .. }
        )
    }
}

/// Event-loop view of the stream in flight
#[derive(Debug, Clone)]
pub struct StreamingState {
    pub message_id: String,
    pub started_at: Instant,
    pub first_token_at: Option<Instant>,
    pub token_count: usize,
    pub content: String,
    pub is_complete: bool,
    pub error: Option<String>,
}

impl StreamingState {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            started_at: Instant::now(),
            first_token_at: None,
            token_count: 0,
            content: String::new(),
            is_complete: false,
            error: None,
        }
    }

    /// Record a token delivered to the transcript
    pub fn push(&mut self, content: &str) {
        self.first_token_at.get_or_insert_with(Instant::now);
        self.token_count += 1;
        self.content.push_str(content);
    }

    pub fn time_to_first_token(&self) -> Option<Duration> {
        self.first_token_at.map(|t| t.duration_since(self.started_at))
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Runs at most one backend stream at a time
#[derive(Debug, Clone)]
pub struct StreamOrchestrator {
    cancel: Arc<CancelHandle>,
}

impl StreamOrchestrator {
    pub fn new(cancel: Arc<CancelHandle>) -> Self {
        Self { cancel }
    }

    /// Start streaming a completion, cancelling whatever was running before
    pub fn start_stream(
        &self,
        backend: Arc<dyn ModelBackend>,
        model: String,
        messages: Vec<ChatMessage>,
        message_id: String,
        events: UnboundedSender<StreamEvent>,
    ) -> JoinHandle<()> {
        let token = CancellationToken::new();
        self.cancel.install_token(token.clone());

        tracing::debug!(
            backend = backend.name(),
            model = %model,
            message_id = %message_id,
            messages = messages.len(),
            "Starting stream"
        );

        tokio::spawn(run_stream(
            backend, model, messages, message_id, events, token,
        ))
    }

    /// Cancel the active stream; no-op when nothing is running
    pub fn cancel(&self) -> bool {
        self.cancel.cancel()
    }

    /// Release the handle after the current stream finished
    pub fn clear(&self) {
        self.cancel.clear();
    }

    pub fn is_active(&self) -> bool {
        self.cancel.is_active()
    }
}

async fn run_stream(
    backend: Arc<dyn ModelBackend>,
    model: String,
    messages: Vec<ChatMessage>,
    message_id: String,
    events: UnboundedSender<StreamEvent>,
    token: CancellationToken,
) {
    // A closed channel means the session is gone; nothing left to report to
    let _ = events.send(StreamEvent::Start {
        message_id: message_id.clone(),
    });

    let started = Instant::now();
    let mut first_token: Option<Instant> = None;
    let mut chunks = 0usize;
    let mut prompt_tokens = None;
    let mut completion_tokens = None;
    let mut chunk_error: Option<String> = None;

    let result = {
        let mut on_chunk = |chunk: StreamChunk| {
            if chunk_error.is_some() || token.is_cancelled() {
                return;
            }
            if let Some(err) = chunk.error {
                chunk_error = Some(err);
                return;
            }
            if !chunk.content.is_empty() {
                first_token.get_or_insert_with(Instant::now);
                chunks += 1;
                let _ = events.send(StreamEvent::Token {
                    message_id: message_id.clone(),
                    content: chunk.content,
                });
            }
            if chunk.prompt_tokens.is_some() {
                prompt_tokens = chunk.prompt_tokens;
            }
            if chunk.completion_tokens.is_some() {
                completion_tokens = chunk.completion_tokens;
            }
        };

        tokio::select! {
            _ = token.cancelled() => Err(AppError::Cancelled),
            result = backend.chat_stream(token.clone(), &model, &messages, &mut on_chunk) => result,
        }
    };

    let terminal = match result {
        _ if token.is_cancelled() => StreamEvent::Cancelled {
            message_id: message_id.clone(),
        },
        Err(AppError::Cancelled) => StreamEvent::Cancelled {
            message_id: message_id.clone(),
        },
        Err(error) => StreamEvent::Error {
            message_id: message_id.clone(),
            error,
        },
        Ok(()) => match chunk_error {
            Some(reason) => StreamEvent::Error {
                message_id: message_id.clone(),
                error: AppError::StreamInterrupted {
                    backend: backend.name().to_string(),
                    chunks_received: chunks,
                    reason,
                },
            },
            None => StreamEvent::Complete {
                message_id: message_id.clone(),
                stats: StreamStats {
                    duration: started.elapsed(),
                    time_to_first_token: first_token.map(|t| t.duration_since(started)),
                    chunks,
                    prompt_tokens,
                    completion_tokens,
                },
            },
        },
    };

    match &terminal {
        StreamEvent::Complete { stats, .. } => tracing::info!(
            backend = backend.name(),
            model = %model,
            message_id = %message_id,
            chunks = stats.chunks,
            duration_ms = stats.duration.as_millis() as u64,
            "Stream complete"
        ),
        StreamEvent::Error { error, .. } => tracing::warn!(
            backend = backend.name(),
            model = %model,
            message_id = %message_id,
            error = %error,
            "Stream failed"
        ),
        _ => tracing::debug!(message_id = %message_id, "Stream cancelled"),
    }

    let _ = events.send(terminal);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streaming_state_tracks_first_token() {
        let mut state = StreamingState::new("m1");
        assert!(state.time_to_first_token().is_none());
        state.push("Hel");
        state.push("lo");
        assert_eq!(state.content, "Hello");
        assert_eq!(state.token_count, 2);
        assert!(state.time_to_first_token().is_some());
    }

    #[test]
    fn test_tokens_per_second() {
        let stats = StreamStats {
            duration: Duration::from_secs(2),
            time_to_first_token: None,
            chunks: 10,
            prompt_tokens: None,
            completion_tokens: Some(100),
        };
        assert_eq!(stats.tokens_per_second(), Some(50.0));

        let no_count = StreamStats {
            completion_tokens: None,
            ..stats
        };
        assert_eq!(no_count.tokens_per_second(), None);
    }

    #[test]
    fn test_event_message_id_and_terminality() {
        let event = StreamEvent::Token {
            message_id: "abc".to_string(),
            content: "x".to_string(),
        };
        assert_eq!(event.message_id(), "abc");
        assert!(!event.is_terminal());
        assert!(
            StreamEvent::Cancelled {
                message_id: "abc".to_string()
            }
            .is_terminal()
        );
    }
}
