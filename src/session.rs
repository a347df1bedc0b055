//! Chat session state machine
//!
//! The session runs on one event loop and is the only place that touches the
//! transcript. Three kinds of input drive it:
//!
//! - [`ChatSession::submit`] when the user sends a message
//! - [`ChatSession::handle_event`] for every [`StreamEvent`] posted by a worker
//! - [`ChatSession::tick`] on the render timer ([`crate::stream::STREAM_TICK`])
//!
//! Only the [`StreamingBuffer`] and the [`CancelHandle`] are shared with the
//! worker task. Events from a superseded stream are recognised by message id
//! and dropped.

use crate::backend::{BackendKind, ChatMessage, ModelBackend};
use crate::cache::{CacheHitType, CacheManager};
use crate::config::Config;
use crate::conversation::{Conversation, MessageStatus, RoutingInfo};
use crate::error::{AppError, ErrorKind};
use crate::metrics::{LatencyPhase, Metrics, StreamOutcome};
use crate::router::{RouterOptions, RoutingDecision, RoutingDecisionEngine, Tier, estimate_tokens};
use crate::security::ClassificationLevel;
use crate::stats::{QueryResult, SessionStats};
use crate::stream::{
    CancelHandle, StreamEvent, StreamOrchestrator, StreamStats, StreamingBuffer, StreamingState,
    ViewportOptimizer, ViewportStats,
};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// Whether a stream is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Ready,
    Streaming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Dismissible message shown above the input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub id: u64,
    pub level: NoticeLevel,
    pub message: String,
}

/// What `submit` did with a query
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Answered from the cache; no backend was called
    Cached {
        message_id: String,
        hit_type: CacheHitType,
    },
    /// A stream was started for the assistant message
    Streaming {
        message_id: String,
        decision: RoutingDecision,
    },
    /// Blank input
    Ignored,
}

/// Per-session knobs that can change while the session runs
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub classification: ClassificationLevel,
    /// Raw mode selection as typed by the user
    pub mode: String,
    pub router_options: RouterOptions,
    pub local_model: String,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            classification: config.security.classification,
            mode: config.routing.mode.as_str().to_string(),
            router_options: config.router_options(),
            local_model: config.local.model.clone(),
        }
    }
}

/// Bookkeeping for the query whose stream is in flight
#[derive(Debug)]
struct PendingQuery {
    message_id: String,
    display_query: String,
    prompt: String,
    tier: Tier,
    label: String,
    backend_kind: BackendKind,
}

pub struct ChatSession {
    engine: RoutingDecisionEngine,
    local: Arc<dyn ModelBackend>,
    cloud: Option<Arc<dyn ModelBackend>>,
    cache: Option<Arc<dyn CacheManager>>,
    metrics: Option<Arc<Metrics>>,
    stats: Arc<SessionStats>,
    buffer: Arc<StreamingBuffer>,
    viewport: ViewportOptimizer,
    orchestrator: StreamOrchestrator,
    events: UnboundedSender<StreamEvent>,
    settings: SessionSettings,
    conversation: Conversation,
    state: SessionState,
    pending: Option<PendingQuery>,
    streaming: Option<StreamingState>,
    notices: Vec<Notice>,
    next_notice_id: u64,
    route_next_to_cloud: bool,
}

impl ChatSession {
    pub fn new(
        engine: RoutingDecisionEngine,
        local: Arc<dyn ModelBackend>,
        settings: SessionSettings,
        events: UnboundedSender<StreamEvent>,
    ) -> Self {
        let cancel = Arc::new(CancelHandle::new());
        Self {
            engine,
            local,
            cloud: None,
            cache: None,
            metrics: None,
            stats: Arc::new(SessionStats::new()),
            buffer: Arc::new(StreamingBuffer::new()),
            viewport: ViewportOptimizer::new(),
            orchestrator: StreamOrchestrator::new(cancel),
            events,
            settings,
            conversation: Conversation::new(),
            state: SessionState::Ready,
            pending: None,
            streaming: None,
            notices: Vec::new(),
            next_notice_id: 1,
            route_next_to_cloud: false,
        }
    }

    pub fn with_cloud(mut self, cloud: Arc<dyn ModelBackend>) -> Self {
        self.cloud = Some(cloud);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheManager>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_buffer(mut self, buffer: Arc<StreamingBuffer>) -> Self {
        self.buffer = buffer;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn set_mode(&mut self, mode: impl Into<String>) {
        self.settings.mode = mode.into();
    }

    pub fn set_classification(&mut self, level: ClassificationLevel) {
        self.settings.classification = level;
    }

    pub fn stats(&self) -> &Arc<SessionStats> {
        &self.stats
    }

    pub fn viewport_stats(&self) -> ViewportStats {
        self.viewport.stats()
    }

    pub fn streaming_state(&self) -> Option<&StreamingState> {
        self.streaming.as_ref()
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    /// True after a model-not-found error while a cloud backend is available
    pub fn routes_next_to_cloud(&self) -> bool {
        self.route_next_to_cloud
    }

    /// Send a user message
    ///
    /// `query` is what the model receives; `display_text` is what the user
    /// typed and what the cache is keyed by. Starting a query while another
    /// is streaming cancels the earlier one.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&mut self, query: &str, display_text: &str) -> SubmitOutcome {
        if query.trim().is_empty() {
            return SubmitOutcome::Ignored;
        }
        if self.state == SessionState::Streaming {
            self.cancel();
        }

        if let Some(outcome) = self.answer_from_cache(display_text) {
            return outcome;
        }

        let decision = self.route(query);
        if let Some(notice) = decision.notice() {
            self.push_notice(NoticeLevel::Warning, notice.to_string());
        }
        if decision.is_enforced() {
            let level = self.settings.classification;
            self.record_metric("record_policy_downgrade", |m| {
                m.record_policy_downgrade(level)
            });
        }

        let (backend, model, label) = self.select_backend(&decision);
        tracing::debug!(
            tier = %decision.tier(),
            backend = backend.name(),
            model = %model,
            label = %label,
            "Dispatching query"
        );

        // A cloud tier served by the local backend is billed as local
        let (tier, cost_cents) = match backend.kind() {
            BackendKind::Local => (Tier::Local, 0.0),
            BackendKind::Cloud => (decision.tier(), decision.estimated_cost_cents()),
        };

        // History is captured before the new turn so the model sees the full
        // prompt while the transcript shows the display text.
        let mut messages = self.conversation.to_chat_messages();
        messages.push(ChatMessage::user(query));

        self.conversation.add_user(display_text);
        let message_id = self.conversation.add_assistant().id.clone();
        if let Some(message) = self.conversation.get_mut(&message_id) {
            message.routing = Some(RoutingInfo {
                tier,
                label: label.clone(),
                cost_cents,
                reason: decision.reason().to_string(),
            });
        }

        self.pending = Some(PendingQuery {
            message_id: message_id.clone(),
            display_query: display_text.to_string(),
            prompt: query.to_string(),
            tier,
            label,
            backend_kind: backend.kind(),
        });
        self.streaming = Some(StreamingState::new(message_id.clone()));
        self.state = SessionState::Streaming;
        self.buffer.reset();
        self.viewport.force_update();

        self.orchestrator.start_stream(
            backend,
            model,
            messages,
            message_id.clone(),
            self.events.clone(),
        );

        SubmitOutcome::Streaming {
            message_id,
            decision,
        }
    }

    fn answer_from_cache(&mut self, display_text: &str) -> Option<SubmitOutcome> {
        let hit = self.cache.as_ref()?.lookup(display_text)?;
        if hit.hit_type == CacheHitType::None {
            return None;
        }

        tracing::info!(
            hit_type = %hit.hit_type,
            source_tier = %hit.tier_label,
            "Answered from cache"
        );

        let input_tokens = estimate_tokens(display_text) as u32;
        let output_tokens = estimate_tokens(&hit.response) as u32;

        self.conversation.add_user(display_text);
        let message_id = self
            .conversation
            .add_assistant_complete(hit.response)
            .id
            .clone();
        if let Some(message) = self.conversation.get_mut(&message_id) {
            message.routing = Some(RoutingInfo {
                tier: Tier::Cache,
                label: hit.hit_type.tier_label().to_string(),
                cost_cents: 0.0,
                reason: format!("Cached response originally from {}", hit.tier_label),
            });
        }

        self.stats
            .record(&QueryResult::cache_hit(input_tokens, output_tokens));
        let hit_type = hit.hit_type;
        self.record_metric("record_cache_hit", |m| m.record_cache_hit(hit_type));
        self.record_metric("record_query", |m| {
            m.record_query(Tier::Cache, StreamOutcome::Complete)
        });
        self.viewport.force_update();

        Some(SubmitOutcome::Cached {
            message_id,
            hit_type,
        })
    }

    fn route(&mut self, query: &str) -> RoutingDecision {
        let mode = if std::mem::take(&mut self.route_next_to_cloud) {
            tracing::info!("Routing to cloud after local model was not found");
            "cloud"
        } else {
            self.settings.mode.as_str()
        };
        self.engine.decide(
            query,
            self.settings.classification,
            mode,
            Some(&self.settings.router_options),
        )
    }

    fn select_backend(
        &self,
        decision: &RoutingDecision,
    ) -> (Arc<dyn ModelBackend>, String, String) {
        let tier = decision.tier();
        if tier.is_cloud() {
            match (&self.cloud, tier.openrouter_model()) {
                (Some(cloud), Some(model)) => {
                    let label = if decision.is_auto_routed() {
                        "Auto (OpenRouter)".to_string()
                    } else {
                        tier.display_name().to_string()
                    };
                    return (Arc::clone(cloud), model.to_string(), label);
                }
                _ => {
                    tracing::warn!(
                        tier = %tier,
                        "Cloud tier selected but no cloud backend is configured, using local"
                    );
                    return (
                        Arc::clone(&self.local),
                        self.settings.local_model.clone(),
                        "Local (cloud unavailable)".to_string(),
                    );
                }
            }
        }

        let label = if decision.is_enforced() {
            "Local (enforced)"
        } else {
            "Local"
        };
        (
            Arc::clone(&self.local),
            self.settings.local_model.clone(),
            label.to_string(),
        )
    }

    /// Apply one worker event; returns false for stale events
    pub fn handle_event(&mut self, event: StreamEvent) -> bool {
        let current = self
            .pending
            .as_ref()
            .is_some_and(|p| p.message_id == event.message_id());
        if !current {
            tracing::debug!(
                message_id = %event.message_id(),
                terminal = event.is_terminal(),
                "Dropping stale stream event"
            );
            if let Some(metrics) = &self.metrics {
                metrics.stale_event();
            }
            return false;
        }

        match event {
            StreamEvent::Start { .. } => {
                self.buffer.reset();
            }
            StreamEvent::Token { content, .. } => {
                if let Some(state) = self.streaming.as_mut() {
                    state.push(&content);
                }
                self.buffer.write(&content);
            }
            StreamEvent::Complete { stats, .. } => self.finish_complete(stats),
            StreamEvent::Error { error, .. } => self.finish_error(error),
            StreamEvent::Cancelled { .. } => self.finish_cancelled(),
        }
        true
    }

    /// Move buffered text into the pending assistant message
    fn drain_buffer(&mut self, text: Option<String>) {
        let (Some(text), Some(pending)) = (text, self.pending.as_ref()) else {
            return;
        };
        if let Some(message) = self.conversation.get_mut(&pending.message_id) {
            message.append(&text);
        }
    }

    fn end_stream(&mut self) -> Option<PendingQuery> {
        let flushed = self.buffer.force_flush();
        self.drain_buffer(flushed);
        self.orchestrator.clear();
        self.state = SessionState::Ready;
        self.viewport.force_update();
        self.pending.take()
    }

    fn finish_complete(&mut self, stream_stats: StreamStats) {
        let Some(pending) = self.end_stream() else {
            return;
        };
        if let Some(state) = self.streaming.as_mut() {
            state.is_complete = true;
        }

        let content = match self.conversation.get_mut(&pending.message_id) {
            Some(message) => {
                message.status = MessageStatus::Complete;
                message.time_to_first_token = stream_stats.time_to_first_token;
                message.total_duration = Some(stream_stats.duration);
                message.content.clone()
            }
            None => String::new(),
        };

        if !content.is_empty() {
            if let Some(cache) = &self.cache {
                cache.store(&pending.display_query, &content, &pending.label);
            }
        }

        let input_tokens = stream_stats
            .prompt_tokens
            .unwrap_or_else(|| estimate_tokens(&pending.prompt) as u32);
        let output_tokens = stream_stats
            .completion_tokens
            .unwrap_or_else(|| estimate_tokens(&content) as u32);
        let latency_ms = stream_stats.duration.as_millis() as u64;
        self.stats.record(&QueryResult::new(
            pending.tier,
            input_tokens,
            output_tokens,
            latency_ms,
        ));

        let tier = pending.tier;
        let kind = pending.backend_kind;
        self.record_metric("record_query", |m| {
            m.record_query(tier, StreamOutcome::Complete)
        });
        self.record_metric("record_stream_latency", |m| {
            m.record_stream_latency(kind, LatencyPhase::Total, stream_stats.duration)
        });
        if let Some(ttft) = stream_stats.time_to_first_token {
            self.record_metric("record_stream_latency", |m| {
                m.record_stream_latency(kind, LatencyPhase::FirstToken, ttft)
            });
        }
    }

    fn finish_error(&mut self, error: AppError) {
        let Some(pending) = self.end_stream() else {
            return;
        };

        if let Some(state) = self.streaming.as_mut() {
            state.error = Some(error.to_string());
        }
        if let Some(message) = self.conversation.get_mut(&pending.message_id) {
            message.status = MessageStatus::Error;
            message.error = Some(error.to_string());
        }

        let local_failed = pending.backend_kind == BackendKind::Local;
        let notice = match error.kind() {
            ErrorKind::ModelNotFound if local_failed && self.cloud.is_some() => {
                self.route_next_to_cloud = true;
                format!("{}. Your next message will be routed to cloud.", error)
            }
            ErrorKind::ModelNotFound if local_failed => format!(
                "{}. Pull it with `ollama pull {}` or change local.model.",
                error, self.settings.local_model
            ),
            ErrorKind::BackendUnavailable if local_failed && self.cloud.is_some() => {
                format!("{}. Start Ollama or switch to cloud mode.", error)
            }
            _ => error.to_string(),
        };
        tracing::warn!(
            tier = %pending.tier,
            error = %error,
            recoverable = error.is_recoverable(),
            "Stream ended with error"
        );
        self.push_notice(NoticeLevel::Error, notice);

        let tier = pending.tier;
        self.record_metric("record_query", |m| {
            m.record_query(tier, StreamOutcome::Error)
        });
    }

    fn finish_cancelled(&mut self) {
        let Some(pending) = self.end_stream() else {
            return;
        };
        if let Some(message) = self.conversation.get_mut(&pending.message_id) {
            message.status = MessageStatus::Cancelled;
        }
        tracing::info!(message_id = %pending.message_id, "Stream cancelled");

        let tier = pending.tier;
        self.record_metric("record_query", |m| {
            m.record_query(tier, StreamOutcome::Cancelled)
        });
    }

    /// Stop the active stream, keeping whatever text already arrived
    ///
    /// Returns false when nothing was streaming. Events the worker still
    /// posts for the cancelled message are dropped as stale.
    pub fn cancel(&mut self) -> bool {
        if self.state != SessionState::Streaming {
            return false;
        }
        self.orchestrator.cancel();
        self.finish_cancelled();
        true
    }

    /// Render timer: flush due tokens and report whether a redraw is needed
    pub fn tick(&mut self) -> bool {
        if self.state == SessionState::Streaming {
            let flushed = self.buffer.flush();
            self.drain_buffer(flushed);
        }

        let content = self
            .conversation
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let redraw = self.viewport.should_update(content);
        if redraw {
            self.viewport.mark_clean();
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_redraw(redraw);
        }
        redraw
    }

    /// Layout changed (e.g. terminal resize): redraw on the next tick
    pub fn on_resize(&mut self) {
        self.viewport.force_update();
    }

    pub fn push_notice(&mut self, level: NoticeLevel, message: String) -> u64 {
        let id = self.next_notice_id;
        self.next_notice_id += 1;
        self.notices.push(Notice { id, level, message });
        self.viewport.force_update();
        id
    }

    pub fn dismiss_notice(&mut self, id: u64) -> bool {
        let before = self.notices.len();
        self.notices.retain(|n| n.id != id);
        self.notices.len() != before
    }

    fn record_metric<F>(&self, operation: &str, record: F)
    where
        F: FnOnce(&Metrics) -> Result<(), prometheus::Error>,
    {
        if let Some(metrics) = &self.metrics {
            if let Err(e) = record(metrics) {
                tracing::warn!(operation, error = %e, "Metrics recording failed");
                metrics.metrics_recording_failure(operation);
            }
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.orchestrator.cancel();
    }
}
