//! Audit trail for policy decisions

use super::ClassificationLevel;
use crate::router::Tier;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;

/// What triggered an audit record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventKind {
    /// The router's classification gate forced a local decision
    ClassificationGate,
    /// The enforcer refused a cloud tier
    Ac4Block,
}

impl AuditEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClassificationGate => "CLASSIFICATION_GATE",
            Self::Ac4Block => "AC4_BLOCK",
        }
    }
}

/// One audit record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: AuditEventKind,
    pub classification: ClassificationLevel,
    pub requested_tier: Option<Tier>,
    pub enforced_tier: Tier,
    pub detail: String,
}

impl AuditEvent {
    pub fn new(
        kind: AuditEventKind,
        classification: ClassificationLevel,
        requested_tier: Option<Tier>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            classification,
            requested_tier,
            enforced_tier: Tier::Local,
            detail: detail.into(),
        }
    }
}

/// Destination for audit records
///
/// Recording must not fail the routing decision, so implementations swallow
/// their own errors.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Emits audit records as structured `tracing` events on the `rigchat::audit` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::warn!(
            target: "rigchat::audit",
            event = event.kind.as_str(),
            classification = %event.classification,
            requested_tier = ?event.requested_tier,
            enforced_tier = %event.enforced_tier,
            timestamp = %event.timestamp.to_rfc3339(),
            "{}",
            event.detail
        );
    }
}

/// Keeps audit records in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}
