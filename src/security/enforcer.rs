//! Classification enforcement oracle

use super::{AuditEvent, AuditEventKind, AuditSink, ClassificationLevel};
use crate::error::{AppError, AppResult};
use crate::router::Tier;
use std::sync::Arc;

/// Answers "may data at this level leave the machine"
///
/// The router treats the answer as authoritative: a `true` from
/// `requires_local_only` or an `Err` from `enforce_routing` always yields a
/// local decision.
pub trait ClassificationEnforcer: Send + Sync {
    /// Pure check, no side effects
    fn requires_local_only(&self, level: ClassificationLevel) -> bool;

    /// Validate a proposed tier; `Err` means the caller must downgrade
    fn enforce_routing(&self, level: ClassificationLevel, proposed: Tier) -> AppResult<Tier>;
}

/// Standard policy: only UNCLASSIFIED data may use cloud tiers
pub struct PolicyEnforcer {
    audit: Arc<dyn AuditSink>,
}

impl PolicyEnforcer {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self { audit }
    }
}

impl ClassificationEnforcer for PolicyEnforcer {
    fn requires_local_only(&self, level: ClassificationLevel) -> bool {
        level.requires_local_only()
    }

    fn enforce_routing(&self, level: ClassificationLevel, proposed: Tier) -> AppResult<Tier> {
        if proposed.is_local() || !level.requires_local_only() {
            return Ok(proposed);
        }

        let err = AppError::ClassificationBlocked {
            level: level.to_string(),
            tier: proposed.to_string(),
        };
        self.audit.record(AuditEvent::new(
            AuditEventKind::Ac4Block,
            level,
            Some(proposed),
            err.to_string(),
        ));
        Err(err)
    }
}
