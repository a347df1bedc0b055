//! Routing decision engine
//!
//! Check order is fixed and must not be rearranged:
//! 1. Classification gate (before the mode is even looked at)
//! 2. Paranoid mode
//! 3. Query length
//! 4. Mode branch (local / cloud / auto)
//! 5. Enforcer re-check of any cloud result
//!
//! `decide` is total. Malformed input of any kind yields a local decision.

use super::{
    AutoFallback, ENFORCEMENT_MARKER, MAX_QUERY_BYTES, QueryComplexity, QueryType, RouterOptions,
    RoutingDecision, RoutingMode, Tier, classify_complexity, classify_type, cost,
};
use crate::security::{
    AuditEvent, AuditEventKind, AuditSink, ClassificationEnforcer, ClassificationLevel,
};
use std::sync::Arc;

/// Notice shown when auto mode is configured to error without a cloud key
pub const MISSING_CLOUD_KEY_NOTICE: &str =
    "Auto mode requires OpenRouter API key. Set cloud.openrouter_key or switch to local mode.";

const LOG_QUERY_CHARS: usize = 50;

fn truncate_for_log(query: &str) -> String {
    if query.chars().count() <= LOG_QUERY_CHARS {
        return query.to_string();
    }
    let head: String = query.chars().take(LOG_QUERY_CHARS - 3).collect();
    format!("{}...", head)
}

fn base_reason(complexity: QueryComplexity, query_type: QueryType, tier: Tier) -> String {
    format!(
        "Query classified as {} complexity ({} type) -> {} tier",
        complexity, query_type, tier
    )
}

/// Produces a [`RoutingDecision`] for each user query
pub struct RoutingDecisionEngine {
    enforcer: Arc<dyn ClassificationEnforcer>,
    audit: Arc<dyn AuditSink>,
}

impl RoutingDecisionEngine {
    pub fn new(enforcer: Arc<dyn ClassificationEnforcer>, audit: Arc<dyn AuditSink>) -> Self {
        Self { enforcer, audit }
    }

    /// Route one query
    ///
    /// `mode` is the raw user selection; unknown strings mean auto. With no
    /// options the engine assumes no cloud credential, which keeps the
    /// decision local.
    pub fn decide(
        &self,
        query: &str,
        classification: ClassificationLevel,
        mode: &str,
        options: Option<&RouterOptions>,
    ) -> RoutingDecision {
        let decision = self.evaluate(query, classification, mode, options);

        tracing::info!(
            query = %truncate_for_log(query),
            classification = %classification,
            mode = %mode,
            tier = %decision.tier(),
            cost_cents = decision.estimated_cost_cents(),
            enforced = decision.is_enforced(),
            reason = %decision.reason(),
            "Routing decision"
        );

        decision
    }

    fn evaluate(
        &self,
        query: &str,
        classification: ClassificationLevel,
        mode: &str,
        options: Option<&RouterOptions>,
    ) -> RoutingDecision {
        let complexity = classify_complexity(query);
        let query_type = classify_type(query);

        // Gate 1: classification, before the mode is read
        if self.enforcer.requires_local_only(classification) {
            let reason = format!(
                "{} {} classification blocks cloud routing - {}",
                ENFORCEMENT_MARKER,
                classification,
                base_reason(complexity, query_type, Tier::Local)
            );
            self.audit.record(AuditEvent::new(
                AuditEventKind::ClassificationGate,
                classification,
                None,
                reason.clone(),
            ));
            return RoutingDecision::new(Tier::Local, complexity, query_type, reason);
        }

        let default_options = RouterOptions::default();
        let opts = options.unwrap_or(&default_options);

        // Gate 2: paranoid mode
        if opts.paranoid {
            return RoutingDecision::new(
                Tier::Local,
                complexity,
                query_type,
                format!(
                    "{} (FORCED: paranoid mode blocks cloud)",
                    base_reason(complexity, query_type, Tier::Local)
                ),
            );
        }

        // Gate 3: oversized queries
        if query.len() > MAX_QUERY_BYTES {
            return RoutingDecision::new(
                Tier::Local,
                QueryComplexity::Simple,
                QueryType::Unknown,
                format!(
                    "Query rejected: query too long: {} bytes (max {})",
                    query.len(),
                    MAX_QUERY_BYTES
                ),
            );
        }

        let decision = match RoutingMode::from_user_input(mode) {
            RoutingMode::Local => RoutingDecision::new(
                Tier::Local,
                complexity,
                query_type,
                format!(
                    "{} (local mode)",
                    base_reason(complexity, query_type, Tier::Local)
                ),
            ),
            RoutingMode::Cloud => Self::cloud_mode(complexity, query_type, opts),
            RoutingMode::Auto => Self::auto_mode(complexity, query_type, opts),
        };

        self.recheck(decision, classification)
    }

    fn cloud_mode(
        complexity: QueryComplexity,
        query_type: QueryType,
        opts: &RouterOptions,
    ) -> RoutingDecision {
        if !opts.has_cloud_key {
            return RoutingDecision::new(
                Tier::Local,
                complexity,
                query_type,
                format!(
                    "{} (cloud mode requested, no cloud credential)",
                    base_reason(complexity, query_type, Tier::Local)
                ),
            );
        }

        let mut tier = complexity.min_tier().max(Tier::Cloud);
        // Caps below the cloud baseline are ignored in cloud mode
        if let Some(cap) = opts.max_tier.filter(Tier::is_cloud) {
            tier = tier.min(cap);
        }

        RoutingDecision::new(
            tier,
            complexity,
            query_type,
            format!("{} (cloud mode)", base_reason(complexity, query_type, tier)),
        )
    }

    fn auto_mode(
        complexity: QueryComplexity,
        query_type: QueryType,
        opts: &RouterOptions,
    ) -> RoutingDecision {
        let local = |suffix: &str| {
            RoutingDecision::new(
                Tier::Local,
                complexity,
                query_type,
                format!(
                    "{} ({})",
                    base_reason(complexity, query_type, Tier::Local),
                    suffix
                ),
            )
        };

        if !opts.has_cloud_key {
            let decision = local("no cloud key");
            return match opts.auto_fallback {
                AutoFallback::Error => decision.with_notice(MISSING_CLOUD_KEY_NOTICE),
                AutoFallback::Local => decision,
            };
        }

        if opts.max_tier.is_some_and(|cap| cap.is_local()) {
            return local("max tier caps routing to local");
        }

        if opts.auto_prefer_local && complexity <= QueryComplexity::Simple {
            return local("prefer local hint");
        }

        let auto_cost = cost::estimate_query_cost(Tier::Auto);
        if opts.auto_max_cost_cents > 0.0 && auto_cost > opts.auto_max_cost_cents {
            return local(&format!(
                "estimated {:.4} cents exceeds max cost {:.2} cents",
                auto_cost, opts.auto_max_cost_cents
            ));
        }

        let mut reason = format!(
            "Query classified as {} complexity ({} type) -> OpenRouter auto-routing",
            complexity, query_type
        );
        if opts.auto_prefer_local {
            reason.push_str(" (prefer local hint)");
        }
        if opts.auto_max_cost_cents > 0.0 {
            reason.push_str(&format!(
                " (max cost: {:.2} cents)",
                opts.auto_max_cost_cents
            ));
        }
        RoutingDecision::new(Tier::Auto, complexity, query_type, reason)
    }

    /// Second enforcer pass over any cloud result
    ///
    /// Local results (including the auto-mode fallback) skip the enforcer.
    fn recheck(
        &self,
        decision: RoutingDecision,
        classification: ClassificationLevel,
    ) -> RoutingDecision {
        let proposed = decision.tier();
        if proposed.is_local() {
            return decision;
        }

        match self.enforcer.enforce_routing(classification, proposed) {
            Ok(tier) if tier.is_local() => {
                decision.enforced_local(&format!("enforcer selected {} tier", tier))
            }
            Ok(_) => decision,
            Err(err) => {
                tracing::warn!(
                    classification = %classification,
                    proposed_tier = %proposed,
                    error = %err,
                    "Cloud routing blocked on re-check, downgrading to local"
                );
                decision.enforced_local(&err.to_string())
            }
        }
    }
}
