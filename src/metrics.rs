//! Prometheus metrics for a chat session
//!
//! Tracks:
//! - Queries by routing tier and how they ended
//! - Cache hits by match type
//! - Classification downgrades
//! - Stream latency (time to first token, total duration)
//! - Render loop efficiency (redraws vs. skipped redraws, stale events)
//!
//! All label values come from closed enums so cardinality is fixed at compile
//! time. `rigchat ask --metrics` prints the registry in text format on exit.

use crate::backend::BackendKind;
use crate::cache::CacheHitType;
use crate::router::Tier;
use crate::security::ClassificationLevel;
use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

/// How a stream ended, for metric labels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Complete,
    Error,
    Cancelled,
}

impl StreamOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamOutcome::Complete => "complete",
            StreamOutcome::Error => "error",
            StreamOutcome::Cancelled => "cancelled",
        }
    }
}

/// Which latency a histogram sample measures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyPhase {
    FirstToken,
    Total,
}

impl LatencyPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LatencyPhase::FirstToken => "first_token",
            LatencyPhase::Total => "total",
        }
    }
}

pub struct Metrics {
    pub registry: Arc<Registry>,
    queries_total: CounterVec,
    cache_hits: IntCounterVec,
    policy_downgrades: IntCounterVec,
    stream_latency: HistogramVec,
    redraws: IntCounter,
    redraws_skipped: IntCounter,
    stale_events: IntCounter,
    metrics_recording_failures: IntCounterVec,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create and register every metric on a fresh registry
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Cardinality: 8 tiers × 3 outcomes
        let queries_total = CounterVec::new(
            Opts::new(
                "rigchat_queries_total",
                "Total queries by routing tier and stream outcome",
            ),
            &["tier", "outcome"],
        )?;

        let cache_hits = IntCounterVec::new(
            Opts::new(
                "rigchat_cache_hits_total",
                "Queries answered from the response cache by match type",
            ),
            &["hit_type"],
        )?;

        // Labelled by classification so audits can be cross-checked
        let policy_downgrades = IntCounterVec::new(
            Opts::new(
                "rigchat_policy_downgrades_total",
                "Routing decisions forced to the local tier by classification policy",
            ),
            &["classification"],
        )?;

        let stream_latency = HistogramVec::new(
            HistogramOpts::new(
                "rigchat_stream_latency_ms",
                "Stream latency in milliseconds by backend kind and phase",
            )
            .buckets(vec![
                10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0,
            ]),
            &["backend", "phase"],
        )?;

        let redraws = IntCounter::with_opts(Opts::new(
            "rigchat_redraws_total",
            "Render ticks that changed visible content",
        ))?;

        let redraws_skipped = IntCounter::with_opts(Opts::new(
            "rigchat_redraws_skipped_total",
            "Render ticks skipped because content was unchanged",
        ))?;

        let stale_events = IntCounter::with_opts(Opts::new(
            "rigchat_stale_stream_events_total",
            "Stream events dropped because they belonged to a superseded stream",
        ))?;

        let metrics_recording_failures = IntCounterVec::new(
            Opts::new(
                "rigchat_metrics_recording_failures_total",
                "Metric recording operations that returned an error, by operation",
            ),
            &["operation"],
        )?;

        registry.register(Box::new(queries_total.clone()))?;
        registry.register(Box::new(cache_hits.clone()))?;
        registry.register(Box::new(policy_downgrades.clone()))?;
        registry.register(Box::new(stream_latency.clone()))?;
        registry.register(Box::new(redraws.clone()))?;
        registry.register(Box::new(redraws_skipped.clone()))?;
        registry.register(Box::new(stale_events.clone()))?;
        registry.register(Box::new(metrics_recording_failures.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            queries_total,
            cache_hits,
            policy_downgrades,
            stream_latency,
            redraws,
            redraws_skipped,
            stale_events,
            metrics_recording_failures,
        })
    }

    pub fn record_query(
        &self,
        tier: Tier,
        outcome: StreamOutcome,
    ) -> Result<(), prometheus::Error> {
        self.queries_total
            .get_metric_with_label_values(&[tier.as_str(), outcome.as_str()])?
            .inc();
        Ok(())
    }

    /// Record a cache hit; `CacheHitType::None` is ignored
    pub fn record_cache_hit(&self, hit_type: CacheHitType) -> Result<(), prometheus::Error> {
        if hit_type == CacheHitType::None {
            return Ok(());
        }
        self.cache_hits
            .get_metric_with_label_values(&[hit_type.as_str()])?
            .inc();
        Ok(())
    }

    pub fn record_policy_downgrade(
        &self,
        level: ClassificationLevel,
    ) -> Result<(), prometheus::Error> {
        self.policy_downgrades
            .get_metric_with_label_values(&[level.as_str()])?
            .inc();
        Ok(())
    }

    /// Record a latency sample
    ///
    /// # Errors
    ///
    /// Returns an error if the metric is not registered.
    pub fn record_stream_latency(
        &self,
        backend: BackendKind,
        phase: LatencyPhase,
        latency: Duration,
    ) -> Result<(), prometheus::Error> {
        let ms = latency.as_secs_f64() * 1000.0;
        self.stream_latency
            .get_metric_with_label_values(&[backend.as_str(), phase.as_str()])?
            .observe(ms);
        Ok(())
    }

    /// Count one render tick; `redrawn` is false when the viewport gate skipped it
    pub fn record_redraw(&self, redrawn: bool) {
        if redrawn {
            self.redraws.inc();
        } else {
            self.redraws_skipped.inc();
        }
    }

    pub fn stale_event(&self) {
        self.stale_events.inc();
    }

    pub fn stale_events_count(&self) -> u64 {
        self.stale_events.get()
    }

    /// Track a failed `record_*` call
    ///
    /// Metric errors never interrupt the chat; callers log and count them here.
    pub fn metrics_recording_failure(&self, operation: &str) {
        self.metrics_recording_failures
            .with_label_values(&[operation])
            .inc();
    }

    pub fn metrics_recording_failures_count(&self) -> u64 {
        self.registry
            .gather()
            .iter()
            .filter(|mf| mf.name() == "rigchat_metrics_recording_failures_total")
            .flat_map(|mf| mf.get_metric())
            .map(|m| m.get_counter().value() as u64)
            .sum()
    }

    /// Encode all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;

        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!(
                "Failed to convert metrics to UTF-8 at byte {}: {}",
                e.utf8_error().valid_up_to(),
                e
            ))
        })
    }
}
