//! Per-session cost and tier accounting

use crate::router::Tier;
use crate::router::cost::savings_vs_opus;
use serde::Serialize;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Outcome of one answered query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub tier: Tier,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub latency_ms: u64,
    pub cache_hit: bool,
    pub cost_cents: f64,
}

impl QueryResult {
    /// Result with cost computed from the tier's pricing
    pub fn new(tier: Tier, input_tokens: u32, output_tokens: u32, latency_ms: u64) -> Self {
        Self {
            tier,
            input_tokens,
            output_tokens,
            latency_ms,
            cache_hit: false,
            cost_cents: tier.calculate_cost_cents(input_tokens, output_tokens),
        }
    }

    /// Answer served from the response cache: free, ~1ms
    pub fn cache_hit(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            tier: Tier::Cache,
            input_tokens,
            output_tokens,
            latency_ms: 1,
            cache_hit: true,
            cost_cents: 0.0,
        }
    }

    pub fn total_tokens(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cache = if self.cache_hit { " [CACHE HIT]" } else { "" };
        write!(
            f,
            "{}{}: {} tokens ({} in, {} out), {}ms, {:.4} cents",
            self.tier,
            cache,
            self.total_tokens(),
            self.input_tokens,
            self.output_tokens,
            self.latency_ms,
            self.cost_cents
        )
    }
}

/// Cumulative counters, as returned by [`SessionStats::snapshot`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub total_queries: u64,
    pub local_queries: u64,
    pub cache_hits: u64,
    pub cloud_queries: u64,
    pub total_cost_cents: f64,
    pub total_saved_cents: f64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
}

impl StatsSnapshot {
    pub fn total_tokens(&self) -> u64 {
        self.total_input_tokens + self.total_output_tokens
    }

    /// Share of the all-Opus cost actually spent; 0 before any query
    pub fn cost_efficiency_percent(&self) -> f64 {
        let opus_cost = self.total_cost_cents + self.total_saved_cents;
        if opus_cost == 0.0 {
            0.0
        } else {
            self.total_cost_cents / opus_cost * 100.0
        }
    }

    fn percent(&self, count: u64) -> f64 {
        if self.total_queries == 0 {
            0.0
        } else {
            count as f64 / self.total_queries as f64 * 100.0
        }
    }

    pub fn summary(&self) -> String {
        if self.total_queries == 0 {
            return "No queries processed yet".to_string();
        }
        format!(
            "Session Stats: {} queries ({:.0}% cache, {:.0}% local, {:.0}% cloud) | Cost: {:.4} cents | Saved: {:.4} cents vs Opus",
            self.total_queries,
            self.percent(self.cache_hits),
            self.percent(self.local_queries),
            self.percent(self.cloud_queries),
            self.total_cost_cents,
            self.total_saved_cents,
        )
    }
}

/// Thread-safe session totals
#[derive(Debug, Default)]
pub struct SessionStats {
    inner: Mutex<StatsSnapshot>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StatsSnapshot> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, result: &QueryResult) {
        let mut stats = self.lock();
        stats.total_queries += 1;
        stats.total_cost_cents += result.cost_cents;
        stats.total_input_tokens += u64::from(result.input_tokens);
        stats.total_output_tokens += u64::from(result.output_tokens);
        stats.total_saved_cents +=
            savings_vs_opus(result.tier, result.input_tokens, result.output_tokens);

        match result.tier {
            Tier::Cache => stats.cache_hits += 1,
            Tier::Local => {
                if result.cache_hit {
                    stats.cache_hits += 1;
                }
                stats.local_queries += 1;
            }
            _ => stats.cloud_queries += 1,
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        *self.lock()
    }

    pub fn summary(&self) -> String {
        self.snapshot().summary()
    }

    pub fn total_tokens(&self) -> u64 {
        self.snapshot().total_tokens()
    }

    pub fn cost_efficiency_percent(&self) -> f64 {
        self.snapshot().cost_efficiency_percent()
    }

    pub fn reset(&self) {
        *self.lock() = StatsSnapshot::default();
    }
}
