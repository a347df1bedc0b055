//! Routing types and the decision engine
//!
//! A routing decision maps one user query to a [`Tier`]: the response cache,
//! the local model, OpenRouter's auto-router, or a specific cloud model class.
//! Classification enforcement always takes precedence over every other input.

pub mod classify;
pub mod cost;
pub mod engine;

pub use classify::{QueryAnalysis, classify_complexity, classify_type, estimate_tokens};
pub use engine::RoutingDecisionEngine;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum accepted query length in bytes; longer queries stay local
pub const MAX_QUERY_BYTES: usize = 100_000;

/// Routing destination for a query
///
/// Ordered from cheapest to most expensive. `Cache` and `Local` are free and
/// never leave the machine; everything from `Auto` upward is a paid cloud tier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Cache,
    #[default]
    Local,
    /// OpenRouter picks the model
    Auto,
    /// Generic cloud tier (served through OpenRouter auto)
    Cloud,
    Haiku,
    Sonnet,
    Opus,
    #[serde(rename = "gpt-4o")]
    Gpt4o,
}

impl Tier {
    /// All tiers, cheapest first
    pub const ALL: [Tier; 8] = [
        Tier::Cache,
        Tier::Local,
        Tier::Auto,
        Tier::Cloud,
        Tier::Haiku,
        Tier::Sonnet,
        Tier::Opus,
        Tier::Gpt4o,
    ];

    /// Configuration / metrics label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Local => "local",
            Self::Auto => "auto",
            Self::Cloud => "cloud",
            Self::Haiku => "haiku",
            Self::Sonnet => "sonnet",
            Self::Opus => "opus",
            Self::Gpt4o => "gpt-4o",
        }
    }

    /// Human-readable name shown in the chat transcript
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Cache => "Cache",
            Self::Local => "Local",
            Self::Auto => "Auto",
            Self::Cloud => "Cloud",
            Self::Haiku => "Haiku",
            Self::Sonnet => "Sonnet",
            Self::Opus => "Opus",
            Self::Gpt4o => "GPT-4o",
        }
    }

    /// True for tiers that never leave the machine
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Cache | Self::Local)
    }

    /// True for tiers served by a cloud provider
    pub fn is_cloud(&self) -> bool {
        !self.is_local()
    }

    /// OpenRouter model identifier for cloud tiers
    pub fn openrouter_model(&self) -> Option<&'static str> {
        match self {
            Self::Cache | Self::Local => None,
            Self::Auto | Self::Cloud => Some("openrouter/auto"),
            Self::Haiku => Some("anthropic/claude-3-haiku"),
            Self::Sonnet => Some("anthropic/claude-3-sonnet"),
            Self::Opus => Some("anthropic/claude-3-opus"),
            Self::Gpt4o => Some("openai/gpt-4o"),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Tier {
    type Err = crate::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cache" => Ok(Self::Cache),
            "local" => Ok(Self::Local),
            "auto" => Ok(Self::Auto),
            "cloud" => Ok(Self::Cloud),
            "haiku" => Ok(Self::Haiku),
            "sonnet" => Ok(Self::Sonnet),
            "opus" => Ok(Self::Opus),
            "gpt-4o" | "gpt4o" => Ok(Self::Gpt4o),
            other => Err(crate::error::AppError::Config(format!(
                "unknown tier '{}' (expected cache, local, auto, cloud, haiku, sonnet, opus or gpt-4o)",
                other
            ))),
        }
    }
}

/// Heuristic complexity of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryComplexity {
    Trivial,
    Simple,
    Moderate,
    Complex,
    Expert,
}

impl QueryComplexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trivial => "Trivial",
            Self::Simple => "Simple",
            Self::Moderate => "Moderate",
            Self::Complex => "Complex",
            Self::Expert => "Expert",
        }
    }

    /// Cheapest tier expected to answer a query of this complexity well
    pub fn min_tier(&self) -> Tier {
        match self {
            Self::Trivial => Tier::Cache,
            Self::Simple => Tier::Local,
            Self::Moderate | Self::Complex | Self::Expert => Tier::Cloud,
        }
    }
}

impl fmt::Display for QueryComplexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse category of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    #[default]
    Unknown,
    Lookup,
    Explanation,
    CodeGeneration,
    Refactoring,
    Architecture,
    Debugging,
    Review,
    Planning,
    General,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Lookup => "Lookup",
            Self::Explanation => "Explanation",
            Self::CodeGeneration => "CodeGeneration",
            Self::Refactoring => "Refactoring",
            Self::Architecture => "Architecture",
            Self::Debugging => "Debugging",
            Self::Review => "Review",
            Self::Planning => "Planning",
            Self::General => "General",
        }
    }

    /// Which kind of model suits this query: "fast", "code" or "reasoning"
    pub fn model_hint(&self) -> &'static str {
        match self {
            Self::CodeGeneration | Self::Refactoring | Self::Debugging => "code",
            Self::Architecture | Self::Planning | Self::Review => "reasoning",
            Self::Unknown | Self::Lookup | Self::Explanation | Self::General => "fast",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-selected routing mode
///
/// Parsing is lenient: `"hybrid"` is an alias of auto, and any unrecognised
/// or empty string also means auto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RoutingMode {
    Local,
    Cloud,
    #[default]
    Auto,
}

impl RoutingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Cloud => "cloud",
            Self::Auto => "auto",
        }
    }

    /// Map free-form user input to a mode, defaulting to auto
    pub fn from_user_input(input: &str) -> Self {
        match input.trim().to_ascii_lowercase().as_str() {
            "local" => Self::Local,
            "cloud" => Self::Cloud,
            _ => Self::Auto,
        }
    }
}

impl From<&str> for RoutingMode {
    fn from(value: &str) -> Self {
        Self::from_user_input(value)
    }
}

impl From<String> for RoutingMode {
    fn from(value: String) -> Self {
        Self::from_user_input(&value)
    }
}

impl From<RoutingMode> for String {
    fn from(value: RoutingMode) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for RoutingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What auto mode does when no cloud credential is configured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoFallback {
    /// Route locally without telling the user
    #[default]
    Local,
    /// Route locally and surface a notice asking for a key
    Error,
}

/// Inputs to the routing decision besides the query itself
#[derive(Debug, Clone, PartialEq)]
pub struct RouterOptions {
    /// Upper bound on the selected tier; `None` means uncapped
    pub max_tier: Option<Tier>,
    /// Blocks all cloud routing regardless of classification
    pub paranoid: bool,
    /// Whether an OpenRouter key (and client) is available
    pub has_cloud_key: bool,
    pub auto_prefer_local: bool,
    /// Cost ceiling per query in cents for auto mode; 0 means unlimited
    pub auto_max_cost_cents: f64,
    pub auto_fallback: AutoFallback,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            max_tier: Some(Tier::Opus),
            paranoid: false,
            has_cloud_key: false,
            auto_prefer_local: false,
            auto_max_cost_cents: 0.0,
            auto_fallback: AutoFallback::Local,
        }
    }
}

impl RouterOptions {
    pub fn with_cloud_key(mut self, has_cloud_key: bool) -> Self {
        self.has_cloud_key = has_cloud_key;
        self
    }

    pub fn with_paranoid(mut self, paranoid: bool) -> Self {
        self.paranoid = paranoid;
        self
    }

    pub fn with_max_tier(mut self, max_tier: Option<Tier>) -> Self {
        self.max_tier = max_tier;
        self
    }

    pub fn with_auto_fallback(mut self, fallback: AutoFallback) -> Self {
        self.auto_fallback = fallback;
        self
    }

    pub fn with_auto_prefer_local(mut self, prefer_local: bool) -> Self {
        self.auto_prefer_local = prefer_local;
        self
    }

    pub fn with_auto_max_cost(mut self, cents: f64) -> Self {
        self.auto_max_cost_cents = cents;
        self
    }
}

/// Marker prefixed to every reason rewritten by classification enforcement
pub const ENFORCEMENT_MARKER: &str = "AC-4 ENFORCED:";

/// Result of one routing evaluation
///
/// Immutable once built. The only transformation is [`RoutingDecision::enforced_local`],
/// which consumes the decision and yields a fresh local one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingDecision {
    tier: Tier,
    complexity: QueryComplexity,
    query_type: QueryType,
    estimated_cost_cents: f64,
    reason: String,
    is_auto_routed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    notice: Option<String>,
}

impl RoutingDecision {
    /// Build a decision, estimating cost from the tier for a typical query
    pub fn new(
        tier: Tier,
        complexity: QueryComplexity,
        query_type: QueryType,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            tier,
            complexity,
            query_type,
            estimated_cost_cents: cost::estimate_query_cost(tier),
            reason: reason.into(),
            is_auto_routed: tier == Tier::Auto,
            notice: None,
        }
    }

    /// Attach a user-visible notice
    pub fn with_notice(mut self, notice: impl Into<String>) -> Self {
        self.notice = Some(notice.into());
        self
    }

    /// Replace this decision with a local one, keeping the original reasoning visible
    pub fn enforced_local(self, blocked_by: &str) -> Self {
        Self {
            tier: Tier::Local,
            complexity: self.complexity,
            query_type: self.query_type,
            estimated_cost_cents: 0.0,
            reason: format!(
                "{} {} (blocked: {})",
                ENFORCEMENT_MARKER, self.reason, blocked_by
            ),
            is_auto_routed: false,
            notice: self.notice,
        }
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn complexity(&self) -> QueryComplexity {
        self.complexity
    }

    pub fn query_type(&self) -> QueryType {
        self.query_type
    }

    pub fn estimated_cost_cents(&self) -> f64 {
        self.estimated_cost_cents
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn is_auto_routed(&self) -> bool {
        self.is_auto_routed
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// True if classification enforcement altered this decision
    pub fn is_enforced(&self) -> bool {
        self.reason.starts_with(ENFORCEMENT_MARKER)
    }
}

impl fmt::Display for RoutingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (complexity={}, type={}, est_cost={:.4} cents): {}",
            self.tier, self.complexity, self.query_type, self.estimated_cost_cents, self.reason
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering_cheapest_first() {
        assert!(Tier::Cache < Tier::Local);
        assert!(Tier::Local < Tier::Auto);
        assert!(Tier::Cloud < Tier::Haiku);
        assert!(Tier::Opus < Tier::Gpt4o);
    }

    #[test]
    fn test_tier_locality() {
        assert!(Tier::Cache.is_local());
        assert!(Tier::Local.is_local());
        for tier in &Tier::ALL[2..] {
            assert!(tier.is_cloud(), "{:?} should be a cloud tier", tier);
        }
    }

    #[test]
    fn test_tier_display_names() {
        assert_eq!(Tier::Gpt4o.to_string(), "GPT-4o");
        assert_eq!(Tier::Local.to_string(), "Local");
    }

    #[test]
    fn test_tier_from_str_accepts_config_spellings() {
        assert_eq!("opus".parse::<Tier>().unwrap(), Tier::Opus);
        assert_eq!("GPT-4o".parse::<Tier>().unwrap(), Tier::Gpt4o);
        assert_eq!(" local ".parse::<Tier>().unwrap(), Tier::Local);
        assert!("platinum".parse::<Tier>().is_err());
    }

    #[test]
    fn test_tier_serde() {
        assert_eq!(serde_json::to_string(&Tier::Gpt4o).unwrap(), r#""gpt-4o""#);
        assert_eq!(
            serde_json::from_str::<Tier>(r#""sonnet""#).unwrap(),
            Tier::Sonnet
        );
    }

    #[test]
    fn test_openrouter_models() {
        assert_eq!(Tier::Local.openrouter_model(), None);
        assert_eq!(Tier::Auto.openrouter_model(), Some("openrouter/auto"));
        assert_eq!(Tier::Gpt4o.openrouter_model(), Some("openai/gpt-4o"));
    }

    #[test]
    fn test_complexity_min_tier() {
        assert_eq!(QueryComplexity::Trivial.min_tier(), Tier::Cache);
        assert_eq!(QueryComplexity::Simple.min_tier(), Tier::Local);
        assert_eq!(QueryComplexity::Expert.min_tier(), Tier::Cloud);
    }

    #[test]
    fn test_query_type_model_hint() {
        assert_eq!(QueryType::Debugging.model_hint(), "code");
        assert_eq!(QueryType::Planning.model_hint(), "reasoning");
        assert_eq!(QueryType::Unknown.model_hint(), "fast");
    }

    #[test]
    fn test_routing_mode_is_lenient() {
        assert_eq!(RoutingMode::from_user_input("local"), RoutingMode::Local);
        assert_eq!(RoutingMode::from_user_input("CLOUD"), RoutingMode::Cloud);
        assert_eq!(RoutingMode::from_user_input("hybrid"), RoutingMode::Auto);
        assert_eq!(RoutingMode::from_user_input(""), RoutingMode::Auto);
        assert_eq!(RoutingMode::from_user_input("🚀"), RoutingMode::Auto);
    }

    #[test]
    fn test_routing_mode_serde_roundtrips_through_strings() {
        assert_eq!(
            serde_json::from_str::<RoutingMode>(r#""hybrid""#).unwrap(),
            RoutingMode::Auto
        );
        assert_eq!(
            serde_json::to_string(&RoutingMode::Local).unwrap(),
            r#""local""#
        );
    }

    #[test]
    fn test_router_options_default() {
        let opts = RouterOptions::default();
        assert_eq!(opts.max_tier, Some(Tier::Opus));
        assert!(!opts.has_cloud_key);
        assert_eq!(opts.auto_fallback, AutoFallback::Local);
    }

    #[test]
    fn test_decision_new_estimates_cost() {
        let decision = RoutingDecision::new(
            Tier::Local,
            QueryComplexity::Simple,
            QueryType::Lookup,
            "test",
        );
        assert_eq!(decision.estimated_cost_cents(), 0.0);
        assert!(!decision.is_auto_routed());

        let auto = RoutingDecision::new(
            Tier::Auto,
            QueryComplexity::Complex,
            QueryType::General,
            "test",
        );
        assert!(auto.estimated_cost_cents() > 0.0);
        assert!(auto.is_auto_routed());
    }

    #[test]
    fn test_enforced_local_replaces_wholesale() {
        let decision = RoutingDecision::new(
            Tier::Opus,
            QueryComplexity::Expert,
            QueryType::Architecture,
            "picked opus",
        );
        let enforced = decision.enforced_local("policy says no");

        assert_eq!(enforced.tier(), Tier::Local);
        assert_eq!(enforced.estimated_cost_cents(), 0.0);
        assert!(!enforced.is_auto_routed());
        assert!(enforced.is_enforced());
        assert!(enforced.reason().contains("picked opus"));
        assert!(enforced.reason().contains("policy says no"));
        assert_eq!(enforced.complexity(), QueryComplexity::Expert);
    }
}
