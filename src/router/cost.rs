//! Tier pricing and cost estimation
//!
//! Prices are in cents per 1K tokens.

use super::Tier;

/// Input tokens assumed for a typical query when estimating ahead of time
pub const TYPICAL_INPUT_TOKENS: u32 = 500;
/// Output tokens assumed for a typical query when estimating ahead of time
pub const TYPICAL_OUTPUT_TOKENS: u32 = 1000;

/// Per-1K-token pricing for a tier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierPricing {
    pub input: f64,
    pub output: f64,
}

impl Tier {
    pub fn pricing(&self) -> TierPricing {
        let (input, output) = match self {
            Self::Cache | Self::Local => (0.0, 0.0),
            Self::Auto | Self::Cloud => (0.03, 0.15),
            Self::Haiku => (0.025, 0.125),
            Self::Sonnet => (0.3, 1.5),
            Self::Opus => (1.5, 7.5),
            Self::Gpt4o => (0.25, 1.0),
        };
        TierPricing { input, output }
    }

    /// Cost of a request in cents
    pub fn calculate_cost_cents(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        let pricing = self.pricing();
        (f64::from(input_tokens) / 1000.0) * pricing.input
            + (f64::from(output_tokens) / 1000.0) * pricing.output
    }
}

/// Up-front cost estimate for a typical query on `tier`
pub fn estimate_query_cost(tier: Tier) -> f64 {
    tier.calculate_cost_cents(TYPICAL_INPUT_TOKENS, TYPICAL_OUTPUT_TOKENS)
}

/// Cents saved by using `tier` instead of Opus for the same token counts
pub fn savings_vs_opus(tier: Tier, input_tokens: u32, output_tokens: u32) -> f64 {
    Tier::Opus.calculate_cost_cents(input_tokens, output_tokens)
        - tier.calculate_cost_cents(input_tokens, output_tokens)
}
