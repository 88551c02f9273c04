/// Token-based cost finalization.
///
/// Invoked once per stream, at termination, when vendor-reported usage
/// counts are available. Pure arithmetic: billed input tokens are the
/// reported input minus cached reads, cached tokens are billed at half
/// the input rate unless the pricing table overrides it, and the total is
/// always the exact sum of the three components.
use crate::protocol::UsageUpdate;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Cost per 1K tokens for one model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub input_cost_per_1k: f64,
    pub output_cost_per_1k: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_cost_per_1k: Option<f64>,
}

/// Final cost breakdown attached to the terminal chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CostBreakdown {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
    pub input_cost_usd: f64,
    pub output_cost_usd: f64,
    pub cached_cost_usd: f64,
    pub total_cost_usd: f64,
}

/// Usage counts collected across a stream's frames.
///
/// Vendors scatter usage over the stream (input counts on the opening
/// frame, output counts on the closing one, or everything on a single
/// trailer); each report overwrites only the fields it carries.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageTally {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub cached_tokens: Option<u64>,
}

impl UsageTally {
    pub(crate) fn record(&mut self, update: UsageUpdate) {
        if update.input_tokens.is_some() {
            self.input_tokens = update.input_tokens;
        }
        if update.output_tokens.is_some() {
            self.output_tokens = update.output_tokens;
        }
        if update.cached_tokens.is_some() {
            self.cached_tokens = update.cached_tokens;
        }
    }

    /// Whether any frame reported usage at all.
    #[must_use]
    pub fn any_reported(&self) -> bool {
        self.input_tokens.is_some() || self.output_tokens.is_some()
    }

    #[must_use]
    pub fn finalize(&self, pricing: Option<&Pricing>, model: &str) -> CostBreakdown {
        calculate_cost(
            self.input_tokens.unwrap_or(0),
            self.output_tokens.unwrap_or(0),
            self.cached_tokens.unwrap_or(0),
            pricing,
            model,
        )
    }
}

/// Compute the cost breakdown for one completed request.
///
/// With no pricing configured for `model`, falls back to a built-in tier
/// and logs a warning, never an error.
#[must_use]
pub fn calculate_cost(
    input_tokens: u64,
    output_tokens: u64,
    cached_tokens: u64,
    pricing: Option<&Pricing>,
    model: &str,
) -> CostBreakdown {
    let pricing = match pricing {
        Some(p) => *p,
        None => {
            warn!(model, "no pricing configured, using fallback tier");
            fallback_pricing(model)
        }
    };

    let cached_rate = pricing
        .cached_cost_per_1k
        .unwrap_or(pricing.input_cost_per_1k * 0.5);

    let billed_input = input_tokens.saturating_sub(cached_tokens);
    let input_cost = billed_input as f64 / 1000.0 * pricing.input_cost_per_1k;
    let cached_cost = cached_tokens as f64 / 1000.0 * cached_rate;
    let output_cost = output_tokens as f64 / 1000.0 * pricing.output_cost_per_1k;

    CostBreakdown {
        input_tokens: billed_input,
        output_tokens,
        cached_tokens,
        input_cost_usd: input_cost,
        output_cost_usd: output_cost,
        cached_cost_usd: cached_cost,
        total_cost_usd: input_cost + output_cost + cached_cost,
    }
}

/// Built-in per-model pricing used when configuration has none.
fn fallback_pricing(model: &str) -> Pricing {
    match model {
        "gpt-4" => Pricing {
            input_cost_per_1k: 0.03,
            output_cost_per_1k: 0.06,
            cached_cost_per_1k: Some(0.015),
        },
        "gpt-4o-mini" => Pricing {
            input_cost_per_1k: 0.00015,
            output_cost_per_1k: 0.0006,
            cached_cost_per_1k: Some(0.000075),
        },
        "gpt-3.5-turbo" => Pricing {
            input_cost_per_1k: 0.0015,
            output_cost_per_1k: 0.002,
            cached_cost_per_1k: Some(0.00075),
        },
        // gpt-4o tier doubles as the default for unknown models.
        _ => Pricing {
            input_cost_per_1k: 0.0025,
            output_cost_per_1k: 0.01,
            cached_cost_per_1k: Some(0.00125),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
