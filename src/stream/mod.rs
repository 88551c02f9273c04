pub mod assembler;
pub mod toolcalls;

pub use assembler::StreamAssembler;
pub use toolcalls::{ToolCallAccumulator, ToolCallRecord};

use crate::cost::CostBreakdown;
use crate::error::StreamError;
use std::fmt;

/// Why a stream stopped, normalized across vendors.
///
/// Vendor-specific reason strings (`end_turn`, `tool_use`, `MAX_TOKENS`,
/// ...) are mapped into this fixed vocabulary by [`crate::protocol::mapping`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    Cancelled,
    Error,
}

impl FinishReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ContentFilter => "content_filter",
            FinishReason::ToolCalls => "tool_calls",
            FinishReason::Cancelled => "cancelled",
            FinishReason::Error => "error",
        }
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized incremental response chunk.
///
/// Chunks carry the full accumulated state so far, not just the delta:
/// `content` is everything received, `tool_calls` is the current
/// accumulator snapshot. `finish_reason`, `error` and `cost_info` are only
/// ever set on the terminal chunk, after which the channel closes.
#[derive(Debug, Default)]
pub struct StreamChunk {
    /// Full accumulated text so far.
    pub content: String,
    /// New text in this frame; empty on non-text chunks.
    pub delta: String,
    /// Ordered snapshot of in-progress tool invocations.
    pub tool_calls: Vec<ToolCallRecord>,
    /// Approximate output token count (one per non-empty text fragment).
    pub token_count: u64,
    /// Approximate tokens added by this chunk.
    pub delta_tokens: u64,
    pub finish_reason: Option<FinishReason>,
    pub error: Option<StreamError>,
    pub cost_info: Option<CostBreakdown>,
}

impl StreamChunk {
    /// True for the last chunk of a stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.finish_reason.is_some()
    }
}
