pub mod anthropic;
pub mod gemini;
pub mod mapping;
pub mod openai;

use crate::stream::FinishReason;
use smallvec::SmallVec;

/// Which vendor wire dialect a stream speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VendorKind {
    OpenAi,
    Anthropic,
    Gemini,
}

/// One fragment of an in-progress tool invocation, as extracted from a
/// vendor payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ToolCallFragment {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub args: String,
}

/// Usage counts reported by a vendor payload. Fields left `None` keep
/// whatever an earlier frame reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct UsageUpdate {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub cached_tokens: Option<u64>,
}

/// What one decoded wire payload means for the stream.
///
/// A malformed or irrelevant payload produces no actions at all; the
/// assembler just moves on to the next frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StreamAction {
    /// Incremental text to append to the accumulated content.
    Text(String),
    /// Tool-invocation fragment to merge into the accumulator.
    ToolCall(ToolCallFragment),
    /// Vendor-reported usage counts.
    Usage(UsageUpdate),
    /// Vendor terminal signal; always the last action of a stream.
    Finish(FinishReason),
    /// Vendor-signaled in-band failure; terminal.
    Fail { message: String },
}

pub(crate) type ActionBuf = SmallVec<[StreamAction; 4]>;

/// Per-vendor delta extraction, dispatched by explicit enum; each
/// [`VendorKind`] is bound to exactly one decoder.
#[derive(Debug)]
pub(crate) enum DeltaDecoder {
    OpenAi(openai::OpenAiDeltaDecoder),
    Anthropic(anthropic::AnthropicDeltaDecoder),
    Gemini(gemini::GeminiDeltaDecoder),
}

impl DeltaDecoder {
    pub(crate) fn new(kind: VendorKind) -> Self {
        match kind {
            VendorKind::OpenAi => DeltaDecoder::OpenAi(openai::OpenAiDeltaDecoder::default()),
            VendorKind::Anthropic => {
                DeltaDecoder::Anthropic(anthropic::AnthropicDeltaDecoder::default())
            }
            VendorKind::Gemini => DeltaDecoder::Gemini(gemini::GeminiDeltaDecoder::default()),
        }
    }

    /// Extract the actions one wire payload implies.
    pub(crate) fn decode(&mut self, payload: &str, out: &mut ActionBuf) {
        match self {
            DeltaDecoder::OpenAi(decoder) => decoder.decode(payload, out),
            DeltaDecoder::Anthropic(decoder) => decoder.decode(payload, out),
            DeltaDecoder::Gemini(decoder) => decoder.decode(payload, out),
        }
    }
}
