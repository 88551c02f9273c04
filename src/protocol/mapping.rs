/// Vendor finish/stop reason strings mapped into the fixed
/// [`FinishReason`] vocabulary.
///
/// Unknown reasons map to `Stop`: a vendor inventing a new benign reason
/// must not turn a successful stream into a failure.
use crate::stream::FinishReason;

#[must_use]
pub fn openai_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "length" => FinishReason::Length,
        "content_filter" => FinishReason::ContentFilter,
        "tool_calls" | "function_call" => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    }
}

#[must_use]
pub fn anthropic_stop_reason(reason: &str) -> FinishReason {
    match reason {
        "max_tokens" => FinishReason::Length,
        "tool_use" => FinishReason::ToolCalls,
        "refusal" => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

#[must_use]
pub fn gemini_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => {
            FinishReason::ContentFilter
        }
        "MALFORMED_FUNCTION_CALL" => FinishReason::Error,
        _ => FinishReason::Stop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_reasons() {
        assert_eq!(openai_finish_reason("stop"), FinishReason::Stop);
        assert_eq!(openai_finish_reason("length"), FinishReason::Length);
        assert_eq!(openai_finish_reason("tool_calls"), FinishReason::ToolCalls);
        assert_eq!(
            openai_finish_reason("content_filter"),
            FinishReason::ContentFilter
        );
        assert_eq!(openai_finish_reason("whatever_new"), FinishReason::Stop);
    }

    #[test]
    fn anthropic_reasons() {
        assert_eq!(anthropic_stop_reason("end_turn"), FinishReason::Stop);
        assert_eq!(anthropic_stop_reason("stop_sequence"), FinishReason::Stop);
        assert_eq!(anthropic_stop_reason("max_tokens"), FinishReason::Length);
        assert_eq!(anthropic_stop_reason("tool_use"), FinishReason::ToolCalls);
    }

    #[test]
    fn gemini_reasons() {
        assert_eq!(gemini_finish_reason("STOP"), FinishReason::Stop);
        assert_eq!(gemini_finish_reason("MAX_TOKENS"), FinishReason::Length);
        assert_eq!(gemini_finish_reason("SAFETY"), FinishReason::ContentFilter);
        assert_eq!(
            gemini_finish_reason("MALFORMED_FUNCTION_CALL"),
            FinishReason::Error
        );
    }
}
