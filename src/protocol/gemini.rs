/// Gemini generateContent wire types and stream decoding.
///
/// With `alt=sse` the streaming endpoint emits one `GenerateContentResponse`
/// JSON object per `data: ` line. Text arrives in `candidates[0].content.parts`,
/// tool invocations arrive as whole `functionCall` parts (arguments complete
/// in one shot, unlike the shard-based vendors), usage rides on
/// `usageMetadata`, and a non-empty `finishReason` is the terminal signal;
/// there is no `[DONE]`-style sentinel.
use crate::protocol::mapping::gemini_finish_reason;
use crate::protocol::{ActionBuf, StreamAction, ToolCallFragment, UsageUpdate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Request wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GeminiContent>,
    #[serde(rename = "generationConfig")]
    pub generation_config: GeminiGenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<GeminiToolDecl>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(
        rename = "functionCall",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub function_call: Option<GeminiFunctionCall>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiFunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(rename = "topP", skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeminiToolDecl {
    #[serde(rename = "functionDeclarations")]
    pub function_declarations: Vec<GeminiFunctionDecl>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeminiFunctionDecl {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Streaming response wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct GeminiStreamResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata", default)]
    pub usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiCandidate {
    #[serde(default)]
    pub content: Option<GeminiContent>,
    #[serde(rename = "finishReason", default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiUsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    pub prompt_token_count: u64,
    #[serde(rename = "candidatesTokenCount", default)]
    pub candidates_token_count: u64,
    #[serde(rename = "cachedContentTokenCount", default)]
    pub cached_content_token_count: u64,
}

// ---------------------------------------------------------------------------
// Delta decoding
// ---------------------------------------------------------------------------

/// Stateful decoder for the Gemini streaming dialect.
///
/// Gemini reports no call ids, so each `functionCall` part gets a
/// generated one and the next sequential accumulator slot.
#[derive(Debug, Default)]
pub struct GeminiDeltaDecoder {
    next_call: usize,
}

impl GeminiDeltaDecoder {
    pub(crate) fn decode(&mut self, payload: &str, out: &mut ActionBuf) {
        let Ok(response) = serde_json::from_str::<GeminiStreamResponse>(payload) else {
            return;
        };

        let usage = response.usage_metadata.map(|meta| UsageUpdate {
            input_tokens: Some(meta.prompt_token_count),
            output_tokens: Some(meta.candidates_token_count),
            cached_tokens: Some(meta.cached_content_token_count),
        });

        let Some(candidate) = response.candidates.into_iter().next() else {
            if let Some(update) = usage {
                out.push(StreamAction::Usage(update));
            }
            return;
        };

        if let Some(content) = candidate.content {
            for part in content.parts {
                if let Some(text) = part.text {
                    if !text.is_empty() {
                        out.push(StreamAction::Text(text));
                    }
                }
                if let Some(call) = part.function_call {
                    let slot = self.next_call;
                    self.next_call += 1;
                    let args = serde_json::to_string(&call.args)
                        .unwrap_or_else(|_| String::from("{}"));
                    out.push(StreamAction::ToolCall(ToolCallFragment {
                        index: slot,
                        id: Some(format!("call_{}", Uuid::new_v4().simple())),
                        name: Some(call.name),
                        args,
                    }));
                }
            }
        }

        if let Some(update) = usage {
            out.push(StreamAction::Usage(update));
        }

        if let Some(reason) = candidate.finish_reason {
            if !reason.is_empty() {
                out.push(StreamAction::Finish(gemini_finish_reason(&reason)));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::FinishReason;

    fn decode_all(payloads: &[&str]) -> Vec<StreamAction> {
        let mut decoder = GeminiDeltaDecoder::default();
        let mut actions = Vec::new();
        for payload in payloads {
            let mut buf = ActionBuf::new();
            decoder.decode(payload, &mut buf);
            actions.extend(buf);
        }
        actions
    }

    #[test]
    fn text_parts_become_text_actions() {
        let actions = decode_all(&[
            r#"{"candidates":[{"content":{"parts":[{"text":"Hello "}]}}]}"#,
            r#"{"candidates":[{"content":{"parts":[{"text":"world"}]}}]}"#,
        ]);
        assert_eq!(
            actions,
            vec![
                StreamAction::Text("Hello ".to_string()),
                StreamAction::Text("world".to_string()),
            ]
        );
    }

    #[test]
    fn finish_reason_with_usage_terminates() {
        let actions = decode_all(&[
            r#"{"candidates":[{"content":{"parts":[{"text":"done"}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":7,"candidatesTokenCount":3}}"#,
        ]);
        assert_eq!(actions[0], StreamAction::Text("done".to_string()));
        assert_eq!(
            actions[1],
            StreamAction::Usage(UsageUpdate {
                input_tokens: Some(7),
                output_tokens: Some(3),
                cached_tokens: Some(0),
            })
        );
        assert_eq!(actions[2], StreamAction::Finish(FinishReason::Stop));
    }

    #[test]
    fn function_call_parts_get_sequential_slots_and_ids() {
        let actions = decode_all(&[
            r#"{"candidates":[{"content":{"parts":[{"functionCall":{"name":"lookup","args":{"q":"rust"}}}]}}]}"#,
            r#"{"candidates":[{"content":{"parts":[{"functionCall":{"name":"fetch","args":{}}}]}}]}"#,
        ]);
        assert_eq!(actions.len(), 2);
        match (&actions[0], &actions[1]) {
            (StreamAction::ToolCall(first), StreamAction::ToolCall(second)) => {
                assert_eq!(first.index, 0);
                assert_eq!(second.index, 1);
                assert_eq!(first.name.as_deref(), Some("lookup"));
                assert_eq!(first.args, r#"{"q":"rust"}"#);
                assert!(first.id.as_deref().unwrap().starts_with("call_"));
                assert_ne!(first.id, second.id);
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
    }

    #[test]
    fn safety_finish_maps_to_content_filter() {
        let actions = decode_all(&[r#"{"candidates":[{"finishReason":"SAFETY"}]}"#]);
        assert_eq!(
            actions,
            vec![StreamAction::Finish(FinishReason::ContentFilter)]
        );
    }

    #[test]
    fn malformed_payload_is_skipped() {
        assert!(decode_all(&["][", r#"{"candidates":[]}"#]).is_empty());
    }
}
