/// OpenAI-compatible chat-completions wire types and stream decoding.
///
/// The streaming dialect: anonymous `data: ` SSE lines carrying chunk
/// JSON, tool-call fragments addressed by explicit `index`, a
/// `finish_reason` on the closing choice, usage either on that chunk or on
/// a trailing usage-only chunk (`stream_options.include_usage`), and a
/// literal `[DONE]` sentinel at the very end.
use crate::protocol::mapping::openai_finish_reason;
use crate::protocol::{ActionBuf, StreamAction, ToolCallFragment, UsageUpdate};
use crate::stream::FinishReason;
use serde::{Deserialize, Serialize};

pub const DONE_SENTINEL: &str = "[DONE]";

// ---------------------------------------------------------------------------
// Request wire types
// ---------------------------------------------------------------------------

/// Chat Completions streaming request body.
#[derive(Debug, Clone, Serialize)]
pub struct OpenAiChatRequest {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<OpenAiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<OpenAiStreamOptions>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenAiMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenAiTool {
    #[serde(rename = "type")]
    pub type_: String,
    pub function: OpenAiFunctionDef,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenAiFunctionDef {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenAiStreamOptions {
    pub include_usage: bool,
}

// ---------------------------------------------------------------------------
// Streaming response wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct OpenAiStreamChunk {
    #[serde(default)]
    pub choices: Vec<OpenAiStreamChoice>,
    #[serde(default)]
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiStreamChoice {
    #[serde(default)]
    pub delta: OpenAiDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OpenAiDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<OpenAiToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiToolCallDelta {
    pub index: u32,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<OpenAiFunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OpenAiFunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub prompt_tokens_details: Option<OpenAiPromptDetails>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiPromptDetails {
    #[serde(default)]
    pub cached_tokens: u64,
}

// ---------------------------------------------------------------------------
// Delta decoding
// ---------------------------------------------------------------------------

/// Stateful decoder for the OpenAI streaming dialect.
///
/// Holds a pending finish reason when `finish_reason` arrives before the
/// usage trailer, so the stream finalizes exactly once, on whichever of
/// the usage chunk or `[DONE]` comes first.
#[derive(Debug, Default)]
pub struct OpenAiDeltaDecoder {
    pending_finish: Option<FinishReason>,
}

impl OpenAiDeltaDecoder {
    pub(crate) fn decode(&mut self, payload: &str, out: &mut ActionBuf) {
        if payload.trim() == DONE_SENTINEL {
            out.push(StreamAction::Finish(
                self.pending_finish.take().unwrap_or(FinishReason::Stop),
            ));
            return;
        }

        let Ok(chunk) = serde_json::from_str::<OpenAiStreamChunk>(payload) else {
            return;
        };

        let usage = chunk.usage.map(usage_update);

        let Some(choice) = chunk.choices.into_iter().next() else {
            // Usage-only trailer (stream_options.include_usage).
            if let Some(update) = usage {
                out.push(StreamAction::Usage(update));
                out.push(StreamAction::Finish(
                    self.pending_finish.take().unwrap_or(FinishReason::Stop),
                ));
            }
            return;
        };

        if let Some(content) = choice.delta.content {
            if !content.is_empty() {
                out.push(StreamAction::Text(content));
            }
        }

        if let Some(tool_calls) = choice.delta.tool_calls {
            for tc in tool_calls {
                let (name, args) = match tc.function {
                    Some(func) => (func.name, func.arguments.unwrap_or_default()),
                    None => (None, String::new()),
                };
                out.push(StreamAction::ToolCall(ToolCallFragment {
                    index: tc.index as usize,
                    id: tc.id,
                    name,
                    args,
                }));
            }
        }

        match (choice.finish_reason, usage) {
            (Some(reason), Some(update)) => {
                out.push(StreamAction::Usage(update));
                out.push(StreamAction::Finish(openai_finish_reason(&reason)));
            }
            (Some(reason), None) => {
                // Usage trailer still to come; hold the reason.
                self.pending_finish = Some(openai_finish_reason(&reason));
            }
            (None, Some(update)) => {
                out.push(StreamAction::Usage(update));
                if let Some(reason) = self.pending_finish.take() {
                    out.push(StreamAction::Finish(reason));
                }
            }
            (None, None) => {}
        }
    }
}

fn usage_update(usage: OpenAiUsage) -> UsageUpdate {
    UsageUpdate {
        input_tokens: Some(usage.prompt_tokens),
        output_tokens: Some(usage.completion_tokens),
        cached_tokens: usage.prompt_tokens_details.map(|d| d.cached_tokens),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
