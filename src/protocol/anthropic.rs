/// Anthropic Messages wire types and stream decoding.
///
/// The streaming dialect is typed events: `message_start` (carries input
/// and cache-read usage), `content_block_start`/`content_block_delta`/
/// `content_block_stop` (text and `input_json_delta` tool-argument
/// shards), `message_delta` (stop reason plus output usage), and
/// `message_stop` as the terminal signal. On Bedrock the identical event
/// JSON travels inside binary event-stream frames instead of SSE lines;
/// the decoder is shared, only the scanner differs.
use crate::protocol::mapping::anthropic_stop_reason;
use crate::protocol::{ActionBuf, StreamAction, ToolCallFragment, UsageUpdate};
use crate::stream::FinishReason;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Request wire types
// ---------------------------------------------------------------------------

/// Messages API streaming request body.
#[derive(Debug, Clone, Serialize)]
pub struct AnthropicRequest {
    /// Omitted on Bedrock, where the model lives in the URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<AnthropicTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Omitted on Bedrock, where the streaming endpoint implies it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// Bedrock carries the API version in the body instead of a header.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anthropic_version: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnthropicTool {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Streaming response wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum AnthropicStreamEvent {
    #[serde(rename = "message_start")]
    MessageStart { message: AnthropicMessageStart },
    #[serde(rename = "content_block_start")]
    ContentBlockStart {
        index: usize,
        content_block: AnthropicContentBlock,
    },
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { index: usize, delta: AnthropicDelta },
    #[serde(rename = "content_block_stop")]
    ContentBlockStop { index: usize },
    #[serde(rename = "message_delta")]
    MessageDelta {
        delta: AnthropicMessageDeltaBody,
        #[serde(default)]
        usage: Option<AnthropicUsage>,
    },
    #[serde(rename = "message_stop")]
    MessageStop {},
    #[serde(rename = "ping")]
    Ping {},
    #[serde(rename = "error")]
    Error { error: AnthropicErrorBody },
}

#[derive(Debug, Deserialize)]
pub struct AnthropicMessageStart {
    #[serde(default)]
    pub usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum AnthropicContentBlock {
    #[serde(rename = "text")]
    Text {
        #[serde(default)]
        text: String,
    },
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String },
    #[serde(rename = "thinking")]
    Thinking {
        #[serde(default)]
        thinking: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum AnthropicDelta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(rename = "input_json_delta")]
    InputJsonDelta { partial_json: String },
    #[serde(rename = "thinking_delta")]
    ThinkingDelta {
        #[serde(default)]
        thinking: String,
    },
    #[serde(rename = "signature_delta")]
    SignatureDelta {},
}

#[derive(Debug, Deserialize)]
pub struct AnthropicMessageDeltaBody {
    #[serde(default)]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicErrorBody {
    #[serde(default)]
    pub message: String,
}

// ---------------------------------------------------------------------------
// Delta decoding
// ---------------------------------------------------------------------------

/// Stateful decoder for the Anthropic streaming dialect.
///
/// The wire `index` on block events is a content-block index, not a tool
/// index; tool accumulator slots are allocated sequentially as `tool_use`
/// blocks open and wire indices are routed through a block→slot map.
/// The stop reason arrives on `message_delta` but the stream only
/// terminates at `message_stop`.
#[derive(Debug, Default)]
pub struct AnthropicDeltaDecoder {
    block_slots: FxHashMap<usize, usize>,
    next_slot: usize,
    pending_stop: Option<FinishReason>,
}

impl AnthropicDeltaDecoder {
    pub(crate) fn decode(&mut self, payload: &str, out: &mut ActionBuf) {
        let Ok(event) = serde_json::from_str::<AnthropicStreamEvent>(payload) else {
            return;
        };

        match event {
            AnthropicStreamEvent::MessageStart { message } => {
                if let Some(usage) = message.usage {
                    out.push(StreamAction::Usage(UsageUpdate {
                        input_tokens: Some(usage.input_tokens),
                        output_tokens: None,
                        cached_tokens: Some(usage.cache_read_input_tokens),
                    }));
                }
            }
            AnthropicStreamEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                AnthropicContentBlock::ToolUse { id, name } => {
                    let slot = self.next_slot;
                    self.next_slot += 1;
                    self.block_slots.insert(index, slot);
                    out.push(StreamAction::ToolCall(ToolCallFragment {
                        index: slot,
                        id: Some(id),
                        name: Some(name),
                        args: String::new(),
                    }));
                }
                AnthropicContentBlock::Text { text } => {
                    if !text.is_empty() {
                        out.push(StreamAction::Text(text));
                    }
                }
                AnthropicContentBlock::Thinking { .. } => {}
            },
            AnthropicStreamEvent::ContentBlockDelta { index, delta } => match delta {
                AnthropicDelta::TextDelta { text } => {
                    if !text.is_empty() {
                        out.push(StreamAction::Text(text));
                    }
                }
                AnthropicDelta::InputJsonDelta { partial_json } => {
                    // Shards for a block that never opened as tool_use are
                    // undeliverable; drop them like any malformed payload.
                    if let Some(slot) = self.block_slots.get(&index) {
                        out.push(StreamAction::ToolCall(ToolCallFragment {
                            index: *slot,
                            id: None,
                            name: None,
                            args: partial_json,
                        }));
                    }
                }
                AnthropicDelta::ThinkingDelta { .. } | AnthropicDelta::SignatureDelta {} => {}
            },
            AnthropicStreamEvent::ContentBlockStop { .. } | AnthropicStreamEvent::Ping {} => {}
            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                if let Some(usage) = usage {
                    out.push(StreamAction::Usage(UsageUpdate {
                        input_tokens: None,
                        output_tokens: Some(usage.output_tokens),
                        cached_tokens: None,
                    }));
                }
                if let Some(reason) = delta.stop_reason {
                    self.pending_stop = Some(anthropic_stop_reason(&reason));
                }
            }
            AnthropicStreamEvent::MessageStop {} => {
                out.push(StreamAction::Finish(
                    self.pending_stop.take().unwrap_or(FinishReason::Stop),
                ));
            }
            AnthropicStreamEvent::Error { error } => {
                out.push(StreamAction::Fail {
                    message: error.message,
                });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
