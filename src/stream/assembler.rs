/// The per-stream decode loop.
///
/// One assembler is created per streaming request and owns the wire event
/// stream (and through it the HTTP response body) until the loop exits.
/// Decoded vendor actions update the accumulated state and become
/// normalized chunks on a bounded single-producer channel. Every exit
/// path (vendor terminal signal, cancellation, scanner failure, consumer
/// gone) releases the body and closes the channel exactly once.
use crate::cost::{Pricing, UsageTally};
use crate::error::StreamError;
use crate::protocol::{ActionBuf, DeltaDecoder, StreamAction, VendorKind};
use crate::scan::WireEvents;
use crate::stream::{FinishReason, StreamChunk, ToolCallAccumulator};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub struct StreamAssembler {
    decoder: DeltaDecoder,
    accumulator: ToolCallAccumulator,
    content: String,
    token_count: u64,
    usage: UsageTally,
    model: String,
    pricing: Option<Pricing>,
}

impl StreamAssembler {
    #[must_use]
    pub fn new(vendor: VendorKind, model: impl Into<String>, pricing: Option<Pricing>) -> Self {
        Self {
            decoder: DeltaDecoder::new(vendor),
            accumulator: ToolCallAccumulator::new(),
            content: String::new(),
            token_count: 0,
            usage: UsageTally::default(),
            model: model.into(),
            pricing,
        }
    }

    /// Run the decode loop on its own task and hand back the chunk
    /// receiver. Capacity 1: a slow consumer stalls the producer rather
    /// than buffering chunks.
    #[must_use]
    pub fn spawn(self, events: WireEvents, cancel: CancellationToken) -> mpsc::Receiver<StreamChunk> {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(self.run(events, cancel, tx));
        rx
    }

    /// Drive the loop to completion on the current task.
    pub async fn run(
        mut self,
        mut events: WireEvents,
        cancel: CancellationToken,
        tx: mpsc::Sender<StreamChunk>,
    ) {
        if let Some(terminal) = self.drive(&mut events, &cancel, &tx).await {
            crate::observability::log_stream_complete(&self.model, &terminal);
            let _ = tx.send(terminal).await;
        }
        // tx is the only sender and drops here: the channel closes once,
        // immediately after the terminal chunk, on every exit path.
    }

    /// The decode loop proper. Returns the terminal chunk to emit, or
    /// `None` when the channel should close without one (clean end of
    /// input with no vendor terminal, or the consumer went away).
    async fn drive(
        &mut self,
        events: &mut WireEvents,
        cancel: &CancellationToken,
        tx: &mpsc::Sender<StreamChunk>,
    ) -> Option<StreamChunk> {
        let mut actions = ActionBuf::new();
        loop {
            // Polled between frames only: a frame already being parsed
            // always completes first.
            if cancel.is_cancelled() {
                return Some(self.failure_chunk(FinishReason::Cancelled, StreamError::Cancelled));
            }

            let payload = match events.next().await {
                None => return None,
                Some(Err(err)) => {
                    return Some(self.failure_chunk(FinishReason::Error, StreamError::Scan(err)));
                }
                Some(Ok(payload)) => payload,
            };

            actions.clear();
            self.decoder.decode(&payload, &mut actions);

            let mut tools_updated = false;
            for action in actions.drain(..) {
                match action {
                    StreamAction::Text(delta) => {
                        self.content.push_str(&delta);
                        self.token_count += 1;
                        if tx.send(self.text_chunk(delta)).await.is_err() {
                            return None;
                        }
                    }
                    StreamAction::ToolCall(frag) => {
                        self.accumulator.merge(
                            frag.index,
                            frag.id.as_deref(),
                            frag.name.as_deref(),
                            &frag.args,
                        );
                        tools_updated = true;
                    }
                    StreamAction::Usage(update) => self.usage.record(update),
                    StreamAction::Finish(reason) => {
                        return Some(self.vendor_terminal_chunk(reason));
                    }
                    StreamAction::Fail { message } => {
                        return Some(self
                            .failure_chunk(FinishReason::Error, StreamError::Vendor { message }));
                    }
                }
            }

            if tools_updated && tx.send(self.tool_chunk()).await.is_err() {
                return None;
            }
        }
    }

    fn base_chunk(&self) -> StreamChunk {
        StreamChunk {
            content: self.content.clone(),
            tool_calls: self.accumulator.snapshot(),
            token_count: self.token_count,
            ..StreamChunk::default()
        }
    }

    fn text_chunk(&self, delta: String) -> StreamChunk {
        let mut chunk = self.base_chunk();
        chunk.delta = delta;
        chunk.delta_tokens = 1;
        chunk
    }

    fn tool_chunk(&self) -> StreamChunk {
        self.base_chunk()
    }

    fn vendor_terminal_chunk(&self, reason: FinishReason) -> StreamChunk {
        let mut chunk = self.base_chunk();
        chunk.finish_reason = Some(reason);
        if self.usage.any_reported() {
            chunk.cost_info = Some(self.usage.finalize(self.pricing.as_ref(), &self.model));
        }
        chunk
    }

    /// Terminal chunk for cancellation and failure: whatever content and
    /// tool calls accumulated so far are delivered, never discarded.
    fn failure_chunk(&self, reason: FinishReason, error: StreamError) -> StreamChunk {
        let mut chunk = self.base_chunk();
        chunk.finish_reason = Some(reason);
        chunk.error = Some(error);
        chunk
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanError;

    fn scripted(payloads: &[&str]) -> WireEvents {
        let items: Vec<Result<String, ScanError>> =
            payloads.iter().map(|p| Ok((*p).to_string())).collect();
        Box::pin(futures_util::stream::iter(items))
    }

    async fn collect(mut rx: mpsc::Receiver<StreamChunk>) -> Vec<StreamChunk> {
        let mut chunks = Vec::new();
        while let Some(chunk) = rx.recv().await {
            chunks.push(chunk);
        }
        chunks
    }

    fn pricing() -> Pricing {
        Pricing {
            input_cost_per_1k: 0.01,
            output_cost_per_1k: 0.01,
            cached_cost_per_1k: None,
        }
    }

    #[tokio::test]
    async fn openai_text_stream_accumulates_and_finalizes() {
        let events = scripted(&[
            r#"{"choices":[{"delta":{"content":"Hello"}}]}"#,
            r#"{"choices":[{"delta":{"content":" world"}}]}"#,
            r#"{"choices":[{"delta":{},"finish_reason":"stop"}],"usage":{"prompt_tokens":9,"completion_tokens":2}}"#,
        ]);
        let assembler = StreamAssembler::new(VendorKind::OpenAi, "gpt-4o", Some(pricing()));
        let chunks = collect(assembler.spawn(events, CancellationToken::new())).await;

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].delta, "Hello");
        assert_eq!(chunks[0].content, "Hello");
        assert_eq!(chunks[1].delta, " world");
        assert_eq!(chunks[1].content, "Hello world");
        assert_eq!(chunks[1].token_count, 2);

        let terminal = &chunks[2];
        assert_eq!(terminal.finish_reason, Some(FinishReason::Stop));
        assert_eq!(terminal.content, "Hello world");
        let cost = terminal.cost_info.as_ref().unwrap();
        assert_eq!(cost.input_tokens, 9);
        assert_eq!(cost.output_tokens, 2);
        // Exactly one terminal chunk, and nothing after it.
        assert_eq!(chunks.iter().filter(|c| c.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn openai_tool_call_fragments_assemble_across_frames() {
        let events = scripted(&[
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"lookup","arguments":"{\"a\":"}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"1,\"b\":"}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"2}"}}]}}]}"#,
            r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
            "[DONE]",
        ]);
        let assembler = StreamAssembler::new(VendorKind::OpenAi, "gpt-4o", Some(pricing()));
        let chunks = collect(assembler.spawn(events, CancellationToken::new())).await;

        let terminal = chunks.last().unwrap();
        assert_eq!(terminal.finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(terminal.tool_calls.len(), 1);
        assert_eq!(terminal.tool_calls[0].id, "call_1");
        assert_eq!(terminal.tool_calls[0].name, "lookup");
        assert_eq!(terminal.tool_calls[0].args, r#"{"a":1,"b":2}"#);
        let parsed: serde_json::Value = serde_json::from_str(&terminal.tool_calls[0].args).unwrap();
        assert_eq!(parsed["a"], 1);
        // No usage was reported anywhere, so no cost either.
        assert!(terminal.cost_info.is_none());
    }

    #[tokio::test]
    async fn anthropic_stream_with_tools_and_usage() {
        let events = scripted(&[
            r#"{"type":"message_start","message":{"usage":{"input_tokens":15}}}"#,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Let me search"}}"#,
            r#"{"type":"content_block_stop","index":0}"#,
            r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_1","name":"search"}}"#,
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"q\":"}}"#,
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"\"test\"}"}}"#,
            r#"{"type":"content_block_stop","index":1}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":10}}"#,
            r#"{"type":"message_stop"}"#,
        ]);
        let assembler = StreamAssembler::new(VendorKind::Anthropic, "claude-x", Some(pricing()));
        let chunks = collect(assembler.spawn(events, CancellationToken::new())).await;

        let terminal = chunks.last().unwrap();
        assert_eq!(terminal.finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(terminal.content, "Let me search");
        assert_eq!(terminal.tool_calls.len(), 1);
        assert_eq!(terminal.tool_calls[0].name, "search");
        assert_eq!(terminal.tool_calls[0].args, r#"{"q":"test"}"#);

        let cost = terminal.cost_info.as_ref().unwrap();
        assert_eq!(cost.input_tokens, 15);
        assert_eq!(cost.output_tokens, 10);
    }

    #[tokio::test]
    async fn cancellation_after_second_frame_stops_processing() {
        let frames: Vec<String> = (1..=5)
            .map(|i| format!(r#"{{"choices":[{{"delta":{{"content":"{i}"}}}}]}}"#))
            .collect();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        // The token fires while frame 2 is being delivered; the frame in
        // flight still completes before the cancellation poll sees it.
        let events: WireEvents = Box::pin(futures_util::stream::unfold(
            (frames.into_iter(), trigger, 0usize),
            |(mut frames, trigger, mut delivered)| async move {
                let frame = frames.next()?;
                delivered += 1;
                if delivered == 2 {
                    trigger.cancel();
                }
                Some((Ok(frame), (frames, trigger, delivered)))
            },
        ));

        let assembler = StreamAssembler::new(VendorKind::OpenAi, "gpt-4o", None);
        let chunks = collect(assembler.spawn(events, cancel)).await;

        // Frames 1 and 2 produced chunks; frames 3..5 were never processed.
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].delta, "1");
        assert_eq!(chunks[1].delta, "2");
        let terminal = &chunks[2];
        assert_eq!(terminal.finish_reason, Some(FinishReason::Cancelled));
        assert_eq!(terminal.content, "12");
        assert!(matches!(terminal.error, Some(StreamError::Cancelled)));
    }

    #[tokio::test]
    async fn malformed_payload_between_valid_ones_is_skipped() {
        let events = scripted(&[
            r#"{"choices":[{"delta":{"content":"a"}}]}"#,
            "this is not json",
            r#"{"choices":[{"delta":{"content":"b"}}]}"#,
        ]);
        let assembler = StreamAssembler::new(VendorKind::OpenAi, "gpt-4o", None);
        let chunks = collect(assembler.spawn(events, CancellationToken::new())).await;

        // Both well-formed events delivered in order; the bad frame
        // produced no chunk and no error. No vendor terminal arrived, so
        // the channel just closed.
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].delta, "a");
        assert_eq!(chunks[1].delta, "b");
        assert!(chunks.iter().all(|c| !c.is_terminal()));
    }

    #[tokio::test]
    async fn scanner_failure_preserves_partial_content() {
        let events: WireEvents = Box::pin(futures_util::stream::iter(vec![
            Ok(r#"{"choices":[{"delta":{"content":"partial"}}]}"#.to_string()),
            Err(ScanError::Transport("connection reset".to_string())),
        ]));
        let assembler = StreamAssembler::new(VendorKind::OpenAi, "gpt-4o", None);
        let chunks = collect(assembler.spawn(events, CancellationToken::new())).await;

        assert_eq!(chunks.len(), 2);
        let terminal = &chunks[1];
        assert_eq!(terminal.finish_reason, Some(FinishReason::Error));
        assert_eq!(terminal.content, "partial");
        assert!(matches!(
            terminal.error,
            Some(StreamError::Scan(ScanError::Transport(_)))
        ));
    }

    #[tokio::test]
    async fn anthropic_error_event_terminates_with_vendor_error() {
        let events = scripted(&[
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"hi"}}"#,
            r#"{"type":"error","error":{"type":"overloaded_error","message":"overloaded"}}"#,
        ]);
        let assembler = StreamAssembler::new(VendorKind::Anthropic, "claude-x", None);
        let chunks = collect(assembler.spawn(events, CancellationToken::new())).await;

        let terminal = chunks.last().unwrap();
        assert_eq!(terminal.finish_reason, Some(FinishReason::Error));
        assert_eq!(terminal.content, "hi");
        match &terminal.error {
            Some(StreamError::Vendor { message }) => assert_eq!(message, "overloaded"),
            other => panic!("expected vendor error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn gemini_stream_terminates_on_finish_reason() {
        let events = scripted(&[
            r#"{"candidates":[{"content":{"parts":[{"text":"Image "}]}}]}"#,
            r#"{"candidates":[{"content":{"parts":[{"text":"analysis"}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":12,"candidatesTokenCount":3}}"#,
        ]);
        let assembler = StreamAssembler::new(VendorKind::Gemini, "gemini-pro", Some(pricing()));
        let chunks = collect(assembler.spawn(events, CancellationToken::new())).await;

        let terminal = chunks.last().unwrap();
        assert_eq!(terminal.finish_reason, Some(FinishReason::Stop));
        assert_eq!(terminal.content, "Image analysis");
        assert_eq!(terminal.cost_info.as_ref().unwrap().input_tokens, 12);
    }

    #[tokio::test]
    async fn nothing_is_emitted_after_the_terminal_chunk() {
        // Frames after the vendor terminal must never surface.
        let events = scripted(&[
            r#"{"choices":[{"delta":{"content":"x"}}]}"#,
            "[DONE]",
            r#"{"choices":[{"delta":{"content":"ghost"}}]}"#,
        ]);
        let assembler = StreamAssembler::new(VendorKind::OpenAi, "gpt-4o", None);
        let chunks = collect(assembler.spawn(events, CancellationToken::new())).await;

        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].is_terminal());
        assert_eq!(chunks[1].content, "x");
    }
}
