/// Binary event-stream frame scanner.
///
/// One vendor transport delivers its streaming events in AWS-style binary
/// event-stream framing: a 12-byte prelude (total length, header-block
/// length, prelude CRC32), a header block of typed key/value pairs, a
/// payload, and a trailing CRC32 over the whole message. The payload is a
/// JSON wrapper `{"bytes": "<base64>"}` whose decoded bytes are the
/// vendor-native streaming event JSON.
///
/// Frames whose `:event-type` or `:message-type` header is `"exception"`
/// are fatal and terminate the scan with the raw payload preserved.
/// Frames with no `bytes` content and frames whose outer wrapper is not
/// JSON carry nothing and are skipped.
use crate::error::ScanError;
use crate::scan::WireEvents;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use std::collections::VecDeque;

const PRELUDE_LEN: usize = 12;
// Prelude plus the trailing message CRC: the smallest legal frame.
const MIN_FRAME_LEN: usize = 16;

const HEADER_EVENT_TYPE: &str = ":event-type";
const HEADER_MESSAGE_TYPE: &str = ":message-type";
const EXCEPTION_TYPE: &str = "exception";

/// Outer payload wrapper carried by content frames.
#[derive(Debug, Deserialize)]
struct FrameBody {
    #[serde(default)]
    bytes: Option<String>,
}

/// One fully decoded frame.
enum DecodedFrame {
    /// The unwrapped inner event JSON.
    Event(String),
    /// A frame carrying no content.
    Empty,
}

/// Incremental decoder for length-prefixed binary event-stream frames.
pub struct BinaryFrameScanner {
    buffer: BytesMut,
}

impl BinaryFrameScanner {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    pub fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Decode the next complete frame out of the buffer.
    ///
    /// Returns `Ok(None)` when more bytes are needed. Errors are fatal:
    /// the caller must not continue scanning after one.
    fn try_next(&mut self) -> Result<Option<DecodedFrame>, ScanError> {
        if self.buffer.len() < PRELUDE_LEN {
            return Ok(None);
        }

        let total_len = read_u32(&self.buffer[0..4]) as usize;
        if total_len < MIN_FRAME_LEN {
            return Err(ScanError::InvalidFrame(format!(
                "declared frame length {total_len} below minimum {MIN_FRAME_LEN}"
            )));
        }
        if self.buffer.len() < total_len {
            return Ok(None);
        }

        let headers_len = read_u32(&self.buffer[4..8]) as usize;
        let prelude_crc = read_u32(&self.buffer[8..12]);
        if crc32fast::hash(&self.buffer[0..8]) != prelude_crc {
            return Err(ScanError::InvalidFrame(
                "prelude checksum mismatch".to_string(),
            ));
        }
        if PRELUDE_LEN + headers_len + 4 > total_len {
            return Err(ScanError::InvalidFrame(
                "header block overruns frame".to_string(),
            ));
        }
        let message_crc = read_u32(&self.buffer[total_len - 4..total_len]);
        if crc32fast::hash(&self.buffer[..total_len - 4]) != message_crc {
            return Err(ScanError::InvalidFrame(
                "message checksum mismatch".to_string(),
            ));
        }

        let frame = self.buffer.split_to(total_len);
        let headers = parse_headers(&frame[PRELUDE_LEN..PRELUDE_LEN + headers_len])?;
        let payload = &frame[PRELUDE_LEN + headers_len..total_len - 4];

        let is_exception = headers.iter().any(|(name, value)| {
            (name == HEADER_EVENT_TYPE || name == HEADER_MESSAGE_TYPE) && value == EXCEPTION_TYPE
        });
        if is_exception {
            return Err(ScanError::Exception {
                payload: String::from_utf8_lossy(payload).into_owned(),
            });
        }

        let Ok(body) = serde_json::from_slice::<FrameBody>(payload) else {
            // Malformed outer wrapper carries nothing usable.
            return Ok(Some(DecodedFrame::Empty));
        };
        match body.bytes {
            None => Ok(Some(DecodedFrame::Empty)),
            Some(encoded) if encoded.is_empty() => Ok(Some(DecodedFrame::Empty)),
            Some(encoded) => {
                let decoded = BASE64.decode(encoded)?;
                let text = String::from_utf8(decoded)?;
                Ok(Some(DecodedFrame::Event(text)))
            }
        }
    }

    /// Verify end-of-input state: leftover bytes mean a truncated frame.
    fn finish(&self) -> Result<(), ScanError> {
        if self.buffer.is_empty() {
            Ok(())
        } else {
            Err(ScanError::TruncatedFrame)
        }
    }
}

impl Default for BinaryFrameScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Walk the header block, returning the string-typed key/value pairs.
///
/// Non-string value types are skipped by their encoded size; an
/// unrecognized value type makes the frame undecodable.
fn parse_headers(mut block: &[u8]) -> Result<Vec<(String, String)>, ScanError> {
    let mut headers = Vec::new();
    while !block.is_empty() {
        let name_len = block[0] as usize;
        if block.len() < 1 + name_len + 1 {
            return Err(ScanError::InvalidFrame(
                "header block ends inside a header name".to_string(),
            ));
        }
        let name = std::str::from_utf8(&block[1..1 + name_len])
            .map_err(|_| ScanError::InvalidFrame("header name is not UTF-8".to_string()))?
            .to_string();
        let value_type = block[1 + name_len];
        block = &block[1 + name_len + 1..];

        let value_len = match value_type {
            // bool true / bool false carry no value bytes
            0 | 1 => 0,
            2 => 1,
            3 => 2,
            4 => 4,
            5 | 8 => 8,
            9 => 16,
            // byte array / string: u16-BE length prefix
            6 | 7 => {
                if block.len() < 2 {
                    return Err(ScanError::InvalidFrame(
                        "header block ends inside a value length".to_string(),
                    ));
                }
                let len = u16::from_be_bytes([block[0], block[1]]) as usize;
                block = &block[2..];
                len
            }
            other => {
                return Err(ScanError::InvalidFrame(format!(
                    "unknown header value type {other}"
                )));
            }
        };
        if block.len() < value_len {
            return Err(ScanError::InvalidFrame(
                "header block ends inside a value".to_string(),
            ));
        }
        if value_type == 7 {
            if let Ok(value) = std::str::from_utf8(&block[..value_len]) {
                headers.push((name, value.to_string()));
            }
        }
        block = &block[value_len..];
    }
    Ok(headers)
}

struct BinaryStreamState<S> {
    source: std::pin::Pin<Box<S>>,
    scanner: BinaryFrameScanner,
    pending: VecDeque<String>,
    pending_err: Option<ScanError>,
    finished: bool,
}

/// Split an HTTP response body stream into unwrapped event-stream payloads.
///
/// Events decoded before a fatal frame are still delivered, in order,
/// ahead of the error.
pub fn binary_event_stream<S, E>(byte_stream: S) -> WireEvents
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = BinaryStreamState {
        source: Box::pin(byte_stream),
        scanner: BinaryFrameScanner::new(),
        pending: VecDeque::with_capacity(8),
        pending_err: None,
        finished: false,
    };

    Box::pin(futures_util::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(event) = st.pending.pop_front() {
                return Some((Ok(event), st));
            }
            if let Some(err) = st.pending_err.take() {
                st.finished = true;
                return Some((Err(err), st));
            }
            if st.finished {
                return None;
            }

            match st.source.as_mut().next().await {
                None => {
                    st.finished = true;
                    if let Err(err) = st.scanner.finish() {
                        return Some((Err(err), st));
                    }
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(ScanError::Transport(e.to_string())), st));
                }
                Some(Ok(bytes)) => {
                    st.scanner.feed(&bytes);
                    loop {
                        match st.scanner.try_next() {
                            Ok(Some(DecodedFrame::Event(event))) => st.pending.push_back(event),
                            Ok(Some(DecodedFrame::Empty)) => {}
                            Ok(None) => break,
                            Err(err) => {
                                st.pending_err = Some(err);
                                break;
                            }
                        }
                    }
                }
            }
        }
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    /// Encode one binary event-stream frame with string-typed headers.
    fn encode_frame(headers: &[(&str, &str)], payload: &[u8]) -> Vec<u8> {
        let mut header_block = Vec::new();
        for (name, value) in headers {
            header_block.push(name.len() as u8);
            header_block.extend_from_slice(name.as_bytes());
            header_block.push(7u8);
            header_block.extend_from_slice(&(value.len() as u16).to_be_bytes());
            header_block.extend_from_slice(value.as_bytes());
        }

        let total_len = PRELUDE_LEN + header_block.len() + payload.len() + 4;
        let mut frame = Vec::with_capacity(total_len);
        frame.extend_from_slice(&(total_len as u32).to_be_bytes());
        frame.extend_from_slice(&(header_block.len() as u32).to_be_bytes());
        frame.extend_from_slice(&crc32fast::hash(&frame).to_be_bytes());
        frame.extend_from_slice(&header_block);
        frame.extend_from_slice(payload);
        frame.extend_from_slice(&crc32fast::hash(&frame).to_be_bytes());
        frame
    }

    /// Encode a content frame wrapping `event_json` the way the vendor does.
    fn encode_event(event_json: &str) -> Vec<u8> {
        let payload = format!("{{\"bytes\":\"{}\"}}", BASE64.encode(event_json));
        encode_frame(
            &[
                (":event-type", "chunk"),
                (":content-type", "application/json"),
                (":message-type", "event"),
            ],
            payload.as_bytes(),
        )
    }

    async fn collect(body: Vec<u8>) -> Vec<Result<String, ScanError>> {
        let source = futures_util::stream::iter(vec![Ok::<Bytes, std::convert::Infallible>(
            Bytes::from(body),
        )]);
        binary_event_stream(source).collect().await
    }

    #[tokio::test]
    async fn round_trips_events_in_order() {
        let events = [
            r#"{"type":"message_start"}"#,
            r#"{"type":"content_block_delta","delta":{"text":"hi"}}"#,
            r#"{"type":"message_stop"}"#,
        ];
        let mut body = Vec::new();
        for event in &events {
            body.extend_from_slice(&encode_event(event));
        }

        let decoded = collect(body).await;
        let payloads: Vec<String> = decoded.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(payloads, events);
    }

    #[tokio::test]
    async fn exception_frame_is_fatal_with_payload_preserved() {
        let mut body = encode_event(r#"{"type":"message_start"}"#);
        body.extend_from_slice(&encode_frame(
            &[(":message-type", "exception")],
            br#"{"message":"model overloaded"}"#,
        ));
        // Anything after the exception frame is never read.
        body.extend_from_slice(&encode_event(r#"{"type":"message_stop"}"#));

        let decoded = collect(body).await;
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].as_deref().unwrap(), r#"{"type":"message_start"}"#);
        match &decoded[1] {
            Err(ScanError::Exception { payload }) => {
                assert!(payload.contains("model overloaded"));
            }
            other => panic!("expected exception error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_bytes_frame_is_skipped_transparently() {
        let mut body = encode_frame(&[(":event-type", "chunk")], br#"{"bytes":""}"#);
        body.extend_from_slice(&encode_event(r#"{"type":"ping"}"#));

        let decoded = collect(body).await;
        let payloads: Vec<String> = decoded.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(payloads, vec![r#"{"type":"ping"}"#]);
    }

    #[tokio::test]
    async fn non_json_payload_is_skipped() {
        let mut body = encode_frame(&[(":event-type", "chunk")], b"not json at all");
        body.extend_from_slice(&encode_event(r#"{"type":"ping"}"#));

        let decoded = collect(body).await;
        let payloads: Vec<String> = decoded.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(payloads, vec![r#"{"type":"ping"}"#]);
    }

    #[tokio::test]
    async fn invalid_base64_is_fatal() {
        let body = encode_frame(&[(":event-type", "chunk")], br#"{"bytes":"%%%%"}"#);
        let decoded = collect(body).await;
        assert_eq!(decoded.len(), 1);
        assert!(matches!(decoded[0], Err(ScanError::InvalidBase64(_))));
    }

    #[tokio::test]
    async fn truncated_frame_is_fatal() {
        let mut body = encode_event(r#"{"type":"message_start"}"#);
        let full = encode_event(r#"{"type":"message_stop"}"#);
        body.extend_from_slice(&full[..full.len() / 2]);

        let decoded = collect(body).await;
        assert_eq!(decoded.len(), 2);
        assert!(decoded[0].is_ok());
        assert!(matches!(decoded[1], Err(ScanError::TruncatedFrame)));
    }

    #[tokio::test]
    async fn corrupted_checksum_is_fatal() {
        let mut body = encode_event(r#"{"type":"message_start"}"#);
        let last = body.len() - 1;
        body[last] ^= 0xff;

        let decoded = collect(body).await;
        assert_eq!(decoded.len(), 1);
        assert!(matches!(decoded[0], Err(ScanError::InvalidFrame(_))));
    }

    #[tokio::test]
    async fn frames_reassemble_across_chunk_boundaries() {
        let body = encode_event(r#"{"type":"content_block_delta"}"#);
        let split = body.len() / 2;
        let source = futures_util::stream::iter(vec![
            Ok::<Bytes, std::convert::Infallible>(Bytes::from(body[..split].to_vec())),
            Ok(Bytes::from(body[split..].to_vec())),
        ]);

        let decoded: Vec<_> = binary_event_stream(source).collect().await;
        let payloads: Vec<String> = decoded.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(payloads, vec![r#"{"type":"content_block_delta"}"#]);
    }

    #[tokio::test]
    async fn empty_input_ends_cleanly() {
        let decoded = collect(Vec::new()).await;
        assert!(decoded.is_empty());
    }
}
