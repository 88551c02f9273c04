/// Line-oriented SSE-style event scanner.
///
/// Vendors on this transport emit one JSON payload per `data: ` line.
/// Only lines carrying the literal `"data: "` prefix yield events; blank
/// lines and every other field line are skipped. Each `data: ` line is its
/// own event; consecutive `data: ` lines are NOT coalesced into one
/// multi-line event the way the SSE specification allows, because observed
/// vendor payloads are single-line JSON and the accumulation layer depends
/// on one-payload-per-event.
///
/// The literal payload `[DONE]` is an ordinary event; terminal-sentinel
/// detection belongs to the stream assembler, not the scanner.
use crate::error::ScanError;
use crate::scan::WireEvents;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use memchr::memchr;
use std::collections::VecDeque;

const DATA_PREFIX: &str = "data: ";

/// Incremental `data: `-line scanner.
///
/// Feed it text chunks arriving on arbitrary boundaries; complete event
/// payloads are appended to the caller's queue with the prefix stripped and
/// trailing whitespace preserved exactly.
pub struct LineEventScanner {
    buffer: String,
}

impl LineEventScanner {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    /// Feed a text chunk and append any completed event payloads to `out`.
    pub fn feed_into(&mut self, chunk: &str, out: &mut VecDeque<String>) {
        self.buffer.push_str(chunk);
        let mut start = 0usize;
        while let Some(rel) = memchr(b'\n', &self.buffer.as_bytes()[start..]) {
            let end = start + rel;
            let mut line = &self.buffer[start..end];
            // One trailing \r is a line-ending artifact, not payload.
            if let Some(stripped) = line.strip_suffix('\r') {
                line = stripped;
            }
            if let Some(payload) = line.strip_prefix(DATA_PREFIX) {
                out.push_back(payload.to_string());
            }
            start = end + 1;
        }
        if start > 0 {
            self.buffer.drain(..start);
        }
    }

    /// Flush a trailing line that never received its `\n` at end-of-input.
    pub fn finish_into(&mut self, out: &mut VecDeque<String>) {
        if self.buffer.is_empty() {
            return;
        }
        let mut line = self.buffer.as_str();
        if let Some(stripped) = line.strip_suffix('\r') {
            line = stripped;
        }
        if let Some(payload) = line.strip_prefix(DATA_PREFIX) {
            out.push_back(payload.to_string());
        }
        self.buffer.clear();
    }
}

impl Default for LineEventScanner {
    fn default() -> Self {
        Self::new()
    }
}

struct LineStreamState<S> {
    source: std::pin::Pin<Box<S>>,
    scanner: LineEventScanner,
    remainder: Vec<u8>,
    pending: VecDeque<String>,
    finished: bool,
}

/// Split an HTTP response body stream into `data: ` event payloads.
///
/// Bytes are decoded as UTF-8 with partial sequences carried across chunk
/// boundaries. A read failure or hard-invalid UTF-8 ends the stream with a
/// fatal [`ScanError`].
pub fn line_event_stream<S, E>(byte_stream: S) -> WireEvents
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = LineStreamState {
        source: Box::pin(byte_stream),
        scanner: LineEventScanner::new(),
        remainder: Vec::new(),
        pending: VecDeque::with_capacity(8),
        finished: false,
    };

    Box::pin(futures_util::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(event) = st.pending.pop_front() {
                return Some((Ok(event), st));
            }
            if st.finished {
                return None;
            }

            match st.source.as_mut().next().await {
                None => {
                    st.finished = true;
                    if !st.remainder.is_empty() {
                        return Some((
                            Err(ScanError::Transport(
                                "response body ended inside a UTF-8 sequence".to_string(),
                            )),
                            st,
                        ));
                    }
                    st.scanner.finish_into(&mut st.pending);
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(ScanError::Transport(e.to_string())), st));
                }
                Some(Ok(bytes)) => {
                    if let Err(err) = feed_bytes(
                        &mut st.scanner,
                        &mut st.remainder,
                        &bytes,
                        &mut st.pending,
                    ) {
                        st.finished = true;
                        return Some((Err(err), st));
                    }
                }
            }
        }
    }))
}

/// Decode `chunk` as UTF-8, carrying incomplete trailing sequences in
/// `remainder`, and feed the decoded text to the scanner.
fn feed_bytes(
    scanner: &mut LineEventScanner,
    remainder: &mut Vec<u8>,
    chunk: &[u8],
    out: &mut VecDeque<String>,
) -> Result<(), ScanError> {
    remainder.extend_from_slice(chunk);
    match std::str::from_utf8(remainder) {
        Ok(text) => {
            scanner.feed_into(text, out);
            remainder.clear();
        }
        Err(e) => {
            if e.error_len().is_some() {
                return Err(ScanError::Transport(
                    "invalid UTF-8 in response body".to_string(),
                ));
            }
            let valid = e.valid_up_to();
            if let Ok(text) = std::str::from_utf8(&remainder[..valid]) {
                scanner.feed_into(text, out);
            }
            remainder.drain(..valid);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
