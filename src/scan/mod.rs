pub mod eventstream;
pub mod sse;

pub use eventstream::binary_event_stream;
pub use sse::line_event_stream;

use crate::error::ScanError;
use futures_util::Stream;
use std::pin::Pin;

/// The normalized output of a wire scanner: an ordered sequence of decoded
/// event payloads.
///
/// `Ok(payload)` is one event. The sequence ending is a clean end-of-input.
/// An `Err` item is always the last item and marks a fatal transport or
/// framing failure; the payloads yielded before it remain valid.
pub type WireEvents = Pin<Box<dyn Stream<Item = Result<String, ScanError>> + Send>>;
