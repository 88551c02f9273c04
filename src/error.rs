//! Error taxonomy for the streaming decode layer and the request path.
//!
//! Scanner failures are fatal to the stream they occur on and are never
//! retried here; retry policy belongs to the HTTP layer that produced the
//! response body. Malformed individual event payloads are not errors at
//! all: the assemblers skip them and keep going.

/// Fatal failure while pulling frames off the wire.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("transport read failed: {0}")]
    Transport(String),
    #[error("stream ended inside a partial frame")]
    TruncatedFrame,
    #[error("malformed event-stream frame: {0}")]
    InvalidFrame(String),
    #[error("invalid base64 in event payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("event payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("upstream exception event: {payload}")]
    Exception { payload: String },
}

/// Terminal error carried on the last chunk of a failed or cancelled stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("stream cancelled by caller")]
    Cancelled,
    #[error("upstream reported an error: {message}")]
    Vendor { message: String },
}

/// Failure to issue a streaming request in the first place.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider configuration error: {0}")]
    Config(String),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned status {status}: {body}")]
    Upstream { status: u16, body: String },
}
