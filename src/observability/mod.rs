use crate::stream::StreamChunk;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
pub fn init_tracing(log_level: &str) {
    let level = log_level.to_uppercase();

    if level == "DISABLED" {
        return;
    }

    let tracing_level = match level.as_str() {
        "WARNING" => "WARN",
        "CRITICAL" => "ERROR",
        other => other,
    };

    let filter = EnvFilter::try_new(tracing_level).unwrap_or_else(|_| EnvFilter::new("INFO"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Log the terminal state of a stream: finish reason, token estimate and
/// cost when usage was reported.
pub(crate) fn log_stream_complete(model: &str, terminal: &StreamChunk) {
    let finish_reason = terminal
        .finish_reason
        .map_or("none", |reason| reason.as_str());
    match terminal.cost_info.as_ref() {
        Some(cost) => info!(
            model,
            finish_reason,
            token_estimate = terminal.token_count,
            input_tokens = cost.input_tokens,
            output_tokens = cost.output_tokens,
            cached_tokens = cost.cached_tokens,
            total_cost_usd = cost.total_cost_usd,
            "stream complete"
        ),
        None => info!(
            model,
            finish_reason,
            token_estimate = terminal.token_count,
            "stream complete"
        ),
    }
}
