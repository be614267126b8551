//! Diagnostic logging to stderr.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Filter for the given directive, falling back to [`DEFAULT_LOG_FILTER`]
/// when it is missing or does not parse.
pub fn env_filter(directive: Option<&str>) -> EnvFilter {
    directive
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Install the global subscriber. Stdout carries the answer, so logs go to stderr.
pub fn init(directive: Option<&str>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(directive))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
