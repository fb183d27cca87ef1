//! Logging configuration
//!
//! Initializes tracing for the binary. Library code only emits events.

use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding a filter that overrides `RUST_LOG`
pub const LOG_ENV: &str = "ENVPIPE_LOG";

/// Filter from `ENVPIPE_LOG`, then `RUST_LOG`, then `level`
#[must_use]
pub fn log_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initializes logging with the specified level
///
/// Output goes to stderr so reports on stdout stay machine readable.
pub fn init_logging(level: &str) {
    fmt()
        .with_env_filter(log_filter(level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();
}
