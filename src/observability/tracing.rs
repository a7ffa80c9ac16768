//! Tracing setup.
//!
//! Configures structured logging with:
//! - `EnvFilter` driven by the configured level or `RUST_LOG`
//! - Human-readable or JSON-lines output

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing.
///
/// Logs go to stderr so that stdout stays free for delivered payloads.
///
/// # Arguments
///
/// * `log_level` - Filter directive, e.g. `info` or `info,cadence=debug`
/// * `json` - Emit JSON lines instead of text
///
/// # Panics
///
/// Panics if tracing has already been initialized.
pub fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| EnvFilter::new("info,cadence=debug"));

    let registry = tracing_subscriber::registry().with(filter);

    if json {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(false);
        registry.with(fmt_layer).init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);
        registry.with(fmt_layer).init();
    }

    tracing::info!(level = log_level, json, "Tracing initialized");
}

/// Initialize tracing for tests (only logs errors).
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("error")
        .with_test_writer()
        .try_init();
}
