//! Configuration parsing for the Cadence daemon.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides
//! - Sensible defaults for quick start

use clap::Parser;

use crate::storage::{QueueBackend, DEFAULT_KEY_PREFIX};

/// Cadence: a rate-limited notification dispatch queue.
#[derive(Parser, Debug, Clone)]
#[command(name = "cadence")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines instead of human-readable text
    #[arg(long, env = "CADENCE_LOG_JSON", default_value_t = false)]
    pub log_json: bool,

    /// Where pending notifications are kept (memory, redis)
    #[arg(long, env = "CADENCE_BACKEND", value_enum, default_value_t = QueueBackend::Memory)]
    pub backend: QueueBackend,

    /// Redis connection URL for the shared backend
    #[arg(long, env = "CADENCE_REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// Prefix of the per-channel Redis list keys
    #[arg(long, env = "CADENCE_KEY_PREFIX", default_value = DEFAULT_KEY_PREFIX)]
    pub key_prefix: String,

    /// Size of the scheduler event channel
    #[arg(long, env = "CADENCE_EVENT_CHANNEL_SIZE", default_value_t = 1024)]
    pub event_channel_size: usize,

    /// Delivery reports buffered per subscriber
    #[arg(long, env = "CADENCE_REPORT_CAPACITY", default_value_t = 1024)]
    pub report_capacity: usize,

    /// How often known channels are re-checked for payloads appended by
    /// other processes, in milliseconds (0 disables)
    #[arg(long, env = "CADENCE_POLL_INTERVAL_MS", default_value_t = 1000)]
    pub poll_interval_ms: u64,

    /// OpenTelemetry collector endpoint for metrics export (optional)
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otel_endpoint: Option<String>,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Whether the daemon should periodically kick known channels.
    ///
    /// Only the shared backend can receive payloads behind our back.
    pub fn polls_shared_store(&self) -> bool {
        self.backend == QueueBackend::Redis && self.poll_interval_ms > 0
    }

    /// Create a default configuration for testing.
    #[cfg(test)]
    pub fn test_config() -> Self {
        Self {
            log_level: "debug".into(),
            event_channel_size: 16,
            report_capacity: 16,
            poll_interval_ms: 0,
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_json: false,
            backend: QueueBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".into(),
            key_prefix: DEFAULT_KEY_PREFIX.into(),
            event_channel_size: 1024,
            report_capacity: 1024,
            poll_interval_ms: 1000,
            otel_endpoint: None,
        }
    }
}
