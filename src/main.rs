//! Cadence: a rate-limited notification dispatch queue.
//!
//! # Usage
//!
//! ```bash
//! producer | cadence --backend redis --redis-url redis://127.0.0.1:6379 > delivered.jsonl
//! ```
//!
//! Each input line is one notification:
//!
//! ```json
//! {"notifier":"ops","channel":"mail","min_interval_ms":500,"max_concurrent":2,"payload":{"to":"oncall"}}
//! ```
//!
//! Environment variables can also be used:
//! - `CADENCE_BACKEND`: Pending store (memory, redis)
//! - `CADENCE_REDIS_URL`: Redis connection URL
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

use cadence::config::Config;
use cadence::observability::metrics::init_metrics_with_endpoint;
use cadence::observability::tracing::init_tracing;
use cadence::server::run_server;
use tokio::sync::watch;

/// Print startup banner with version and configuration.
fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");
    let poll = if config.polls_shared_store() {
        format!("every {}ms", config.poll_interval_ms)
    } else {
        "off".to_string()
    };
    eprintln!(
        r#"
  Cadence v{}
  Rate-limited notification dispatch

  Configuration:
    Backend:     {}
    Key Prefix:  {}
    Store Poll:  {}
    Log Level:   {}

  Close stdin or press Ctrl+C to shutdown gracefully.
"#,
        version, config.backend, config.key_prefix, poll, config.log_level
    );
}

/// Resolve once SIGINT or SIGTERM arrives.
async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {
                        tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown...");
                    }
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM, initiating shutdown...");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler, using Ctrl+C only");
                wait_for_ctrl_c(ctrl_c).await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        wait_for_ctrl_c(ctrl_c).await;
    }
}

async fn wait_for_ctrl_c(ctrl_c: impl std::future::Future<Output = std::io::Result<()>>) {
    match ctrl_c.await {
        Ok(()) => tracing::info!("Received Ctrl+C, initiating shutdown..."),
        Err(e) => {
            // Without a handler only closing stdin stops the daemon
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse_args();

    init_tracing(&config.log_level, config.log_json);

    // Metrics (with optional OTLP export)
    init_metrics_with_endpoint(config.otel_endpoint.as_deref());

    print_banner(&config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = signal_tx.send(true);
    });

    run_server(config, shutdown_rx).await?;

    tracing::info!("Cadence shutdown complete");

    // A stdin read still parked on the blocking pool would keep the runtime
    // from dropping
    std::process::exit(0);
}
