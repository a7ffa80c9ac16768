//! Daemon runtime.
//!
//! Wires the configured store into a dispatcher and feeds it from stdin:
//! - One JSON ingest record per line; a record without a payload only
//!   attaches the daemon to that notifier channel
//! - One notifier per (notifier id, channel) pair
//! - Periodic kicks for payloads appended to the shared store by others
//! - On end of input, delivery of everything still pending
//! - On a signal, graceful shutdown that only waits for in-flight sends

use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;

use crate::config::Config;
use crate::payload::NotificationPayload;
use crate::service::notifier::{Notifier, NotifierConfig};
use crate::service::sender::{shared_stdout, JsonLineSender, NotificationSender};
use crate::service::{Dispatcher, DispatcherConfig};
use crate::storage::open_store;

/// Pause between idle checks while draining after end of input.
const DRAIN_CHECK_INTERVAL: Duration = Duration::from_millis(25);

/// One line of daemon input.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRecord {
    #[serde(flatten)]
    pub notifier: NotifierConfigRecord,
    #[serde(default)]
    pub payload: Option<NotificationPayload>,
}

/// Notifier fields of an ingest record.
#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfigRecord {
    #[serde(rename = "notifier")]
    pub id: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub min_interval_ms: Option<u64>,
    #[serde(default)]
    pub max_concurrent: Option<u32>,
}

impl From<NotifierConfigRecord> for NotifierConfig {
    fn from(record: NotifierConfigRecord) -> Self {
        Self {
            id: record.id,
            channel: record.channel,
            min_interval_ms: record.min_interval_ms,
            max_concurrent: record.max_concurrent,
        }
    }
}

/// What one ingest record did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested {
    /// The payload was stored for delivery
    Queued,
    /// The notifier channel was attached without a payload
    Attached,
}

/// Counters for one ingest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Payloads stored for delivery
    pub accepted: u64,
    /// Records that only attached a channel
    pub attached: u64,
    /// Malformed records and failed appends
    pub rejected: u64,
    /// Input stopped because of a shutdown signal rather than EOF
    pub interrupted: bool,
}

/// Builds the sender for a notifier id.
pub type SenderFactory = Box<dyn Fn(&str) -> Arc<dyn NotificationSender> + Send + Sync>;

/// Turns ingest records into notifications.
pub struct Ingestor {
    dispatcher: Dispatcher,
    make_sender: SenderFactory,
    notifiers: HashMap<String, Notifier>,
}

impl Ingestor {
    pub fn new(dispatcher: Dispatcher, make_sender: SenderFactory) -> Self {
        Self {
            dispatcher,
            make_sender,
            notifiers: HashMap::new(),
        }
    }

    /// Parse one line and queue its payload, or attach its channel when the
    /// record carries no payload.
    ///
    /// The first record seen for a notifier channel fixes its configuration.
    pub async fn ingest_line(&mut self, line: &str) -> anyhow::Result<Ingested> {
        let record: IngestRecord =
            serde_json::from_str(line).context("invalid ingest record")?;
        let config = NotifierConfig::from(record.notifier);
        let list_name = config.list_name();

        if !self.notifiers.contains_key(&list_name) {
            let sender = (self.make_sender)(&config.id);
            let notifier = Notifier::new(config, sender, self.dispatcher.clone());
            tracing::info!(notifier = %notifier.uid(), channel = %list_name, "Notifier registered");
            self.notifiers.insert(list_name.clone(), notifier);
        }

        let Some(notifier) = self.notifiers.get(&list_name) else {
            anyhow::bail!("no notifier for channel {list_name}");
        };
        match record.payload {
            Some(payload) => {
                notifier
                    .try_notify(payload)
                    .await
                    .context("failed to queue notification")?;
                Ok(Ingested::Queued)
            }
            None => {
                notifier
                    .attach()
                    .await
                    .context("failed to attach channel")?;
                Ok(Ingested::Attached)
            }
        }
    }

    /// Read records until EOF or shutdown.
    pub async fn run<R>(
        &mut self,
        reader: R,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> anyhow::Result<IngestStats>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = LinesStream::new(reader.lines());
        let mut stats = IngestStats::default();

        loop {
            let line = tokio::select! {
                line = lines.next() => line,
                _ = shutdown_rx.changed() => {
                    tracing::info!("Shutdown signal received, stopping ingest");
                    stats.interrupted = true;
                    break;
                }
            };

            let Some(line) = line else {
                tracing::info!("Input closed");
                break;
            };
            let line = line.context("failed to read input")?;
            if line.trim().is_empty() {
                continue;
            }

            match self.ingest_line(&line).await {
                Ok(Ingested::Queued) => stats.accepted += 1,
                Ok(Ingested::Attached) => stats.attached += 1,
                Err(e) => {
                    stats.rejected += 1;
                    tracing::warn!(error = %format!("{e:#}"), "Skipping input line");
                }
            }
        }

        Ok(stats)
    }
}

/// Kick every known channel on a fixed period until shutdown.
pub async fn poll_shared_store(
    dispatcher: Dispatcher,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown_rx.changed() => break,
        }
        for channel_id in dispatcher.channels().await {
            if dispatcher.kick(&channel_id).await.is_err() {
                return;
            }
        }
    }
}

/// Kick known channels until every one of them is idle.
///
/// Returns false if a shutdown signal arrived first.
pub async fn drain(
    dispatcher: &Dispatcher,
    period: Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> bool {
    loop {
        let mut busy = 0usize;
        for channel_id in dispatcher.channels().await {
            match dispatcher.is_idle(&channel_id).await {
                Ok(true) => {}
                Ok(false) => {
                    busy += 1;
                    let _ = dispatcher.kick(&channel_id).await;
                }
                Err(e) => {
                    // Nothing more can be delivered from a store we cannot read
                    tracing::warn!(channel = %channel_id, error = %e, "Cannot check channel, skipping it");
                }
            }
        }
        if busy == 0 {
            return true;
        }
        tracing::trace!(busy, "Waiting for channels to drain");

        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = shutdown_rx.changed() => return false,
        }
    }
}

/// Ingest `reader` into `dispatcher`, then stop it.
///
/// End of input drains every known channel before stopping. A shutdown
/// signal stops right away, waiting only for sends already started.
pub async fn serve<R>(
    dispatcher: Dispatcher,
    make_sender: SenderFactory,
    reader: R,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<IngestStats>
where
    R: AsyncBufRead + Unpin,
{
    let stats = Ingestor::new(dispatcher.clone(), make_sender)
        .run(reader, shutdown_rx.clone())
        .await?;
    tracing::info!(
        accepted = stats.accepted,
        attached = stats.attached,
        rejected = stats.rejected,
        "Ingest finished"
    );

    if !stats.interrupted {
        tracing::info!("Delivering pending notifications");
        if !drain(&dispatcher, DRAIN_CHECK_INTERVAL, &mut shutdown_rx).await {
            tracing::info!("Shutdown signal received, abandoning drain");
        }
    }

    for channel_id in dispatcher.channels().await {
        if let Ok(pending) = dispatcher.pending(&channel_id).await {
            if pending > 0 {
                tracing::warn!(channel = %channel_id, pending, "Undelivered notifications left in store");
            }
        }
    }

    dispatcher.shutdown().await;
    tracing::info!("Dispatcher stopped");
    Ok(stats)
}

/// Run the Cadence daemon.
///
/// # Arguments
///
/// * `config` - Daemon configuration
/// * `shutdown_rx` - Receiver for shutdown signal
///
/// # Returns
///
/// Returns once stdin is exhausted and drained, or shutdown was signalled
/// and every started send has finished.
pub async fn run_server(config: Config, shutdown_rx: watch::Receiver<bool>) -> anyhow::Result<()> {
    let store = open_store(config.backend, &config.redis_url, &config.key_prefix)
        .await
        .with_context(|| format!("failed to open {} store", config.backend))?;

    let dispatcher = Dispatcher::spawn(store, DispatcherConfig::from_config(&config));

    if config.polls_shared_store() {
        tokio::spawn(poll_shared_store(
            dispatcher.clone(),
            Duration::from_millis(config.poll_interval_ms),
            shutdown_rx.clone(),
        ));
    }

    let stdout = shared_stdout();
    let make_sender: SenderFactory = Box::new(move |id: &str| -> Arc<dyn NotificationSender> {
        Arc::new(JsonLineSender::with_shared(id, Arc::clone(&stdout)))
    });

    tracing::info!(backend = %config.backend, "Reading notifications from stdin");
    let reader = tokio::io::BufReader::new(tokio::io::stdin());
    serve(dispatcher, make_sender, reader, shutdown_rx).await?;
    Ok(())
}
