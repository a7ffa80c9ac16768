//! Dispatch service for Cadence.
//!
//! [`Dispatcher`] is the cloneable handle callers enqueue through. It owns
//! the event channel into the scheduler task, the pending store, and the
//! tracker for in-flight sends.

pub mod notifier;
mod scheduler;
pub mod sender;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::task::TaskTracker;

use crate::config::Config;
use crate::flow::notify::{DeliveryBus, DeliveryReport};
use crate::flow::throttle::{ChannelDefaults, ChannelThrottleState};
use crate::observability::metrics::{record_enqueued, record_store_error};
use crate::payload::NotificationPayload;
use crate::storage::{PendingStore, QueueBackend, StoreError};
use scheduler::{Scheduler, SchedulerEvent};
use sender::NotificationSender;

/// Error type for enqueue operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Failed to store notification: {0}")]
    Store(#[from] StoreError),

    #[error("Dispatcher is shut down")]
    Closed,
}

/// Sizing for the scheduler's channels.
#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    /// Capacity of the scheduler event channel
    pub event_channel_size: usize,
    /// Delivery reports buffered per bus receiver
    pub report_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            event_channel_size: 1024,
            report_capacity: 1024,
        }
    }
}

impl DispatcherConfig {
    /// Create a DispatcherConfig from application config values.
    pub fn from_config(config: &Config) -> Self {
        Self {
            event_channel_size: config.event_channel_size,
            report_capacity: config.report_capacity,
        }
    }
}

/// Handle to a running dispatch scheduler.
///
/// Cheap to clone. The scheduler stops on [`Dispatcher::shutdown`] or once
/// every handle has been dropped.
#[derive(Clone)]
pub struct Dispatcher {
    events: mpsc::Sender<SchedulerEvent>,
    store: Arc<dyn PendingStore>,
    tracker: TaskTracker,
    bus: DeliveryBus,
    accepting: Arc<AtomicBool>,
}

impl Dispatcher {
    /// Start a scheduler task over `store`. Must be called inside a tokio runtime.
    pub fn spawn(store: Arc<dyn PendingStore>, config: DispatcherConfig) -> Self {
        let (events, inbound) = mpsc::channel(config.event_channel_size.max(1));
        let tracker = TaskTracker::new();
        let bus = DeliveryBus::new(config.report_capacity.max(1));

        let scheduler = Scheduler::new(
            Arc::clone(&store),
            events.downgrade(),
            tracker.clone(),
            bus.clone(),
        );
        tokio::spawn(scheduler.run(inbound));

        Self {
            events,
            store,
            tracker,
            bus,
            accepting: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Enqueue `payload` on `channel_id` and trigger an admission check.
    ///
    /// The channel's throttle parameters come from `defaults` the first
    /// time the channel is seen and are never changed afterwards. Returns
    /// once the payload is stored; the send itself happens later.
    pub async fn try_queue(
        &self,
        sender: Arc<dyn NotificationSender>,
        payload: NotificationPayload,
        channel_id: &str,
        defaults: ChannelDefaults,
    ) -> Result<(), DispatchError> {
        if !self.is_accepting() {
            return Err(DispatchError::Closed);
        }

        self.send_event(SchedulerEvent::Register {
            channel_id: channel_id.to_string(),
            owner_id: sender.id().to_string(),
            defaults,
        })
        .await?;

        if let Err(e) = self.store.enqueue(channel_id, &payload).await {
            record_store_error("enqueue");
            return Err(e.into());
        }
        record_enqueued(channel_id);

        self.send_event(SchedulerEvent::Enqueued {
            channel_id: channel_id.to_string(),
            sender,
        })
        .await
    }

    /// Fire-and-forget variant of [`Self::try_queue`].
    ///
    /// Failures are logged and the payload is dropped.
    pub async fn queue(
        &self,
        sender: Arc<dyn NotificationSender>,
        payload: NotificationPayload,
        channel_id: &str,
        defaults: ChannelDefaults,
    ) {
        let notifier = sender.id().to_string();
        if let Err(e) = self.try_queue(sender, payload, channel_id, defaults).await {
            tracing::error!(
                channel = %channel_id,
                notifier = %notifier,
                error = %e,
                "Failed to queue notification, payload dropped"
            );
        }
    }

    /// Initialize a channel and bind `sender` to it without enqueuing.
    ///
    /// Used to own a channel that other processes fill through the shared
    /// store. Admission runs once, so payloads already waiting are drained.
    pub async fn attach(
        &self,
        sender: Arc<dyn NotificationSender>,
        channel_id: &str,
        defaults: ChannelDefaults,
    ) -> Result<(), DispatchError> {
        if !self.is_accepting() {
            return Err(DispatchError::Closed);
        }
        self.send_event(SchedulerEvent::Register {
            channel_id: channel_id.to_string(),
            owner_id: sender.id().to_string(),
            defaults,
        })
        .await?;
        self.send_event(SchedulerEvent::Attach {
            channel_id: channel_id.to_string(),
            sender,
        })
        .await
    }

    /// Whether a channel has nothing pending and nothing in flight.
    ///
    /// Unknown channels count as idle.
    pub async fn is_idle(&self, channel_id: &str) -> Result<bool, DispatchError> {
        // Pending first: without new enqueues no pop succeeds after it reads
        // zero, so a zero in-flight count afterwards means the channel is done
        if self.pending(channel_id).await? > 0 {
            return Ok(false);
        }
        Ok(self
            .channel_snapshot(channel_id)
            .await
            .map_or(true, |state| state.in_flight == 0))
    }

    /// Re-run admission for a channel without enqueuing.
    ///
    /// Picks up payloads other processes appended to a shared store.
    pub async fn kick(&self, channel_id: &str) -> Result<(), DispatchError> {
        self.send_event(SchedulerEvent::Kick {
            channel_id: channel_id.to_string(),
        })
        .await
    }

    /// Copy of a channel's throttle state, `None` if the channel is unknown.
    pub async fn channel_snapshot(&self, channel_id: &str) -> Option<ChannelThrottleState> {
        let (reply, rx) = oneshot::channel();
        self.send_event(SchedulerEvent::Snapshot {
            channel_id: channel_id.to_string(),
            reply,
        })
        .await
        .ok()?;
        rx.await.ok().flatten()
    }

    /// Ids of every channel initialized in this process.
    pub async fn channels(&self) -> Vec<String> {
        let (reply, rx) = oneshot::channel();
        if self
            .send_event(SchedulerEvent::ListChannels { reply })
            .await
            .is_err()
        {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Number of payloads waiting on a channel.
    pub async fn pending(&self, channel_id: &str) -> Result<usize, StoreError> {
        self.store.len(channel_id).await
    }

    /// Receive a report for every finished send from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryReport> {
        self.bus.subscribe()
    }

    pub fn backend(&self) -> QueueBackend {
        self.store.backend()
    }

    /// False once shutdown has started.
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Stop admitting work and wait for sends already started to finish.
    pub async fn shutdown(&self) {
        if self.accepting.swap(false, Ordering::SeqCst) {
            let (reply, rx) = oneshot::channel();
            if self
                .events
                .send(SchedulerEvent::Shutdown { reply })
                .await
                .is_ok()
            {
                let _ = rx.await;
            }
        }

        self.tracker.close();
        tracing::info!(in_flight = self.tracker.len(), "Waiting for in-flight sends");
        self.tracker.wait().await;
    }

    async fn send_event(&self, event: SchedulerEvent) -> Result<(), DispatchError> {
        self.events
            .send(event)
            .await
            .map_err(|_| DispatchError::Closed)
    }
}
