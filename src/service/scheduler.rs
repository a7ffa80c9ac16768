//! Single-owner dispatch scheduler.
//!
//! One task owns the channel table and reacts to events: a payload was
//! enqueued, a send completed, an interval timer fired, a pop came back
//! empty. Store round trips and sends run on tracked tasks that report back
//! through the same event channel, so throttle counters are only ever
//! touched here.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};

use crate::flow::notify::{DeliveryBus, DeliveryReport};
use crate::flow::throttle::{Admission, ChannelDefaults, ChannelTable, ChannelThrottleState};
use crate::observability::metrics::{record_in_flight, record_send, record_store_error};
use crate::payload::NotificationPayload;
use crate::service::sender::{NotificationSender, SendError};
use crate::storage::PendingStore;

/// Events consumed by the scheduler task.
pub(crate) enum SchedulerEvent {
    /// Create throttle state for a channel unless it already exists.
    Register {
        channel_id: String,
        owner_id: String,
        defaults: ChannelDefaults,
    },
    /// A payload was appended to the channel's pending queue.
    Enqueued {
        channel_id: String,
        sender: Arc<dyn NotificationSender>,
    },
    /// Attach a sender to a channel without enqueuing and re-run admission.
    Attach {
        channel_id: String,
        sender: Arc<dyn NotificationSender>,
    },
    /// Re-run admission without enqueuing.
    Kick { channel_id: String },
    /// A reserved slot popped a payload; the next one may be admitted too.
    Popped { channel_id: String },
    /// A deferred interval check is due.
    IntervalElapsed { channel_id: String },
    /// A reserved slot popped nothing.
    PopFinished {
        channel_id: String,
        /// Enqueue generation observed when the slot was reserved
        generation: u64,
        /// The pop consumed an undecodable entry; more may follow
        retry: bool,
    },
    /// A send finished, successfully or not.
    SendCompleted { channel_id: String, succeeded: bool },
    Snapshot {
        channel_id: String,
        reply: oneshot::Sender<Option<ChannelThrottleState>>,
    },
    ListChannels {
        reply: oneshot::Sender<Vec<String>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Scheduler bookkeeping that is not throttle state.
#[derive(Default)]
struct ChannelRuntime {
    /// Sender from the most recent enqueue
    sender: Option<Arc<dyn NotificationSender>>,
    timer_armed: bool,
    /// Bumped on every enqueue
    generation: u64,
}

pub(crate) struct Scheduler {
    store: Arc<dyn PendingStore>,
    events: mpsc::WeakSender<SchedulerEvent>,
    tracker: TaskTracker,
    bus: DeliveryBus,
    table: ChannelTable,
    runtime: HashMap<String, ChannelRuntime>,
}

impl Scheduler {
    pub(crate) fn new(
        store: Arc<dyn PendingStore>,
        events: mpsc::WeakSender<SchedulerEvent>,
        tracker: TaskTracker,
        bus: DeliveryBus,
    ) -> Self {
        Self {
            store,
            events,
            tracker,
            bus,
            table: ChannelTable::new(),
            runtime: HashMap::new(),
        }
    }

    /// Process events until shutdown or until every dispatcher handle is gone.
    pub(crate) async fn run(mut self, mut inbound: mpsc::Receiver<SchedulerEvent>) {
        info!(backend = %self.store.backend(), "Dispatch scheduler started");

        while let Some(event) = inbound.recv().await {
            if let SchedulerEvent::Shutdown { reply } = event {
                let _ = reply.send(());
                break;
            }
            self.handle_event(event);
        }

        info!(channels = self.table.len(), "Dispatch scheduler stopped");
    }

    fn handle_event(&mut self, event: SchedulerEvent) {
        match event {
            SchedulerEvent::Register {
                channel_id,
                owner_id,
                defaults,
            } => {
                if self.table.ensure(&channel_id, &owner_id, defaults) {
                    debug!(
                        channel = %channel_id,
                        owner = %owner_id,
                        min_interval_ms = ?defaults.min_interval_ms,
                        max_concurrent = ?defaults.max_concurrent,
                        "Channel initialized"
                    );
                }
            }
            SchedulerEvent::Enqueued { channel_id, sender } => {
                let runtime = self.runtime.entry(channel_id.clone()).or_default();
                runtime.sender = Some(sender);
                runtime.generation += 1;
                self.check(&channel_id);
            }
            SchedulerEvent::Attach { channel_id, sender } => {
                self.runtime.entry(channel_id.clone()).or_default().sender = Some(sender);
                self.check(&channel_id);
            }
            SchedulerEvent::Kick { channel_id } | SchedulerEvent::Popped { channel_id } => {
                self.check(&channel_id);
            }
            SchedulerEvent::IntervalElapsed { channel_id } => {
                if let Some(runtime) = self.runtime.get_mut(&channel_id) {
                    runtime.timer_armed = false;
                }
                self.check(&channel_id);
            }
            SchedulerEvent::PopFinished {
                channel_id,
                generation,
                retry,
            } => {
                if let Some(state) = self.table.get_mut(&channel_id) {
                    if !state.release() {
                        warn!(channel = %channel_id, "Released a slot that was never reserved");
                    }
                    record_in_flight(&channel_id, state.in_flight);
                }
                // A payload enqueued while the pop was outstanding may have
                // been turned away by the concurrency gate
                let enqueued_since = self
                    .runtime
                    .get(&channel_id)
                    .is_some_and(|runtime| runtime.generation != generation);
                if retry || enqueued_since {
                    self.check(&channel_id);
                }
            }
            SchedulerEvent::SendCompleted {
                channel_id,
                succeeded,
            } => {
                let Some(state) = self.table.get_mut(&channel_id) else {
                    return;
                };
                if !state.complete(Instant::now()) {
                    warn!(channel = %channel_id, "Send completed with no slot in flight");
                }
                let in_flight = state.in_flight;
                record_in_flight(&channel_id, in_flight);
                self.bus.publish(DeliveryReport {
                    channel_id: channel_id.clone(),
                    succeeded,
                    in_flight,
                });
                self.check(&channel_id);
            }
            SchedulerEvent::Snapshot { channel_id, reply } => {
                let _ = reply.send(self.table.get(&channel_id).cloned());
            }
            SchedulerEvent::ListChannels { reply } => {
                let _ = reply.send(self.table.channel_ids().map(str::to_string).collect());
            }
            SchedulerEvent::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    /// Run admission for one channel and start a dispatch if both gates pass.
    fn check(&mut self, channel_id: &str) {
        let Some(state) = self.table.get_mut(channel_id) else {
            trace!(channel = %channel_id, "Admission check for uninitialized channel");
            return;
        };

        match state.admit(Instant::now()) {
            Admission::Saturated => {
                trace!(channel = %channel_id, in_flight = state.in_flight, "Channel at concurrency limit");
            }
            Admission::Wait(remaining) => self.arm_interval(channel_id, remaining),
            Admission::Dispatch => {
                let Some(runtime) = self.runtime.get(channel_id) else {
                    return;
                };
                let Some(sender) = runtime.sender.clone() else {
                    trace!(channel = %channel_id, "No sender registered for channel");
                    return;
                };
                let generation = runtime.generation;

                // The slot is reserved before the pop so an outstanding
                // round trip still counts against max_concurrent
                state.acquire();
                record_in_flight(channel_id, state.in_flight);
                self.spawn_dispatch(channel_id, sender, generation);
            }
        }
    }

    fn arm_interval(&mut self, channel_id: &str, remaining: Duration) {
        let runtime = self.runtime.entry(channel_id.to_string()).or_default();
        if runtime.timer_armed {
            return;
        }
        runtime.timer_armed = true;

        debug!(
            channel = %channel_id,
            wait_ms = remaining.as_millis() as u64,
            "Minimum interval not elapsed, deferring dispatch"
        );

        let events = self.events.clone();
        let channel_id = channel_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            report(&events, SchedulerEvent::IntervalElapsed { channel_id }).await;
        });
    }

    fn spawn_dispatch(
        &self,
        channel_id: &str,
        sender: Arc<dyn NotificationSender>,
        generation: u64,
    ) {
        let store = Arc::clone(&self.store);
        let events = self.events.clone();
        let channel_id = channel_id.to_string();
        self.tracker.spawn(async move {
            let event = dispatch_one(&events, store, sender, channel_id, generation).await;
            report(&events, event).await;
        });
    }
}

/// Pop one payload and send it. Always yields the event that closes the
/// reserved slot.
///
/// A successful pop is reported before the send starts so that a backlog
/// fills every free slot instead of one per completion.
async fn dispatch_one(
    events: &mpsc::WeakSender<SchedulerEvent>,
    store: Arc<dyn PendingStore>,
    sender: Arc<dyn NotificationSender>,
    channel_id: String,
    generation: u64,
) -> SchedulerEvent {
    let payload = match store.dequeue_one(&channel_id).await {
        Ok(Some(payload)) => payload,
        Ok(None) => {
            return SchedulerEvent::PopFinished {
                channel_id,
                generation,
                retry: false,
            };
        }
        Err(e) => {
            warn!(channel = %channel_id, error = %e, "Failed to pop pending notification");
            record_store_error("dequeue");
            return SchedulerEvent::PopFinished {
                channel_id,
                generation,
                retry: e.entry_consumed(),
            };
        }
    };

    report(
        events,
        SchedulerEvent::Popped {
            channel_id: channel_id.clone(),
        },
    )
    .await;

    let notifier = sender.id().to_string();
    let start = std::time::Instant::now();
    let outcome = send_isolated(sender, payload).await;
    let latency = start.elapsed().as_secs_f64();
    record_send(&channel_id, latency, outcome.is_ok());

    match &outcome {
        Ok(()) => debug!(
            channel = %channel_id,
            notifier = %notifier,
            latency_ms = latency * 1000.0,
            "Notification sent"
        ),
        Err(e) => error!(
            channel = %channel_id,
            notifier = %notifier,
            error = %e,
            "Notification sender error"
        ),
    }

    SchedulerEvent::SendCompleted {
        channel_id,
        succeeded: outcome.is_ok(),
    }
}

/// Run the send on its own task so a panicking sender still frees its slot.
async fn send_isolated(
    sender: Arc<dyn NotificationSender>,
    payload: NotificationPayload,
) -> Result<(), SendError> {
    match tokio::spawn(async move { sender.send(&payload).await }).await {
        Ok(outcome) => outcome,
        Err(e) => Err(SendError::Rejected(format!("sender task failed: {e}"))),
    }
}

async fn report(events: &mpsc::WeakSender<SchedulerEvent>, event: SchedulerEvent) {
    let Some(events) = events.upgrade() else {
        debug!("Dispatcher dropped, discarding scheduler event");
        return;
    };
    if events.send(event).await.is_err() {
        debug!("Scheduler stopped, discarding scheduler event");
    }
}
