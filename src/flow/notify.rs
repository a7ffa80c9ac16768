//! Delivery report bus.
//!
//! The scheduler publishes one report per finished send so that the daemon,
//! diagnostics and tests can observe dispatch without polling.

use tokio::sync::broadcast::{self, Receiver, Sender};

/// Sent after a send completes, whatever its outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    /// The channel the payload was popped from
    pub channel_id: String,
    /// False if the sender returned an error
    pub succeeded: bool,
    /// Sends still in flight on the channel after this one finished
    pub in_flight: u32,
}

/// Broadcast bus for delivery reports.
///
/// Slow receivers lose the oldest reports rather than stalling the scheduler.
#[derive(Clone)]
pub struct DeliveryBus {
    sender: Sender<DeliveryReport>,
}

impl DeliveryBus {
    /// Create a new bus buffering at most `capacity` reports per receiver.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Receive all reports published from now on.
    pub fn subscribe(&self) -> Receiver<DeliveryReport> {
        self.sender.subscribe()
    }

    /// Publish a report, returning how many receivers got it.
    pub fn publish(&self, report: DeliveryReport) -> usize {
        // send() only fails when nobody is listening
        self.sender.send(report).unwrap_or(0)
    }

    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for DeliveryBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
