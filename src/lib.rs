//! Cadence: a rate-limited notification dispatch queue.
//!
//! Cadence accepts notification payloads per channel and releases them to a
//! sender one at a time (or up to a per-channel concurrency limit), keeping a
//! minimum interval between the end of one send and the start of the next.
//!
//! # Architecture
//!
//! - **Single-owner scheduler**: all throttle state lives in one task driven
//!   by events (enqueued, send completed, interval elapsed)
//! - **Pluggable pending store**: in-process memory or a shared Redis list,
//!   behind one [`storage::PendingStore`] trait
//! - **Fire and forget**: send and store failures are logged and absorbed,
//!   never returned to the enqueuing caller
//! - **Observable**: structured tracing and OpenTelemetry metrics
//!
//! # Modules
//!
//! - [`config`]: CLI and environment configuration
//! - [`flow`]: Channel throttle state and delivery report bus
//! - [`observability`]: Metrics and tracing setup
//! - [`payload`]: Opaque notification payload documents
//! - [`server`]: Daemon runtime (stdin ingest, shutdown)
//! - [`service`]: Dispatcher, scheduler, senders and notifiers
//! - [`storage`]: Pending queue stores

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions, // storage::memory::MemoryStore is fine
    clippy::must_use_candidate,      // Not all functions need #[must_use]
    clippy::missing_errors_doc,      // Error docs can be verbose
    clippy::missing_panics_doc,      // Panic docs can be verbose
    clippy::too_many_lines           // Some functions are inherently long
)]

pub mod config;
pub mod flow;
pub mod observability;
pub mod payload;
pub mod server;
pub mod service;
pub mod storage;

pub use flow::throttle::{ChannelDefaults, ChannelThrottleState};
pub use payload::NotificationPayload;
pub use service::notifier::{Notifier, NotifierConfig};
pub use service::sender::{NotificationSender, SendError};
pub use service::{DispatchError, Dispatcher, DispatcherConfig};
pub use storage::{PendingStore, QueueBackend, StoreError};

use uuid::Uuid;

/// Generate a new notifier instance suffix.
///
/// UUIDv7 in its simple form: 32 lowercase hex characters, time-sortable.
///
/// # Example
///
/// ```
/// let suffix = cadence::generate_instance_suffix();
/// assert_eq!(suffix.len(), 32);
/// ```
#[must_use]
pub fn generate_instance_suffix() -> String {
    Uuid::now_v7().simple().to_string()
}
