//! Test utilities for Cadence integration tests.
//!
//! Provides:
//! - A sender that records when each payload started and finished
//! - A memory store whose appends can be made to fail
//! - A memory store with slow pops
//! - Helpers for awaiting delivery reports

#![allow(dead_code)]

use async_trait::async_trait;
use cadence::flow::notify::DeliveryReport;
use cadence::storage::MemoryStore;
use cadence::{NotificationPayload, NotificationSender, PendingStore, QueueBackend, SendError, StoreError};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// One observed send.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub notifier: String,
    pub n: u64,
    pub start: Instant,
    pub end: Instant,
}

/// Shared log of deliveries across senders.
pub type DeliveryLog = Arc<Mutex<Vec<Delivery>>>;

/// Sender that sleeps for a fixed duration and records every send.
///
/// Payloads carrying `"fail": true` are rejected, `"panic": true` panics.
pub struct RecordingSender {
    id: String,
    delay: Duration,
    log: DeliveryLog,
}

impl RecordingSender {
    pub fn new(id: &str, delay: Duration) -> Self {
        Self::with_log(id, delay, DeliveryLog::default())
    }

    pub fn with_log(id: &str, delay: Duration, log: DeliveryLog) -> Self {
        Self {
            id: id.to_string(),
            delay,
            log,
        }
    }

    pub fn log(&self) -> DeliveryLog {
        Arc::clone(&self.log)
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, payload: &NotificationPayload) -> Result<(), SendError> {
        let start = Instant::now();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let value = payload.as_value();
        if value["panic"] == true {
            panic!("sender blew up");
        }
        self.log.lock().unwrap().push(Delivery {
            notifier: self.id.clone(),
            n: value["n"].as_u64().unwrap_or_default(),
            start,
            end: Instant::now(),
        });
        if value["fail"] == true {
            return Err(SendError::Rejected("gateway refused".into()));
        }
        Ok(())
    }
}

/// Memory store whose next append can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_next_enqueue: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_enqueue(&self) {
        self.fail_next_enqueue.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PendingStore for FlakyStore {
    async fn enqueue(&self, channel_id: &str, payload: &NotificationPayload) -> Result<(), StoreError> {
        if self.fail_next_enqueue.swap(false, Ordering::SeqCst) {
            let err = redis::RedisError::from((redis::ErrorKind::IoError, "connection reset"));
            return Err(StoreError::Redis(err));
        }
        self.inner.enqueue(channel_id, payload).await
    }

    async fn dequeue_one(&self, channel_id: &str) -> Result<Option<NotificationPayload>, StoreError> {
        self.inner.dequeue_one(channel_id).await
    }

    async fn len(&self, channel_id: &str) -> Result<usize, StoreError> {
        self.inner.len(channel_id).await
    }

    fn backend(&self) -> QueueBackend {
        QueueBackend::Redis
    }
}

/// Memory store whose pops take a fixed time, like a network round trip.
pub struct SlowStore {
    inner: MemoryStore,
    pop_delay: Duration,
}

impl SlowStore {
    pub fn new(pop_delay: Duration) -> Self {
        Self {
            inner: MemoryStore::new(),
            pop_delay,
        }
    }

    pub fn depth(&self, channel_id: &str) -> usize {
        self.inner.depth(channel_id)
    }
}

#[async_trait]
impl PendingStore for SlowStore {
    async fn enqueue(&self, channel_id: &str, payload: &NotificationPayload) -> Result<(), StoreError> {
        self.inner.enqueue(channel_id, payload).await
    }

    async fn dequeue_one(&self, channel_id: &str) -> Result<Option<NotificationPayload>, StoreError> {
        tokio::time::sleep(self.pop_delay).await;
        self.inner.dequeue_one(channel_id).await
    }

    async fn len(&self, channel_id: &str) -> Result<usize, StoreError> {
        self.inner.len(channel_id).await
    }

    fn backend(&self) -> QueueBackend {
        QueueBackend::Redis
    }
}

/// Numbered test payload.
pub fn payload(n: u64) -> NotificationPayload {
    NotificationPayload::new(json!({ "n": n }))
}

/// Wait for `count` delivery reports.
pub async fn collect_reports(
    reports: &mut broadcast::Receiver<DeliveryReport>,
    count: usize,
) -> Vec<DeliveryReport> {
    let mut collected = Vec::with_capacity(count);
    while collected.len() < count {
        let report = tokio::time::timeout(Duration::from_secs(60), reports.recv())
            .await
            .expect("timed out waiting for delivery report")
            .expect("report bus closed");
        collected.push(report);
    }
    collected
}

/// Highest number of sends that overlapped in time.
pub fn max_overlap(deliveries: &[Delivery]) -> usize {
    deliveries
        .iter()
        .map(|d| {
            deliveries
                .iter()
                .filter(|other| other.start <= d.start && d.start < other.end)
                .count()
        })
        .max()
        .unwrap_or(0)
}

/// Let the scheduler finish trailing work, such as the empty pop that
/// follows the last completion.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
