//! In-process pending queue store.
//!
//! Payloads live in a `VecDeque` per channel and are lost when the process
//! exits. Every operation completes immediately.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{PendingStore, QueueBackend, StoreError};
use crate::payload::NotificationPayload;

/// Pending payloads held in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    queues: Mutex<HashMap<String, VecDeque<NotificationPayload>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn queues(&self) -> MutexGuard<'_, HashMap<String, VecDeque<NotificationPayload>>> {
        // Entries stay consistent even if a holder panicked mid-operation
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append to the tail of a channel's sequence.
    pub fn push(&self, channel_id: &str, payload: NotificationPayload) {
        self.queues()
            .entry(channel_id.to_string())
            .or_default()
            .push_back(payload);
    }

    /// Remove the head of a channel's sequence.
    pub fn pop(&self, channel_id: &str) -> Option<NotificationPayload> {
        self.queues().get_mut(channel_id)?.pop_front()
    }

    /// Number of payloads waiting on a channel.
    pub fn depth(&self, channel_id: &str) -> usize {
        self.queues().get(channel_id).map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl PendingStore for MemoryStore {
    async fn enqueue(
        &self,
        channel_id: &str,
        payload: &NotificationPayload,
    ) -> Result<(), StoreError> {
        self.push(channel_id, payload.clone());
        Ok(())
    }

    async fn dequeue_one(
        &self,
        channel_id: &str,
    ) -> Result<Option<NotificationPayload>, StoreError> {
        Ok(self.pop(channel_id))
    }

    async fn len(&self, channel_id: &str) -> Result<usize, StoreError> {
        Ok(self.depth(channel_id))
    }

    fn backend(&self) -> QueueBackend {
        QueueBackend::Memory
    }
}
