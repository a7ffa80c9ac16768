//! Pending queue stores for Cadence.
//!
//! Provides:
//! - The [`PendingStore`] capability shared by every backend
//! - In-process FIFO lists ([`memory::MemoryStore`])
//! - Shared Redis lists ([`redis_list::RedisStore`]) for multi-process enqueue

pub mod memory;
pub mod redis_list;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::payload::NotificationPayload;

pub use memory::MemoryStore;
pub use redis_list::RedisStore;

/// Key prefix for per-channel Redis lists.
pub const DEFAULT_KEY_PREFIX: &str = "R_NOTIFICATIONS_";

/// Error type for pending store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Payload codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether the failed operation consumed a store entry.
    ///
    /// A payload that cannot be decoded has already been popped, so the
    /// next entry can be tried straight away.
    pub fn entry_consumed(&self) -> bool {
        matches!(self, Self::Codec(_))
    }
}

/// FIFO storage of payloads that have not been dispatched yet.
///
/// One ordered sequence per channel id. Implementations must be safe to
/// share between the enqueuing callers and the dispatch tasks.
#[async_trait]
pub trait PendingStore: Send + Sync {
    /// Append a payload to the tail of the channel's sequence.
    async fn enqueue(&self, channel_id: &str, payload: &NotificationPayload)
        -> Result<(), StoreError>;

    /// Remove and return the head of the channel's sequence.
    ///
    /// Returns `Ok(None)` when the sequence is absent or empty.
    async fn dequeue_one(&self, channel_id: &str)
        -> Result<Option<NotificationPayload>, StoreError>;

    /// Number of payloads waiting on the channel.
    async fn len(&self, channel_id: &str) -> Result<usize, StoreError>;

    /// Which backend this store is.
    fn backend(&self) -> QueueBackend;
}

/// Selects where pending payloads live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    /// Process-local lists, lost on restart
    #[default]
    Memory,
    /// Shared Redis lists
    Redis,
}

impl fmt::Display for QueueBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str("memory"),
            Self::Redis => f.write_str("redis"),
        }
    }
}

/// Open the store for the configured backend.
///
/// `redis_url` and `key_prefix` are ignored for the memory backend.
pub async fn open_store(
    backend: QueueBackend,
    redis_url: &str,
    key_prefix: &str,
) -> Result<Arc<dyn PendingStore>, StoreError> {
    match backend {
        QueueBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        QueueBackend::Redis => Ok(Arc::new(RedisStore::connect(redis_url, key_prefix).await?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_display() {
        assert_eq!(QueueBackend::Memory.to_string(), "memory");
        assert_eq!(QueueBackend::Redis.to_string(), "redis");
        assert_eq!(QueueBackend::default(), QueueBackend::Memory);
    }

    #[test]
    fn test_backend_from_cli_value() {
        assert_eq!(QueueBackend::from_str("redis", true).unwrap(), QueueBackend::Redis);
        assert_eq!(QueueBackend::from_str("Memory", true).unwrap(), QueueBackend::Memory);
        assert!(QueueBackend::from_str("sqs", true).is_err());
    }

    #[test]
    fn test_codec_errors_consume_the_entry() {
        let err = StoreError::from(serde_json::from_str::<serde_json::Value>("{").unwrap_err());
        assert!(err.entry_consumed());
    }

    #[tokio::test]
    async fn test_open_memory_store() {
        let store = open_store(QueueBackend::Memory, "", DEFAULT_KEY_PREFIX).await.unwrap();
        assert_eq!(store.backend(), QueueBackend::Memory);
        assert_eq!(store.len("ops_mail").await.unwrap(), 0);
    }
}
