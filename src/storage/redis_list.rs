//! Shared pending queue store on Redis lists.
//!
//! Each channel maps to one list at `key_prefix + channel_id`. Producers
//! `RPUSH` canonical JSON text, the dispatcher `LPOP`s from the head, so
//! several processes can enqueue onto the same channel.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use super::{PendingStore, QueueBackend, StoreError};
use crate::payload::NotificationPayload;

/// Pending payloads held in shared Redis lists.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    key_prefix: String,
}

impl RedisStore {
    /// Connect to Redis and verify the connection with `PING`.
    pub async fn connect(url: &str, key_prefix: impl Into<String>) -> Result<Self, StoreError> {
        let key_prefix = key_prefix.into();
        tracing::info!(url = %url, key_prefix = %key_prefix, "Connecting to Redis");

        let client = redis::Client::open(url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        tracing::info!(response = %pong, "Redis connection established");

        Ok(Self { conn, key_prefix })
    }

    /// Redis key holding a channel's pending payloads.
    pub fn list_key(&self, channel_id: &str) -> String {
        list_key(&self.key_prefix, channel_id)
    }
}

/// Build the list key for a channel.
pub fn list_key(key_prefix: &str, channel_id: &str) -> String {
    format!("{key_prefix}{channel_id}")
}

#[async_trait]
impl PendingStore for RedisStore {
    async fn enqueue(
        &self,
        channel_id: &str,
        payload: &NotificationPayload,
    ) -> Result<(), StoreError> {
        let text = payload.to_canonical_string()?;
        let key = self.list_key(channel_id);
        let mut conn = self.conn.clone();
        let depth: usize = conn.rpush(&key, text).await?;
        tracing::trace!(key = %key, depth, "Payload appended");
        Ok(())
    }

    async fn dequeue_one(
        &self,
        channel_id: &str,
    ) -> Result<Option<NotificationPayload>, StoreError> {
        let key = self.list_key(channel_id);
        let mut conn = self.conn.clone();
        let text: Option<String> = conn.lpop(&key, None).await?;
        match text {
            Some(text) => Ok(Some(NotificationPayload::from_canonical_str(&text)?)),
            None => Ok(None),
        }
    }

    async fn len(&self, channel_id: &str) -> Result<usize, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.llen(self.list_key(channel_id)).await?)
    }

    fn backend(&self) -> QueueBackend {
        QueueBackend::Redis
    }
}
