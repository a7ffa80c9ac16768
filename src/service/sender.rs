//! Notification senders.
//!
//! A sender performs the actual delivery (mail, webhook, SMS, ...). The
//! dispatcher awaits exactly one `send` per admitted payload.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

use crate::payload::NotificationPayload;

/// Error returned by a failed send.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("Send rejected: {0}")]
    Rejected(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Delivers one notification payload.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Id of the notifier configuration behind this sender.
    fn id(&self) -> &str;

    /// Deliver a payload. Completion, success or failure, frees the slot.
    async fn send(&self, payload: &NotificationPayload) -> Result<(), SendError>;
}

#[derive(Serialize)]
struct DeliveredLine<'a> {
    notifier: &'a str,
    payload: &'a NotificationPayload,
}

/// Writes each payload as one JSON line to an async writer.
///
/// The daemon uses it on stdout so that deliveries can be piped onward.
/// Senders for different notifiers can share one writer.
pub struct JsonLineSender<W> {
    id: String,
    writer: Arc<Mutex<W>>,
}

impl<W> JsonLineSender<W> {
    pub fn new(id: impl Into<String>, writer: W) -> Self {
        Self::with_shared(id, Arc::new(Mutex::new(writer)))
    }

    pub fn with_shared(id: impl Into<String>, writer: Arc<Mutex<W>>) -> Self {
        Self {
            id: id.into(),
            writer,
        }
    }
}

/// Shared stdout handle for [`JsonLineSender::with_shared`].
pub fn shared_stdout() -> Arc<Mutex<Stdout>> {
    Arc::new(Mutex::new(tokio::io::stdout()))
}

#[async_trait]
impl<W> NotificationSender for JsonLineSender<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, payload: &NotificationPayload) -> Result<(), SendError> {
        let mut line = serde_json::to_vec(&DeliveredLine {
            notifier: &self.id,
            payload,
        })?;
        line.push(b'\n');

        // One lock per line keeps concurrent sends from interleaving
        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_writes_one_line_per_payload() {
        let writer = Arc::new(Mutex::new(Vec::<u8>::new()));
        let ops = JsonLineSender::with_shared("ops", Arc::clone(&writer));
        let billing = JsonLineSender::with_shared("billing", Arc::clone(&writer));

        ops.send(&NotificationPayload::new(json!({"n": 1}))).await.unwrap();
        billing.send(&NotificationPayload::new(json!({"n": 2}))).await.unwrap();

        let written = String::from_utf8(writer.lock().await.clone()).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(
            lines,
            vec![
                r#"{"notifier":"ops","payload":{"n":1}}"#,
                r#"{"notifier":"billing","payload":{"n":2}}"#,
            ]
        );
    }

    #[test]
    fn test_sender_id() {
        let sender = JsonLineSender::new("ops-mail", Vec::<u8>::new());
        assert_eq!(sender.id(), "ops-mail");
    }
}
