//! Notifier front end.
//!
//! A notifier binds a sender to its throttle configuration and derives the
//! dispatch channel from its id and optional channel name, so that every
//! instance of the same notifier shares one queue.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::sender::NotificationSender;
use super::{DispatchError, Dispatcher};
use crate::flow::throttle::ChannelDefaults;
use crate::generate_instance_suffix;
use crate::payload::NotificationPayload;

/// Static configuration of one notifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifierConfig {
    pub id: String,
    /// Sub-channel name, appended to the id to form the dispatch channel
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub min_interval_ms: Option<u64>,
    #[serde(default)]
    pub max_concurrent: Option<u32>,
}

impl NotifierConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_min_interval_ms(mut self, min_interval_ms: u64) -> Self {
        self.min_interval_ms = Some(min_interval_ms);
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: u32) -> Self {
        self.max_concurrent = Some(max_concurrent);
        self
    }

    /// Dispatch channel id: `{id}_{channel}`, or just `{id}` without a channel.
    pub fn list_name(&self) -> String {
        match self.channel.as_deref() {
            Some(channel) if !channel.is_empty() => format!("{}_{}", self.id, channel),
            _ => self.id.clone(),
        }
    }

    pub fn defaults(&self) -> ChannelDefaults {
        ChannelDefaults::new(self.min_interval_ms, self.max_concurrent)
    }
}

/// A configured sender that queues through a [`Dispatcher`].
pub struct Notifier {
    config: NotifierConfig,
    uid: String,
    list_name: String,
    sender: Arc<dyn NotificationSender>,
    dispatcher: Dispatcher,
}

impl Notifier {
    pub fn new(
        config: NotifierConfig,
        sender: Arc<dyn NotificationSender>,
        dispatcher: Dispatcher,
    ) -> Self {
        let uid = format!("{}_{}", config.id, generate_instance_suffix());
        let list_name = config.list_name();
        Self {
            config,
            uid,
            list_name,
            sender,
            dispatcher,
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// Unique id of this notifier instance.
    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn config(&self) -> &NotifierConfig {
        &self.config
    }

    /// Channel id this notifier queues on.
    pub fn list_name(&self) -> &str {
        &self.list_name
    }

    /// Queue a payload, surfacing a failed append.
    pub async fn try_notify(&self, payload: NotificationPayload) -> Result<(), DispatchError> {
        tracing::trace!(notifier = %self.uid, channel = %self.list_name, "Queueing notification");
        self.dispatcher
            .try_queue(
                Arc::clone(&self.sender),
                payload,
                &self.list_name,
                self.config.defaults(),
            )
            .await
    }

    /// Take ownership of this notifier's channel without queueing anything,
    /// so payloads appended by other processes get delivered.
    pub async fn attach(&self) -> Result<(), DispatchError> {
        self.dispatcher
            .attach(Arc::clone(&self.sender), &self.list_name, self.config.defaults())
            .await
    }

    /// Queue a payload for delivery. Never fails; problems are logged.
    pub async fn notify(&self, payload: NotificationPayload) {
        tracing::trace!(notifier = %self.uid, channel = %self.list_name, "Queueing notification");
        self.dispatcher
            .queue(
                Arc::clone(&self.sender),
                payload,
                &self.list_name,
                self.config.defaults(),
            )
            .await;
    }
}
