//! Notification payload documents.
//!
//! The dispatch core never looks inside a payload. It hands it to the sender
//! and, for the shared store, turns it into canonical JSON text and back.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An opaque structured notification payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationPayload(Value);

impl NotificationPayload {
    /// Wrap a JSON document.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Borrow the underlying JSON document.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Serialize to canonical JSON text.
    ///
    /// Object keys come out sorted (serde_json maps are ordered), so equal
    /// payloads always produce identical text.
    pub fn to_canonical_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }

    /// Parse a payload previously written by [`Self::to_canonical_string`].
    pub fn from_canonical_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text).map(Self)
    }
}

impl From<Value> for NotificationPayload {
    fn from(value: Value) -> Self {
        Self(value)
    }
}
