//! Throttling and delivery reporting.
//!
//! Provides:
//! - Per-channel throttle state and admission gates
//! - Broadcast bus for delivery reports

pub mod notify;
pub mod throttle;
