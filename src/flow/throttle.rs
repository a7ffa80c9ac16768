//! Per-channel throttle state and admission decisions.
//!
//! Each channel carries a concurrency limit and a minimum interval between
//! the completion of one send and the start of the next. The table is owned
//! by the single scheduler task, so no synchronization is needed here.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Throttle parameters supplied with an enqueue.
///
/// Only consulted the first time a channel is seen; later values are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDefaults {
    /// Minimum milliseconds between a completion and the next send (default 0).
    #[serde(default)]
    pub min_interval_ms: Option<u64>,
    /// Maximum sends in flight, 0 for unlimited (default 1).
    #[serde(default)]
    pub max_concurrent: Option<u32>,
}

impl ChannelDefaults {
    pub fn new(min_interval_ms: Option<u64>, max_concurrent: Option<u32>) -> Self {
        Self {
            min_interval_ms,
            max_concurrent,
        }
    }
}

/// Outcome of running both admission gates for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Both gates pass; the next pending payload may be popped.
    Dispatch,
    /// The interval gate failed; re-check after this long.
    Wait(Duration),
    /// The concurrency gate failed; a completion will re-check.
    Saturated,
}

/// Throttle state for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelThrottleState {
    /// Id of the notifier that first queued on this channel.
    pub owner_id: String,
    pub min_interval: Duration,
    /// 0 means unlimited.
    pub max_concurrent: u32,
    pub in_flight: u32,
    /// `None` until the first send completes.
    pub last_completion: Option<Instant>,
}

impl ChannelThrottleState {
    /// Create state from first-use defaults.
    pub fn new(owner_id: impl Into<String>, defaults: ChannelDefaults) -> Self {
        Self {
            owner_id: owner_id.into(),
            min_interval: Duration::from_millis(defaults.min_interval_ms.unwrap_or(0)),
            max_concurrent: defaults.max_concurrent.unwrap_or(1),
            in_flight: 0,
            last_completion: None,
        }
    }

    /// Whether another send may start without exceeding `max_concurrent`.
    pub fn has_capacity(&self) -> bool {
        self.max_concurrent == 0 || self.in_flight < self.max_concurrent
    }

    /// Time left before the interval gate opens, or `None` if it is open.
    pub fn interval_remaining(&self, now: Instant) -> Option<Duration> {
        let last = self.last_completion?;
        let elapsed = now.saturating_duration_since(last);
        if self.min_interval > elapsed {
            Some(self.min_interval - elapsed)
        } else {
            None
        }
    }

    /// Run the concurrency gate, then the interval gate.
    pub fn admit(&self, now: Instant) -> Admission {
        if !self.has_capacity() {
            return Admission::Saturated;
        }
        match self.interval_remaining(now) {
            Some(remaining) => Admission::Wait(remaining),
            None => Admission::Dispatch,
        }
    }

    /// Take one in-flight slot.
    pub fn acquire(&mut self) {
        self.in_flight += 1;
    }

    /// Give back a slot without recording a completion.
    ///
    /// Returns false if there was no slot to give back.
    pub fn release(&mut self) -> bool {
        match self.in_flight.checked_sub(1) {
            Some(n) => {
                self.in_flight = n;
                true
            }
            None => false,
        }
    }

    /// Record a finished send (successful or not) and give back its slot.
    pub fn complete(&mut self, now: Instant) -> bool {
        self.last_completion = Some(now);
        self.release()
    }
}

/// Throttle state for every channel seen by this process.
#[derive(Debug, Default)]
pub struct ChannelTable {
    channels: HashMap<String, ChannelThrottleState>,
}

impl ChannelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create state for `channel_id` if it does not exist yet.
    ///
    /// Returns true if the channel was created by this call. Existing
    /// throttle parameters are never overwritten.
    pub fn ensure(&mut self, channel_id: &str, owner_id: &str, defaults: ChannelDefaults) -> bool {
        if self.channels.contains_key(channel_id) {
            return false;
        }
        self.channels.insert(
            channel_id.to_string(),
            ChannelThrottleState::new(owner_id, defaults),
        );
        true
    }

    pub fn get(&self, channel_id: &str) -> Option<&ChannelThrottleState> {
        self.channels.get(channel_id)
    }

    pub fn get_mut(&mut self, channel_id: &str) -> Option<&mut ChannelThrottleState> {
        self.channels.get_mut(channel_id)
    }

    /// Channel ids in no particular order.
    pub fn channel_ids(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(min_interval_ms: u64, max_concurrent: u32) -> ChannelThrottleState {
        ChannelThrottleState::new(
            "ops-mail",
            ChannelDefaults::new(Some(min_interval_ms), Some(max_concurrent)),
        )
    }

    #[test]
    fn test_defaults_when_unset() {
        let s = ChannelThrottleState::new("ops-mail", ChannelDefaults::default());
        assert_eq!(s.min_interval, Duration::ZERO);
        assert_eq!(s.max_concurrent, 1);
        assert_eq!(s.in_flight, 0);
        assert!(s.last_completion.is_none());
    }

    #[test]
    fn test_explicit_zero_concurrency_is_unlimited() {
        let mut s = state(0, 0);
        for _ in 0..1000 {
            assert!(s.has_capacity());
            s.acquire();
        }
        assert_eq!(s.admit(Instant::now()), Admission::Dispatch);
    }

    #[test]
    fn test_never_completed_passes_interval_gate() {
        let s = state(60_000, 1);
        assert_eq!(s.interval_remaining(Instant::now()), None);
        assert_eq!(s.admit(Instant::now()), Admission::Dispatch);
    }

    #[test]
    fn test_concurrency_gate_checked_before_interval() {
        let now = Instant::now();
        let mut s = state(100, 1);
        s.last_completion = Some(now);
        s.acquire();
        assert_eq!(s.admit(now), Admission::Saturated);
    }

    #[test]
    fn test_interval_gate_reports_remaining_time() {
        let now = Instant::now();
        let mut s = state(100, 1);
        s.last_completion = Some(now);

        assert_eq!(s.admit(now), Admission::Wait(Duration::from_millis(100)));
        assert_eq!(
            s.admit(now + Duration::from_millis(40)),
            Admission::Wait(Duration::from_millis(60))
        );
        assert_eq!(s.admit(now + Duration::from_millis(100)), Admission::Dispatch);
    }

    #[test]
    fn test_complete_records_time_and_frees_slot() {
        let now = Instant::now();
        let mut s = state(0, 2);
        s.acquire();
        s.acquire();
        assert!(!s.has_capacity());

        assert!(s.complete(now));
        assert_eq!(s.in_flight, 1);
        assert_eq!(s.last_completion, Some(now));
        assert!(s.has_capacity());
    }

    #[test]
    fn test_release_never_goes_negative() {
        let mut s = state(0, 1);
        assert!(!s.release());
        assert_eq!(s.in_flight, 0);
        assert!(!s.complete(Instant::now()));
        assert_eq!(s.in_flight, 0);
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let mut table = ChannelTable::new();
        assert!(table.ensure("ops_mail", "ops", ChannelDefaults::new(Some(100), Some(1))));
        assert!(!table.ensure("ops_mail", "other", ChannelDefaults::new(Some(5), Some(8))));

        let s = table.get("ops_mail").unwrap();
        assert_eq!(s.owner_id, "ops");
        assert_eq!(s.min_interval, Duration::from_millis(100));
        assert_eq!(s.max_concurrent, 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_unknown_channel_lookup() {
        let mut table = ChannelTable::new();
        assert!(table.is_empty());
        assert!(table.get("missing").is_none());
        assert!(table.get_mut("missing").is_none());
    }
}
