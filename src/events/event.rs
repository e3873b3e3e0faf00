//! # Link events emitted by the manager and its helpers.
//!
//! The [`EventKind`] enum classifies events into the four channels a transport
//! forwards to its observers (see [`EventKind::channel`]):
//! - **status**: link up/down and failed starts
//! - **sent**: a trigger reached the device
//! - **queued**: a trigger was parked in the pending queue
//! - **serial-data**: bytes read back from the device
//!
//! plus two internal kinds reported by the subscriber fan-out.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use linkvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::LinkDown)
//!     .with_path("/dev/ttyUSB0")
//!     .with_reason("unplugged");
//!
//! assert_eq!(ev.kind.channel(), "status");
//! assert_eq!(ev.payload()["running"], false);
//! assert_eq!(ev.payload()["error"], "unplugged");
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use serde::Serialize;
use serde_json::{Value, json};

use crate::trigger::Trigger;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of link events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    // === Status ===
    /// Link became usable.
    ///
    /// Sets: `path`
    LinkUp,

    /// Link went down (explicit stop or runtime link error).
    ///
    /// Sets: `path`, `reason` (only on errors)
    LinkDown,

    /// A start attempt ended without reaching `Running`.
    ///
    /// Sets: `path`, `reason`
    StartFailed,

    // === Triggers ===
    /// Trigger written and drained to the device.
    ///
    /// Sets: `trigger`, `reason` (source tag as reported)
    TriggerSent,

    /// Trigger appended to the pending queue.
    ///
    /// Sets: `trigger`, `pending` (queue length after append)
    TriggerQueued,

    // === Device ===
    /// Bytes read from the device.
    ///
    /// Sets: `data` (lossy UTF-8)
    SerialData,

    // === Subscriber events ===
    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `reason` (subscriber name and cause)
    SubscriberOverflow,

    /// Subscriber panicked during event processing.
    ///
    /// Sets: `reason` (panic message)
    SubscriberPanicked,
}

impl EventKind {
    /// Observer-facing channel name.
    pub fn channel(self) -> &'static str {
        match self {
            EventKind::LinkUp | EventKind::LinkDown | EventKind::StartFailed => "status",
            EventKind::TriggerSent => "sent",
            EventKind::TriggerQueued => "queued",
            EventKind::SerialData => "serial-data",
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked => "internal",
        }
    }
}

/// Link event with optional metadata.
#[derive(Clone, Debug, Serialize)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Device path, if applicable.
    pub path: Option<Arc<str>>,
    /// Human-readable reason (errors, source tag, overflow details).
    pub reason: Option<Arc<str>>,
    /// Trigger involved, if any.
    pub trigger: Option<Trigger>,
    /// Pending queue length after the event.
    pub pending: Option<usize>,
    /// Text read from the device.
    pub data: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            path: None,
            reason: None,
            trigger: None,
            pending: None,
            data: None,
        }
    }

    /// Attaches a device path.
    #[inline]
    pub fn with_path(mut self, path: impl Into<Arc<str>>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a trigger.
    #[inline]
    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// Attaches the pending queue length.
    #[inline]
    pub fn with_pending(mut self, n: usize) -> Self {
        self.pending = Some(n);
        self
    }

    /// Attaches device data, decoded as lossy UTF-8.
    #[inline]
    pub fn with_data(mut self, bytes: &[u8]) -> Self {
        self.data = Some(Arc::from(String::from_utf8_lossy(bytes).as_ref()));
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} panic={info}"))
    }

    /// Observer-facing JSON payload for this event's channel.
    pub fn payload(&self) -> Value {
        match self.kind {
            EventKind::LinkUp => json!({ "running": true, "port": self.path }),
            EventKind::LinkDown | EventKind::StartFailed => match &self.reason {
                Some(reason) => json!({ "running": false, "error": reason }),
                None => json!({ "running": false }),
            },
            EventKind::TriggerSent => json!({
                "msg": self.trigger.as_ref().map(Trigger::msg),
                "trigger": self.reason,
                "signature": self.trigger.as_ref().and_then(Trigger::signature),
            }),
            EventKind::TriggerQueued => json!({
                "count": self.pending,
                "msg": self.trigger.as_ref().map(Trigger::msg),
                "trigger": self.trigger.as_ref().map(Trigger::source),
                "signature": self.trigger.as_ref().and_then(Trigger::signature),
            }),
            EventKind::SerialData => json!({ "text": self.data }),
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked => {
                json!({ "reason": self.reason })
            }
        }
    }

    /// Returns `true` if this event reports a subscriber dropping events.
    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::new(EventKind::LinkUp);
        let b = Event::new(EventKind::LinkUp);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_sent_payload() {
        let ev = Event::new(EventKind::TriggerSent)
            .with_trigger(Trigger::new("F").with_signature("abc"))
            .with_reason("queued");
        assert_eq!(ev.kind.channel(), "sent");
        assert_eq!(
            ev.payload(),
            json!({ "msg": "F", "trigger": "queued", "signature": "abc" })
        );
    }

    #[test]
    fn test_queued_payload_and_data() {
        let ev = Event::new(EventKind::TriggerQueued)
            .with_trigger(Trigger::default())
            .with_pending(3);
        assert_eq!(ev.payload()["count"], 3);
        assert_eq!(ev.payload()["signature"], Value::Null);

        let data = Event::new(EventKind::SerialData).with_data(b"OK\r\n");
        assert_eq!(data.kind.channel(), "serial-data");
        assert_eq!(data.payload()["text"], "OK\r\n");
    }

    #[test]
    fn test_link_up_payload() {
        let ev = Event::new(EventKind::LinkUp).with_path("COM5");
        assert_eq!(ev.payload(), json!({ "running": true, "port": "COM5" }));
    }
}
