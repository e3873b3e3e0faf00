//! # Triggers: one requested physical action.
//!
//! A [`Trigger`] becomes exactly one line on the wire. It is immutable once
//! created; the builder-style `with_*` methods consume and return it.
//!
//! ## Example
//! ```rust
//! use linkvisor::Trigger;
//!
//! let t = Trigger::new("F").with_signature("5hK2...");
//! assert_eq!(t.wire_message(), "F\n");
//! assert_eq!(t.source(), "api");
//! assert_eq!(t.signature(), Some("5hK2..."));
//! ```

use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Payload written when a trigger carries no message.
pub const DEFAULT_COMMAND: &str = "F";

/// Source tag for triggers submitted through the public API.
pub const SOURCE_API: &str = "api";

/// Source tag for triggers produced by event-source changes.
pub const SOURCE_WATCH: &str = "watch";

/// Source tag reported when a trigger with an empty source leaves the pending queue.
pub const SOURCE_QUEUED: &str = "queued";

/// A unit of work meant to become one write to the link.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    msg: Arc<str>,
    source: Arc<str>,
    signature: Option<Arc<str>>,
    created_at: SystemTime,
}

impl Trigger {
    /// Creates a trigger with the given message (empty → [`DEFAULT_COMMAND`]).
    ///
    /// Trailing line breaks are dropped and interior ones become spaces, so
    /// the message is always a single line on the wire.
    pub fn new(msg: impl AsRef<str>) -> Self {
        let msg = msg.as_ref().trim_end_matches(['\r', '\n']);
        let msg: Arc<str> = if msg.is_empty() {
            Arc::from(DEFAULT_COMMAND)
        } else if msg.contains(['\r', '\n']) {
            Arc::from(msg.replace(['\r', '\n'], " "))
        } else {
            Arc::from(msg)
        };
        Self {
            msg,
            source: Arc::from(SOURCE_API),
            signature: None,
            created_at: SystemTime::now(),
        }
    }

    /// Attaches a source tag.
    #[inline]
    pub fn with_source(mut self, source: impl Into<Arc<str>>) -> Self {
        self.source = source.into();
        self
    }

    /// Attaches a correlation id (e.g. a transaction signature).
    #[inline]
    pub fn with_signature(mut self, signature: impl Into<Arc<str>>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Command text without the line terminator.
    pub fn msg(&self) -> &str {
        &self.msg
    }

    /// Originating source tag.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Correlation id, if any.
    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    /// Creation timestamp.
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Message as written to the device: terminated by exactly one `\n`.
    pub fn wire_message(&self) -> String {
        format!("{}\n", self.msg)
    }

    /// Source tag reported when this trigger leaves the pending queue.
    pub(crate) fn queued_source(&self) -> &str {
        if self.source.is_empty() {
            SOURCE_QUEUED
        } else {
            &self.source
        }
    }
}

impl Default for Trigger {
    fn default() -> Self {
        Trigger::new(DEFAULT_COMMAND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_message_falls_back_to_default() {
        assert_eq!(Trigger::new("").msg(), "F");
        assert_eq!(Trigger::new("\n").msg(), "F");
        assert_eq!(Trigger::default().wire_message(), "F\n");
    }

    #[test]
    fn test_wire_message_has_single_terminator() {
        assert_eq!(Trigger::new("L\n").wire_message(), "L\n");
        assert_eq!(Trigger::new("L\r\n").wire_message(), "L\n");
        assert_eq!(Trigger::new("L").wire_message(), "L\n");
    }

    #[test]
    fn test_interior_line_breaks_are_flattened() {
        assert_eq!(Trigger::new("A\nB").wire_message(), "A B\n");
        assert_eq!(Trigger::new("A\r\nB\n").msg(), "A  B");
    }

    #[test]
    fn test_queued_source_keeps_real_source() {
        assert_eq!(Trigger::default().queued_source(), SOURCE_API);
        assert_eq!(
            Trigger::default().with_source(SOURCE_WATCH).queued_source(),
            SOURCE_WATCH
        );
        assert_eq!(Trigger::default().with_source("").queued_source(), SOURCE_QUEUED);
    }

    #[test]
    fn test_serializes_fields() {
        let t = Trigger::new("F").with_signature("sig-1");
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["msg"], "F");
        assert_eq!(json["source"], "api");
        assert_eq!(json["signature"], "sig-1");
        assert!(json["created_at"].is_object());
    }
}
