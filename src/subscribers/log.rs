//! # LogWriter: renders link events through `tracing`
//!
//! A minimal subscriber that turns every [`Event`] into one structured log
//! record under the `linkvisor::events` target.
//!
//! ## Example output (with `tracing_subscriber::fmt`)
//! ```text
//! INFO linkvisor::events: link up path="/dev/ttyUSB0"
//! INFO linkvisor::events: trigger sent msg="F" source="api" signature=Some("5hK2...")
//! INFO linkvisor::events: trigger queued msg="F" pending=2
//! WARN linkvisor::events: link down path="/dev/ttyUSB0" reason=Some("unplugged")
//! ```

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let path = e.path.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::LinkUp => {
                info!(target: "linkvisor::events", path, "link up");
            }
            EventKind::LinkDown => match e.reason.as_deref() {
                Some(reason) => warn!(target: "linkvisor::events", path, reason, "link down"),
                None => info!(target: "linkvisor::events", path, "link down"),
            },
            EventKind::StartFailed => {
                warn!(target: "linkvisor::events", path, reason = ?e.reason, "start failed");
            }
            EventKind::TriggerSent => {
                let trigger = e.trigger.as_ref();
                info!(
                    target: "linkvisor::events",
                    msg = trigger.map(|t| t.msg()),
                    source = e.reason.as_deref(),
                    signature = ?trigger.and_then(|t| t.signature()),
                    "trigger sent"
                );
            }
            EventKind::TriggerQueued => {
                info!(
                    target: "linkvisor::events",
                    msg = e.trigger.as_ref().map(|t| t.msg()),
                    pending = e.pending,
                    "trigger queued"
                );
            }
            EventKind::SerialData => {
                debug!(target: "linkvisor::events", text = e.data.as_deref(), "serial data");
            }
            EventKind::SubscriberOverflow => {
                warn!(target: "linkvisor::events", reason = ?e.reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                warn!(target: "linkvisor::events", reason = ?e.reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
