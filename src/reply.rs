//! Serializable results for transports.
//!
//! These mirror the manager's operations one to one so an HTTP or IPC layer
//! can serialize them directly:
//!
//! | operation | reply |
//! |---|---|
//! | `start()` | [`StartReply`] `{ ok, error? }` |
//! | `stop()` | [`StopReply`] `{ ok: true }` |
//! | `deliver()` | [`DeliverReply`] `{ written }` |
//! | `status()` | [`Status`] `{ running, path }` |
//! | `pending()` | [`PendingReply`] `{ count, items }` |

use serde::Serialize;

use crate::core::StartOutcome;
use crate::error::StartError;
use crate::trigger::Trigger;

/// Result of a start request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StartReply {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Result<StartOutcome, StartError>> for StartReply {
    fn from(res: &Result<StartOutcome, StartError>) -> Self {
        match res {
            Ok(_) => Self {
                ok: true,
                error: None,
            },
            Err(e) => Self {
                ok: false,
                error: Some(e.to_string()),
            },
        }
    }
}

impl From<Result<StartOutcome, StartError>> for StartReply {
    fn from(res: Result<StartOutcome, StartError>) -> Self {
        Self::from(&res)
    }
}

/// Result of a stop request. Stop never fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StopReply {
    pub ok: bool,
}

impl Default for StopReply {
    fn default() -> Self {
        Self { ok: true }
    }
}

/// Result of a deliver request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DeliverReply {
    /// `true` when written immediately, `false` when queued.
    pub written: bool,
}

impl From<bool> for DeliverReply {
    fn from(written: bool) -> Self {
        Self { written }
    }
}

/// Link status snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Status {
    pub running: bool,
    /// Device path while running, `null` otherwise.
    pub path: Option<String>,
}

/// Pending queue snapshot.
#[derive(Clone, Debug, Serialize)]
pub struct PendingReply {
    pub count: usize,
    pub items: Vec<Trigger>,
}

impl From<Vec<Trigger>> for PendingReply {
    fn from(items: Vec<Trigger>) -> Self {
        Self {
            count: items.len(),
            items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{OpenError, OpenErrorKind};
    use serde_json::json;

    #[test]
    fn test_start_reply_shapes() {
        let ok: StartReply = Ok(StartOutcome::AlreadyRunning).into();
        assert_eq!(serde_json::to_value(&ok).unwrap(), json!({ "ok": true }));

        let err: StartReply = Err(StartError::Open(OpenError::new(
            OpenErrorKind::NotFound,
            "/dev/ttyUSB0",
            "No such file or directory",
        )))
        .into();
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({ "ok": false, "error": "failed to open /dev/ttyUSB0: No such file or directory" })
        );
    }

    #[test]
    fn test_status_path_serializes_null() {
        let status = Status {
            running: false,
            path: None,
        };
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            json!({ "running": false, "path": null })
        );
        assert_eq!(serde_json::to_value(StopReply::default()).unwrap(), json!({ "ok": true }));
    }

    #[test]
    fn test_pending_reply_counts_items() {
        let reply = PendingReply::from(vec![Trigger::new("F"), Trigger::new("L")]);
        assert_eq!(reply.count, 2);
        assert_eq!(DeliverReply::from(false), DeliverReply { written: false });
    }
}
