use std::fmt;

use serde::Serialize;

/// Lifecycle of the managed link.
///
/// ```text
/// Stopped ──start()──► Starting ──open+settle+subscribe──► Running
///    ▲                    │                                   │
///    │                    └──── failure / stop() ─────────────┤
///    │                                                        ▼
///    └──────────── release done ◄──────── Stopping ◄── stop() / link lost
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// No handle allocated.
    Stopped,
    /// A start is in flight and owns a handle.
    Starting,
    /// Handle open, listeners attached, writes accepted.
    Running,
    /// Resources are being released.
    Stopping,
}

impl LifecycleState {
    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
