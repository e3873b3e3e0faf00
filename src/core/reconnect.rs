//! # Auto-reconnect loop.
//!
//! [`AutoReconnect`] periodically brings a stopped link back up. It is the
//! only thing that restarts the link after a runtime failure (unplug, driver
//! error): the manager itself never retries outside of a start.
//!
//! ```text
//! interval_at(now + period, period)
//!   loop:
//!     token.cancelled() ─► exit
//!     tick ─► state == Stopped ? manager.start().await : skip
//!                                 ├─ Ok(Started)  ─► info!
//!                                 ├─ Ok(_)        ─► debug! (someone else got there first)
//!                                 └─ Err(e)       ─► warn!, next tick
//! ```
//!
//! Attempts never overlap: the loop awaits each start before the next tick,
//! and ticks missed meanwhile are delayed rather than bursted.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::manager::{LinkManager, StartOutcome};
use super::state::LifecycleState;

/// Handle to a running reconnect loop.
pub struct AutoReconnect {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl AutoReconnect {
    /// Spawns the loop. The first tick fires one `interval` from now.
    ///
    /// A zero interval is raised to one millisecond.
    pub fn spawn(manager: LinkManager, interval: Duration) -> Self {
        let token = CancellationToken::new();
        let handle = tokio::spawn(tick_loop(manager, interval, token.clone()));
        Self { token, handle }
    }

    /// Token that stops the loop when cancelled.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Stops the loop and waits for an in-flight attempt to finish.
    pub async fn shutdown(self) {
        self.token.cancel();
        let _ = self.handle.await;
    }
}

async fn tick_loop(manager: LinkManager, interval: Duration, token: CancellationToken) {
    let period = interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if manager.state().await != LifecycleState::Stopped {
            continue;
        }
        match manager.start().await {
            Ok(StartOutcome::Started { attempts }) => {
                info!(path = %manager.config().path, attempts, "auto-reconnect restored link");
            }
            Ok(outcome) => debug!(?outcome, "auto-reconnect tick skipped"),
            Err(err) => warn!(
                path = %manager.config().path,
                label = err.as_label(),
                error = %err,
                "auto-reconnect attempt failed"
            ),
        }
    }
    debug!("auto-reconnect loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkConfig;
    use crate::core::LinkManagerBuilder;
    use crate::error::OpenErrorKind;
    use crate::link::MemoryDevice;

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_device_appears() {
        let device = MemoryDevice::new();
        device.fail_next_opens([OpenErrorKind::NotFound, OpenErrorKind::NotFound]);
        let cfg = LinkConfig {
            settle_delay: Duration::ZERO,
            ..LinkConfig::default()
        };
        let manager = LinkManagerBuilder::new(cfg, device.clone()).build();

        let reconnect = AutoReconnect::spawn(manager.clone(), Duration::from_secs(5));
        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(device.open_attempts(), 0);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(manager.state().await, LifecycleState::Running);
        assert_eq!(device.open_attempts(), 3);

        reconnect.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_ticking() {
        let device = MemoryDevice::new();
        let manager = LinkManagerBuilder::new(LinkConfig::default(), device.clone()).build();

        let reconnect = AutoReconnect::spawn(manager.clone(), Duration::from_secs(1));
        reconnect.shutdown().await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(device.allocations(), 0);
        assert_eq!(manager.state().await, LifecycleState::Stopped);
    }
}
