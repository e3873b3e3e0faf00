//! # Retry policy for opening a link.
//!
//! [`RetryPolicy`] opens a [`Link`] with a bounded number of attempts. Only
//! transient failures ([`OpenErrorKind::is_transient`]) are retried; the delay
//! between attempts is fixed.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use linkvisor::RetryPolicy;
//!
//! let policy = RetryPolicy::default();
//! assert_eq!(policy.attempts, 3);
//! assert_eq!(policy.delay, Duration::from_millis(400));
//!
//! // Zero attempts still opens once.
//! assert_eq!(RetryPolicy { attempts: 0, ..policy }.max_attempts(), 1);
//! ```

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{OpenError, OpenErrorKind};
use crate::link::Link;

/// Bounded open retries with a fixed delay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total open attempts, including the first one.
    pub attempts: u32,
    /// Pause between a transient failure and the next attempt.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    /// Returns a policy with:
    /// - `attempts = 3`;
    /// - `delay = 400ms`.
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(400),
        }
    }
}

impl RetryPolicy {
    /// Number of attempts actually made (at least one).
    #[inline]
    pub fn max_attempts(&self) -> u32 {
        self.attempts.max(1)
    }

    /// Opens `link`, retrying transient failures.
    ///
    /// Returns the number of attempts it took. Between attempts the partial
    /// handle is closed (destroyed if close fails) and the policy sleeps
    /// `delay`; cancelling `token` during that sleep ends the loop with
    /// [`OpenErrorKind::Cancelled`].
    pub async fn open(
        &self,
        link: &mut dyn Link,
        token: &CancellationToken,
    ) -> Result<u32, OpenError> {
        let max = self.max_attempts();
        let mut attempt = 1;

        loop {
            if token.is_cancelled() {
                return Err(cancelled(link.path()));
            }
            match link.open().await {
                Ok(()) => return Ok(attempt),
                Err(err) if err.is_transient() && attempt < max => {
                    tracing::warn!(
                        path = %err.path,
                        attempt,
                        max,
                        kind = err.kind.as_label(),
                        "transient open failure, retrying in {:?}",
                        self.delay
                    );
                    if link.close().await.is_err() {
                        link.destroy();
                    }
                    tokio::select! {
                        _ = token.cancelled() => return Err(cancelled(link.path())),
                        _ = tokio::time::sleep(self.delay) => {}
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn cancelled(path: &str) -> OpenError {
    OpenError::new(OpenErrorKind::Cancelled, path, "open cancelled")
}
