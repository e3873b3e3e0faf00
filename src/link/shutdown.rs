//! # Graceful shutdown sequencer.
//!
//! [`close_gracefully`] releases a link on every exit path of the manager:
//! explicit stop, failed start, stale handle before a restart, link loss.
//!
//! ## Sequence
//! ```text
//! slot.take() ──► listeners.clear()
//!                   ├─ open:   flush ─► drain ─► close ──(err)──► destroy
//!                   └─ closed: close ──(err)──► destroy
//! ```
//!
//! ## Rules
//! - The slot is empty when the function returns, whatever happened.
//! - Flush and drain failures are logged and the sequence continues.
//! - Nothing is returned to the caller: shutdown always makes forward progress.

use tracing::{debug, warn};

use super::Link;

/// Releases the handle in `slot`, leaving the slot empty.
pub async fn close_gracefully(slot: &mut Option<Box<dyn Link>>) {
    let Some(mut link) = slot.take() else {
        return;
    };

    link.listeners().clear();

    if link.is_open() {
        if let Err(e) = link.flush().await {
            debug!(path = link.path(), error = %e, "flush before close failed");
        }
        if let Err(e) = link.drain().await {
            debug!(path = link.path(), error = %e, "drain before close failed");
        }
        if let Err(e) = link.close().await {
            warn!(path = link.path(), error = %e, "close failed, destroying handle");
            link.destroy();
        }
    } else if let Err(e) = link.close().await {
        debug!(path = link.path(), error = %e, "close of closed handle failed, destroying");
        link.destroy();
    }
}
