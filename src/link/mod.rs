//! # Link handles: the raw device connection.
//!
//! A [`Link`] wraps exactly one physical connection attempt. The
//! [`LinkManager`](crate::LinkManager) allocates a fresh one through a
//! [`Connect`] factory on every start and never shares it.
//!
//! ## Contents
//! - [`Link`] the handle contract (open / configure / write / drain / close / destroy)
//! - [`Listeners`] one-slot-per-kind signal callbacks (data, error, close)
//! - [`close_gracefully`] the shutdown sequencer, total on every path
//! - [`SerialLink`] native serial ports (feature `serial`)
//! - [`MemoryDevice`] / [`MemoryLink`] an in-process device for dry runs and tests
//!
//! ## Handle lifecycle
//! ```text
//! Connect::connect() ──► open() ──► configure(lines) ──► write()+drain() ... ──► close()
//!                          │                                                  └─ on error ─► destroy()
//!                          └─ transient error ─► close()/destroy() ─► sleep ─► open() (RetryPolicy)
//! ```
//!
//! ## Rules
//! - `open()` is a single attempt; retries belong to [`RetryPolicy`](crate::RetryPolicy).
//! - Callers serialize `write`/`drain`; the manager holds its state lock across both.
//! - `destroy()` never fails and leaves the handle closed.

mod listeners;
pub mod memory;
#[cfg(feature = "serial")]
mod serial;
mod shutdown;

pub use listeners::{LinkSignal, Listener, ListenerKind, Listeners};
pub use memory::{MemoryDevice, MemoryLink};
#[cfg(feature = "serial")]
pub use serial::{SerialConnector, SerialLink};
pub use shutdown::close_gracefully;

use async_trait::async_trait;

use crate::config::LinkConfig;
use crate::error::{LinkError, OpenError};

/// Modem control lines asserted after open.
///
/// Many boards reset on a DTR edge; asserting both lines and then waiting the
/// settle delay lets the firmware finish booting before the first command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControlLines {
    /// Data terminal ready.
    pub dtr: bool,
    /// Request to send.
    pub rts: bool,
}

impl Default for ControlLines {
    /// Both lines asserted.
    fn default() -> Self {
        Self {
            dtr: true,
            rts: true,
        }
    }
}

/// One physical connection to the actuator.
#[async_trait]
pub trait Link: Send + Sync + 'static {
    /// Device path this handle targets.
    fn path(&self) -> &str;

    /// Returns `true` while the handle is open.
    fn is_open(&self) -> bool;

    /// Listener slots for data/error/close signals.
    fn listeners(&self) -> &Listeners;

    /// Attempts a single open. Does not retry.
    async fn open(&mut self) -> Result<(), OpenError>;

    /// Sets control lines after open.
    async fn configure(&mut self, lines: ControlLines) -> Result<(), LinkError>;

    /// Queues bytes for transmission.
    async fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError>;

    /// Waits until written bytes have been transmitted.
    async fn drain(&mut self) -> Result<(), LinkError>;

    /// Discards bytes written but not transmitted and bytes received but not read.
    async fn flush(&mut self) -> Result<(), LinkError>;

    /// Clean close. Idempotent on an already closed handle.
    async fn close(&mut self) -> Result<(), LinkError>;

    /// Forced teardown, used when `close` fails.
    fn destroy(&mut self);
}

/// Factory allocating a fresh, unopened [`Link`] for each start.
pub trait Connect: Send + Sync + 'static {
    /// Allocates a handle for `cfg.path` / `cfg.baud_rate`.
    fn connect(&self, cfg: &LinkConfig) -> Box<dyn Link>;
}

/// Writes one line and waits for it to reach the device.
pub(crate) async fn write_line(link: &mut dyn Link, line: &str) -> Result<(), LinkError> {
    if !link.is_open() {
        return Err(LinkError::NotOpen);
    }
    link.write(line.as_bytes()).await?;
    link.drain().await
}
