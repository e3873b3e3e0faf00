//! # linkvisor
//!
//! **Linkvisor** keeps a flaky serial actuator usable from an asynchronous
//! event stream.
//!
//! Events arrive whenever they like; the device behind the serial port may be
//! busy, still held by another process, unplugged or slow to boot. The crate
//! opens it with bounded retries, waits out the board's reset cycle, parks
//! triggers that arrive while it is down and replays them in order once it
//! comes back, and restarts it on a timer after a failure.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   EventSource (watcher)          transport (HTTP, IPC, CLI)
//!        │ change(signature)          │ start / stop / deliver / status
//!        ▼                            ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  LinkManager (single owner of link state, one tokio Mutex)        │
//! │  - LifecycleState  Stopped → Starting → Running → Stopping        │
//! │  - Box<dyn Link>   exactly one handle per session                 │
//! │  - PendingQueue    FIFO, restored at head on failed drain         │
//! │  - session token   cancels settle/retry/throttle timers           │
//! └──────┬──────────────────────┬──────────────────────┬──────────────┘
//!        ▼                      ▼                      │ publish
//!   RetryPolicy            close_gracefully            ▼
//!  (open attempts)       (flush, drain, close    ┌──────────────┐
//!        │                or destroy)            │     Bus      │
//!        ▼                                       └──────┬───────┘
//!   Connect ──► SerialLink / MemoryLink                 ▼
//!                                              subscriber listener
//!   AutoReconnect ── every interval ──►              │
//!     start() when Stopped                     SubscriberSet
//!                                             ┌──────┼──────┐
//!                                             ▼      ▼      ▼
//!                                       LogWriter   SSE   custom
//! ```
//!
//! ### Trigger path
//! ```text
//! deliver(trigger)
//!   ├─ Running, queue empty, no drain ─► write + drain ─► TriggerSent   (true)
//!   └─ otherwise / write failed       ─► enqueue      ─► TriggerQueued (false)
//!
//! start() succeeds ─► LinkUp ─► drain:
//!   loop { pop head ─► write + drain ─┬─ ok   ─► TriggerSent ─► sleep(throttle)
//!                                     └─ fail ─► restore head, halt until next start }
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types / traits                        |
//! |-------------------|----------------------------------------------------------|-------------------------------------------|
//! | **Lifecycle**     | Start, stop, deliver, drain, status.                     | [`LinkManager`], [`LinkManagerBuilder`]   |
//! | **Reconnect**     | Periodic restart of a stopped link.                      | [`AutoReconnect`]                         |
//! | **Links**         | Device handles and the handle factory.                   | [`Link`], [`Connect`], [`MemoryDevice`]   |
//! | **Policies**      | Bounded open retries with a fixed delay.                 | [`RetryPolicy`]                           |
//! | **Event sources** | What fires the actuator.                                 | [`EventSource`], [`ManualSource`]         |
//! | **Subscriber API**| Observe link and trigger events.                         | [`Subscribe`], [`Event`], [`EventKind`]   |
//! | **Errors**        | Typed errors, classified once at the driver boundary.    | [`StartError`], [`OpenError`]             |
//! | **Configuration** | Defaults plus environment overrides.                     | [`LinkConfig`]                            |
//!
//! ## Optional features
//! - `serial` (default): native ports via the `serialport` crate ([`SerialLink`], [`SerialConnector`]).
//! - `logging` (default): built-in [`LogWriter`] subscriber rendering events through `tracing`.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use linkvisor::{LinkConfig, LinkManagerBuilder, MemoryDevice, Trigger};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = LinkConfig::default();
//!     cfg.settle_delay = Duration::from_millis(10);
//!
//!     let device = MemoryDevice::new();
//!     let manager = LinkManagerBuilder::new(cfg, device.clone()).build();
//!
//!     // Link is down: the trigger waits in the queue.
//!     assert!(!manager.deliver(Trigger::new("F")).await);
//!     assert_eq!(manager.pending_count().await, 1);
//!
//!     manager.start().await?;
//!     tokio::time::sleep(Duration::from_millis(50)).await;
//!     assert_eq!(device.written(), ["F"]);
//!
//!     manager.stop().await;
//!     Ok(())
//! }
//! ```
mod config;
mod core;
mod error;
mod events;
mod link;
mod policies;
mod reply;
mod source;
mod subscribers;
mod trigger;

// ---- Public re-exports ----

pub use config::LinkConfig;
pub use crate::core::{
    AutoReconnect, LifecycleState, LinkManager, LinkManagerBuilder, PendingQueue, StartOutcome,
};
pub use error::{ConfigError, LinkError, OpenError, OpenErrorKind, SourceError, StartError};
pub use events::{Bus, Event, EventKind};
pub use link::{
    Connect, ControlLines, Link, LinkSignal, Listener, ListenerKind, Listeners, MemoryDevice,
    MemoryLink, close_gracefully,
};
pub use policies::RetryPolicy;
pub use reply::{DeliverReply, PendingReply, StartReply, Status, StopReply};
pub use source::{Change, ChangeHandler, EventSource, ManualSource, SubscriptionId};
pub use subscribers::{Subscribe, SubscriberSet};
pub use trigger::{DEFAULT_COMMAND, SOURCE_API, SOURCE_QUEUED, SOURCE_WATCH, Trigger};

// Native serial ports.
// Enable with: `--features serial` (on by default)
#[cfg(feature = "serial")]
pub use link::{SerialConnector, SerialLink};

// Built-in `tracing` subscriber.
// Enable with: `--features logging` (on by default)
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
