//! Link events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification, metadata and observer payloads
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `LinkManager` (status, sent, queued), the per-session link
//!   watcher (link down), the device data listener (serial data), `SubscriberSet`
//!   workers (overflow/panic).
//! - **Consumers**: the subscriber listener spawned by `LinkManagerBuilder::build`
//!   (fans out to `SubscriberSet`), and any transport holding `LinkManager::subscribe()`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
