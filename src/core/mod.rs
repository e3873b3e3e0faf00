//! Runtime core: the link lifecycle.
//!
//! The public entry point is [`LinkManager`], built with
//! [`LinkManagerBuilder`] and optionally kept alive by [`AutoReconnect`].
//!
//! Internal modules:
//! - [`manager`]: start/stop/deliver/drain and link-loss handling;
//! - [`queue`]: FIFO of triggers waiting for the link;
//! - [`reconnect`]: periodic restart of a stopped link;
//! - [`shutdown`]: cross-platform termination signal wait;
//! - [`state`]: lifecycle state machine.

mod builder;
mod manager;
mod queue;
mod reconnect;
mod shutdown;
mod state;

pub use builder::LinkManagerBuilder;
pub use manager::{LinkManager, StartOutcome};
pub use queue::PendingQueue;
pub use reconnect::AutoReconnect;
pub use state::LifecycleState;
