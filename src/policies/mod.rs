//! Open policies.
//!
//! ## Contents
//! - [`RetryPolicy`] bounded open attempts with a fixed delay between transient failures
//!
//! ## Quick wiring
//! ```text
//! LinkConfig { retry: RetryPolicy, .. }
//!      └─► LinkManager::start() calls retry.open(link, session_token)
//!           - transient error + attempts left ─► close/destroy ─► sleep(delay) ─► open()
//!           - fatal error or last attempt     ─► StartError::Open
//! ```
//!
//! ## Defaults
//! - `RetryPolicy::default()` → attempts=3, delay=400ms.

mod retry;

pub use retry::RetryPolicy;
