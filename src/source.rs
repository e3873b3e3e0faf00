//! # External event sources.
//!
//! An [`EventSource`] is the watcher that decides *when* the actuator should
//! fire (originally an account-change subscription on a chain). The manager
//! subscribes on every successful start and unsubscribes on stop; each
//! [`Change`] it reports becomes exactly one delivered trigger carrying the
//! change's signature.
//!
//! [`ManualSource`] is an in-process source: callers fire changes by hand.
//! The bridge demo feeds it from stdin and the tests drive it directly.
//!
//! ## Example
//! ```rust
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! use std::sync::{Arc, Mutex};
//! use linkvisor::{EventSource, ManualSource};
//!
//! let source = ManualSource::new();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&seen);
//!
//! let id = source
//!     .subscribe(Some("wallet"), Arc::new(move |c| sink.lock().unwrap().push(c.signature)))
//!     .await
//!     .unwrap();
//! assert_eq!(source.fire("sig-1"), 1);
//!
//! source.unsubscribe(id).await.unwrap();
//! assert_eq!(source.fire("sig-2"), 0);
//! assert_eq!(*seen.lock().unwrap(), vec![Some("sig-1".to_string())]);
//! # }
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::SourceError;

/// Opaque subscription handle returned by [`EventSource::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct SubscriptionId(pub u64);

/// One change reported by an event source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Change {
    /// Key the change belongs to.
    pub key: Option<String>,
    /// Correlation id (e.g. transaction signature).
    pub signature: Option<String>,
}

/// Callback invoked once per change. May run on any thread.
pub type ChangeHandler = Arc<dyn Fn(Change) + Send + Sync>;

/// Watcher producing changes that should fire the actuator.
#[async_trait]
pub trait EventSource: Send + Sync + 'static {
    /// Starts watching `key`; `handler` is called for every change.
    async fn subscribe(
        &self,
        key: Option<&str>,
        handler: ChangeHandler,
    ) -> Result<SubscriptionId, SourceError>;

    /// Stops a subscription. The handler is dropped.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), SourceError>;
}

struct Entry {
    id: SubscriptionId,
    key: Option<String>,
    handler: ChangeHandler,
}

#[derive(Default)]
struct SourceState {
    next_id: u64,
    entries: Vec<Entry>,
    subscribe_failures: usize,
    unsubscribe_failures: usize,
}

/// Event source fired by hand.
///
/// Cheap to clone; clones share subscriptions.
#[derive(Clone, Default)]
pub struct ManualSource {
    state: Arc<Mutex<SourceState>>,
}

impl ManualSource {
    /// Creates a source with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SourceState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reports a change with `signature` to every subscriber. Returns how many were notified.
    pub fn fire(&self, signature: impl Into<String>) -> usize {
        let signature = signature.into();
        self.fire_change(|key| Change {
            key,
            signature: Some(signature.clone()),
        })
    }

    /// Reports a change without a signature.
    pub fn fire_unsigned(&self) -> usize {
        self.fire_change(|key| Change {
            key,
            signature: None,
        })
    }

    fn fire_change(&self, make: impl Fn(Option<String>) -> Change) -> usize {
        let targets: Vec<(Option<String>, ChangeHandler)> = self
            .state()
            .entries
            .iter()
            .map(|e| (e.key.clone(), Arc::clone(&e.handler)))
            .collect();
        for (key, handler) in &targets {
            handler(make(key.clone()));
        }
        targets.len()
    }

    /// Makes the next `n` subscribe calls fail.
    pub fn fail_next_subscribes(&self, n: usize) {
        self.state().subscribe_failures = n;
    }

    /// Makes the next `n` unsubscribe calls fail (the subscription is still removed).
    pub fn fail_next_unsubscribes(&self, n: usize) {
        self.state().unsubscribe_failures = n;
    }

    /// Number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.state().entries.len()
    }
}

#[async_trait]
impl EventSource for ManualSource {
    async fn subscribe(
        &self,
        key: Option<&str>,
        handler: ChangeHandler,
    ) -> Result<SubscriptionId, SourceError> {
        let mut state = self.state();
        if state.subscribe_failures > 0 {
            state.subscribe_failures -= 1;
            return Err(SourceError::Subscribe("simulated subscribe failure".into()));
        }
        state.next_id += 1;
        let id = SubscriptionId(state.next_id);
        state.entries.push(Entry {
            id,
            key: key.map(str::to_string),
            handler,
        });
        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), SourceError> {
        let mut state = self.state();
        state.entries.retain(|e| e.id != id);
        if state.unsubscribe_failures > 0 {
            state.unsubscribe_failures -= 1;
            return Err(SourceError::Unsubscribe(format!(
                "simulated unsubscribe failure for {}",
                id.0
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, ChangeHandler) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        (
            hits,
            Arc::new(move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[tokio::test]
    async fn test_subscribe_failure_is_scripted() {
        let source = ManualSource::new();
        source.fail_next_subscribes(1);
        let (_, handler) = counter();

        assert!(source.subscribe(None, Arc::clone(&handler)).await.is_err());
        assert!(source.subscribe(None, handler).await.is_ok());
        assert_eq!(source.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_unsubscribe_still_removes() {
        let source = ManualSource::new();
        let (hits, handler) = counter();
        let id = source.subscribe(Some("k"), handler).await.unwrap();

        source.fail_next_unsubscribes(1);
        assert!(source.unsubscribe(id).await.is_err());
        assert_eq!(source.fire_unsigned(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_change_carries_key() {
        let source = ManualSource::new();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        source
            .subscribe(Some("wallet"), Arc::new(move |c| *sink.lock().unwrap() = Some(c)))
            .await
            .unwrap();

        source.fire("abc");
        let change = seen.lock().unwrap().clone().unwrap();
        assert_eq!(change.key.as_deref(), Some("wallet"));
        assert_eq!(change.signature.as_deref(), Some("abc"));
    }
}
