//! # Listener slots for link signals.
//!
//! A link reports what happens on the wire through three signal kinds: data
//! read from the device, runtime errors, and close. [`Listeners`] holds **at
//! most one** callback per kind; registering a new one always drops the
//! previous registration first, so a reopened handle can never deliver the
//! same signal twice.
//!
//! ```text
//! driver thread ──► Listeners::emit(signal) ──► slot[kind] ──► callback
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

/// Signal emitted by a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkSignal {
    /// Bytes read from the device.
    Data(Vec<u8>),
    /// Runtime error observed after open.
    Error(String),
    /// The device closed underneath us.
    Closed,
}

impl LinkSignal {
    /// Slot this signal is routed to.
    pub fn kind(&self) -> ListenerKind {
        match self {
            LinkSignal::Data(_) => ListenerKind::Data,
            LinkSignal::Error(_) => ListenerKind::Error,
            LinkSignal::Closed => ListenerKind::Close,
        }
    }
}

/// Listener slot identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerKind {
    /// Bytes received from the device.
    Data,
    /// Fatal I/O error on the handle.
    Error,
    /// The handle closed underneath us.
    Close,
}

impl ListenerKind {
    fn index(self) -> usize {
        match self {
            ListenerKind::Data => 0,
            ListenerKind::Error => 1,
            ListenerKind::Close => 2,
        }
    }
}

/// Callback invoked for a signal. Runs on the emitting thread; keep it short.
pub type Listener = Arc<dyn Fn(&LinkSignal) + Send + Sync>;

/// Shared listener slots (cheap to clone, clones share slots).
#[derive(Clone, Default)]
pub struct Listeners {
    slots: Arc<Mutex<[Option<Listener>; 3]>>,
}

impl Listeners {
    /// Creates empty slots.
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, [Option<Listener>; 3]> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers `listener` for `kind`, replacing any previous one.
    pub fn on(&self, kind: ListenerKind, listener: Listener) {
        let mut slots = self.slots();
        if let Some(slot) = slots.get_mut(kind.index()) {
            slot.take();
            *slot = Some(listener);
        }
    }

    /// Removes the listener for `kind`, if any.
    pub fn off(&self, kind: ListenerKind) {
        if let Some(slot) = self.slots().get_mut(kind.index()) {
            slot.take();
        }
    }

    /// Removes every listener.
    pub fn clear(&self) {
        for slot in self.slots().iter_mut() {
            slot.take();
        }
    }

    /// Returns `true` if a listener is registered for `kind`.
    pub fn is_attached(&self, kind: ListenerKind) -> bool {
        self.slots()
            .get(kind.index())
            .is_some_and(|slot| slot.is_some())
    }

    /// Delivers `signal` to the matching listener, if one is attached.
    ///
    /// The slot lock is released before the callback runs, so a callback may
    /// itself register or clear listeners.
    pub fn emit(&self, signal: LinkSignal) {
        let listener = self
            .slots()
            .get(signal.kind().index())
            .and_then(|slot| slot.clone());
        if let Some(listener) = listener {
            listener(&signal);
        }
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("data", &self.is_attached(ListenerKind::Data))
            .field("error", &self.is_attached(ListenerKind::Error))
            .field("close", &self.is_attached(ListenerKind::Close))
            .finish()
    }
}
