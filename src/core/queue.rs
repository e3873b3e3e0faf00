//! # Pending trigger queue.
//!
//! Ordered buffer of triggers that could not be written immediately.
//! Insertion order is delivery order; nothing is deduplicated. The
//! [`LinkManager`](crate::LinkManager) is the only owner and drains it with
//! "pop, write, restore on failure" so an undelivered trigger is never
//! overtaken by a later one.

use std::collections::VecDeque;

use crate::trigger::Trigger;

/// FIFO of undelivered triggers.
#[derive(Debug, Default, Clone)]
pub struct PendingQueue {
    items: VecDeque<Trigger>,
}

impl PendingQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends to the tail and returns the new length.
    pub fn enqueue(&mut self, trigger: Trigger) -> usize {
        self.items.push_back(trigger);
        self.items.len()
    }

    /// Removes the head.
    pub fn pop(&mut self) -> Option<Trigger> {
        self.items.pop_front()
    }

    /// Puts a trigger back at the head after a failed write.
    pub fn restore(&mut self, trigger: Trigger) {
        self.items.push_front(trigger);
    }

    /// Number of queued triggers.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Copy of the queued triggers in delivery order.
    pub fn snapshot(&self) -> Vec<Trigger> {
        self.items.iter().cloned().collect()
    }
}
