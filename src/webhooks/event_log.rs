//! Bounded in-memory journal of inbound webhook events.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::types::WebhookEvent;

/// Number of events kept when no capacity is given.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Thread-safe, capacity-bounded event log.
///
/// Events are stored oldest-first; snapshots come back newest-first.
/// Share it with `Arc<EventLog>`.
#[derive(Debug)]
pub struct EventLog {
    entries: Mutex<VecDeque<WebhookEvent>>,
    capacity: usize,
}

impl EventLog {
    /// Create a log that keeps at most `capacity` events (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY))),
            capacity,
        }
    }

    // Poisoning is ignored: every mutation leaves the deque consistent.
    fn entries(&self) -> MutexGuard<'_, VecDeque<WebhookEvent>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an event.
    ///
    /// Returns `false` without changing anything if an event with the same
    /// id is already logged. At capacity the oldest event is dropped.
    pub fn log(&self, event: WebhookEvent) -> bool {
        let mut entries = self.entries();
        if entries.iter().any(|e| e.id == event.id) {
            tracing::debug!(id = %event.id, "Duplicate webhook event ignored");
            return false;
        }
        if entries.len() >= self.capacity
            && let Some(evicted) = entries.pop_front()
        {
            tracing::debug!(id = %evicted.id, "Event log full, evicted oldest");
        }
        tracing::debug!(
            id = %event.id,
            event_type = %event.event_type,
            source = %event.source,
            "Webhook event logged"
        );
        entries.push_back(event);
        true
    }

    /// Copy of all events, newest first.
    pub fn events(&self) -> Vec<WebhookEvent> {
        self.entries().iter().rev().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<WebhookEvent> {
        self.entries().iter().find(|e| e.id == id).cloned()
    }

    /// Remove the event with `id`. Returns whether one was removed.
    pub fn delete_event(&self, id: &str) -> bool {
        let mut entries = self.entries();
        match entries.iter().position(|e| e.id == id) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove everything, returning how many events were dropped.
    pub fn clear_events(&self) -> usize {
        let mut entries = self.entries();
        let count = entries.len();
        entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
