//! Subscriber registry
//!
//! Tracks live subscriptions and decides whether a new one is a duplicate.
//! Insert and remove both take the write lock; the duplicate check and the
//! insert happen under one acquisition.

use crate::error::{EventError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Identity of one accepted subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// What the dedup rule compares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionKey {
    /// Logical (unprefixed) topic
    pub topic: String,
    /// Event-name filter, empty for all events
    pub event_name: String,
    /// Caller-supplied group id, empty for the default group
    pub group_id: String,
}

/// Outcome of a registration attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Accepted(SubscriptionId),
    AlreadyRegistered,
}

/// Registry of active subscriptions
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    entries: RwLock<HashMap<SubscriptionId, SubscriptionKey>>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `key` unless it duplicates a live subscription
    ///
    /// A request is a duplicate when an entry with the same topic and event
    /// name exists and the request's own group id is empty. Requests naming a
    /// group are never rejected.
    pub fn register(&self, key: SubscriptionKey) -> Result<Registration> {
        let mut entries = self.entries.write().map_err(|e| {
            EventError::Registry(format!("Subscriber registry lock poisoned: {}", e))
        })?;

        if key.group_id.is_empty() {
            let duplicate = entries
                .values()
                .any(|existing| existing.topic == key.topic && existing.event_name == key.event_name);
            if duplicate {
                return Ok(Registration::AlreadyRegistered);
            }
        }

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        entries.insert(id, key);
        Ok(Registration::Accepted(id))
    }

    /// Remove a subscription; absent ids are ignored
    pub fn unregister(&self, id: SubscriptionId) -> Result<bool> {
        let mut entries = self.entries.write().map_err(|e| {
            EventError::Registry(format!("Subscriber registry lock poisoned: {}", e))
        })?;
        Ok(entries.remove(&id).is_some())
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: SubscriptionId) -> bool {
        self.entries
            .read()
            .map(|entries| entries.contains_key(&id))
            .unwrap_or(false)
    }
}
