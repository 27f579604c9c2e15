//! Deadline tracking for session expiration.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

use chrono::{DateTime, Utc};

/// Tracks an absolute expiry deadline per key, ordered by deadline.
///
/// Scheduling a key that is already tracked replaces its deadline. Cancelling
/// an untracked key is a no-op.
#[derive(Debug)]
pub struct ExpirationIndex<K> {
    /// Deadline for each tracked key.
    deadlines: HashMap<K, DateTime<Utc>>,

    /// Keys ordered by deadline, for draining due entries without a full scan.
    queue: BTreeSet<(DateTime<Utc>, K)>,
}

impl<K> Default for ExpirationIndex<K> {
    fn default() -> Self {
        Self {
            deadlines: HashMap::new(),
            queue: BTreeSet::new(),
        }
    }
}

impl<K: Clone + Eq + Hash + Ord> ExpirationIndex<K> {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or replace) the deadline for a key.
    pub fn schedule(&mut self, key: K, deadline: DateTime<Utc>) {
        if let Some(previous) = self.deadlines.insert(key.clone(), deadline) {
            self.queue.remove(&(previous, key.clone()));
        }
        self.queue.insert((deadline, key));
    }

    /// Stop tracking a key.
    pub fn cancel(&mut self, key: &K) {
        if let Some(deadline) = self.deadlines.remove(key) {
            self.queue.remove(&(deadline, key.clone()));
        }
    }

    /// Deadline for a key, if tracked.
    pub fn deadline(&self, key: &K) -> Option<DateTime<Utc>> {
        self.deadlines.get(key).copied()
    }

    /// Check whether a key's deadline has passed.
    ///
    /// Untracked keys are considered expired.
    pub fn is_expired(&self, key: &K, now: DateTime<Utc>) -> bool {
        match self.deadlines.get(key) {
            None => true,
            Some(deadline) => *deadline <= now,
        }
    }

    /// Remove and return every key whose deadline is at or before `now`,
    /// earliest first.
    pub fn drain_due(&mut self, now: DateTime<Utc>) -> Vec<K> {
        let mut due = Vec::new();
        while let Some((deadline, _)) = self.queue.first() {
            if *deadline > now {
                break;
            }
            if let Some((_, key)) = self.queue.pop_first() {
                self.deadlines.remove(&key);
                due.push(key);
            }
        }
        due
    }

    /// Get the number of tracked keys.
    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    /// Check if there are no tracked keys.
    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}
