//! Batched refresh notifications.

use std::collections::HashSet;

use bridge_traits::TrackKey;
use parking_lot::Mutex;

/// Keys whose records changed but whose listeners were not notified yet.
///
/// Guarded by its own lock, independent of the record write lock.
#[derive(Debug)]
pub struct PendingRefresh {
    keys: Mutex<HashSet<TrackKey>>,
    threshold: usize,
}

impl PendingRefresh {
    pub fn new(threshold: usize) -> Self {
        Self {
            keys: Mutex::new(HashSet::new()),
            threshold: threshold.max(1),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Add `key`. Returns the whole batch when it reached the threshold.
    pub fn insert(&self, key: TrackKey) -> Option<Vec<TrackKey>> {
        let mut keys = self.keys.lock();
        keys.insert(key);
        if keys.len() >= self.threshold {
            Some(keys.drain().collect())
        } else {
            None
        }
    }

    /// Swap the set out if it holds at least `count` keys.
    pub fn take_if_at_least(&self, count: usize) -> Option<Vec<TrackKey>> {
        let mut keys = self.keys.lock();
        if !keys.is_empty() && keys.len() >= count {
            Some(keys.drain().collect())
        } else {
            None
        }
    }

    /// Swap the whole set out.
    pub fn take_all(&self) -> Vec<TrackKey> {
        self.keys.lock().drain().collect()
    }

    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
