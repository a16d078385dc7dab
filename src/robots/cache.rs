//! Robots.txt decision cache
//!
//! Capacity-bounded LRU with expire-after-access. Each slot holds a
//! once-cell, so concurrent lookups for a host that is not cached yet share a
//! single robots.txt fetch.

use crate::robots::RobotsRules;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

/// A cache slot, filled at most once
pub type RulesCell = Arc<OnceCell<Arc<RobotsRules>>>;

#[derive(Debug)]
struct CacheSlot {
    rules: RulesCell,
    last_access: Instant,
}

/// Per-origin cache of compiled robots.txt rules
#[derive(Debug)]
pub struct RobotsCache {
    entries: Mutex<LruCache<String, CacheSlot>>,
    expire_after: Duration,
}

impl RobotsCache {
    /// Creates a cache holding at most `capacity` origins
    ///
    /// An entry not accessed for `expire_after` is dropped on its next lookup.
    pub fn new(capacity: usize, expire_after: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            expire_after,
        }
    }

    /// Returns the slot for `key`, creating an empty one on miss or expiry
    pub fn slot(&self, key: &str) -> RulesCell {
        // A poisoned lock only means another worker panicked mid-lookup; the map is still usable
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();

        if let Some(slot) = entries.get_mut(key) {
            if now.duration_since(slot.last_access) < self.expire_after {
                slot.last_access = now;
                return Arc::clone(&slot.rules);
            }
        }

        let rules: RulesCell = Arc::new(OnceCell::new());
        entries.put(
            key.to_string(),
            CacheSlot {
                rules: Arc::clone(&rules),
                last_access: now,
            },
        );
        rules
    }

    /// Number of cached origins, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
