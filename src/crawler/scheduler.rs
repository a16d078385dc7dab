//! Scheduler fanning work across frontier queue shards
//!
//! This module handles:
//! - Sticky shard assignment per referring domain (push affinity)
//! - Round-robin pops across shards with bounded empty-queue polling
//! - Per-shard size limits
//!
//! Each shard synchronizes on its own, so pushes and pops on different shards
//! never wait on each other. Pushes to one shard are serialized so the size
//! check and the insert cannot interleave.

use crate::config::CrawlerConfig;
use crate::storage::{FrontierQueue, QueueEntry, StorageError, StorageResult};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Referring domains remembered for shard affinity
const AFFINITY_CAPACITY: usize = 1000;

/// How long an unused affinity assignment is kept
const AFFINITY_EXPIRE_AFTER: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Copy)]
struct Affinity {
    shard: usize,
    last_access: Instant,
}

/// Scheduler over a fixed set of frontier shards
pub struct Scheduler {
    shards: Vec<Arc<dyn FrontierQueue>>,
    push_locks: Vec<Mutex<()>>,
    affinity: Mutex<LruCache<String, Affinity>>,
    push_selector: AtomicUsize,
    pop_selector: AtomicUsize,
    max_queue_size: usize,
    empty_queue_wait_time: Duration,
}

impl Scheduler {
    /// Creates a scheduler over `shards`
    ///
    /// # Arguments
    ///
    /// * `shards` - The frontier queues to spread work across (at least one)
    /// * `config` - Supplies `max_queue_size` and `empty_queue_wait_time`
    ///
    /// # Returns
    ///
    /// * `Ok(Scheduler)` - Ready to use
    /// * `Err(StorageError)` - No shards were given
    pub fn new(shards: Vec<Arc<dyn FrontierQueue>>, config: &CrawlerConfig) -> StorageResult<Self> {
        if shards.is_empty() {
            return Err(StorageError::Unavailable(
                "scheduler needs at least one frontier shard".to_string(),
            ));
        }

        Ok(Self {
            push_locks: shards.iter().map(|_| Mutex::new(())).collect(),
            shards,
            affinity: Mutex::new(LruCache::new(
                NonZeroUsize::new(AFFINITY_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            )),
            push_selector: AtomicUsize::new(0),
            pop_selector: AtomicUsize::new(0),
            max_queue_size: config.max_queue_size,
            empty_queue_wait_time: config.empty_queue_wait_time(),
        })
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Returns the shard assigned to `referring_domain`
    ///
    /// The first time a domain is seen (or after its assignment expired) it
    /// gets the next shard in round-robin order. Assignment therefore depends
    /// on the order domains show up in, not on the domain string.
    pub fn shard_for(&self, referring_domain: &str) -> usize {
        let mut affinity = self.affinity.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();

        if let Some(assigned) = affinity.get_mut(referring_domain) {
            if now.duration_since(assigned.last_access) < AFFINITY_EXPIRE_AFTER {
                assigned.last_access = now;
                return assigned.shard;
            }
        }

        let shard = self.push_selector.fetch_add(1, Ordering::Relaxed) % self.shards.len();
        affinity.put(
            referring_domain.to_string(),
            Affinity {
                shard,
                last_access: now,
            },
        );
        shard
    }

    /// Pushes entries onto the shard assigned to `referring_domain`
    ///
    /// When `max_queue_size` is set, entries that would overflow the shard
    /// are dropped with a warning.
    ///
    /// # Returns
    ///
    /// The entries actually stored
    pub fn push(&self, referring_domain: &str, mut entries: Vec<QueueEntry>) -> StorageResult<Vec<QueueEntry>> {
        if entries.is_empty() {
            return Ok(entries);
        }

        let index = self.shard_for(referring_domain);
        let shard = &self.shards[index];
        let _guard = self.push_locks[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if self.max_queue_size > 0 {
            let room = self.max_queue_size.saturating_sub(shard.len()?);
            if entries.len() > room {
                tracing::warn!(
                    "Frontier shard {} is full ({} entries), dropping {} of {} entries from {}",
                    index,
                    self.max_queue_size,
                    entries.len() - room,
                    entries.len(),
                    referring_domain
                );
                entries.truncate(room);
            }
        }

        shard.push(entries)
    }

    /// Takes the next entry, sweeping shards round-robin once
    ///
    /// Store failures are logged and treated as an empty shard.
    pub fn try_pop(&self) -> Option<QueueEntry> {
        let count = self.shards.len();
        let start = self.pop_selector.fetch_add(1, Ordering::Relaxed);

        for offset in 0..count {
            let index = (start + offset) % count;
            match self.shards[index].pop(1) {
                Ok(mut popped) => {
                    if let Some(entry) = popped.pop() {
                        return Some(entry);
                    }
                }
                Err(e) => tracing::warn!("Failed to pop from frontier shard {}: {}", index, e),
            }
        }

        None
    }

    /// Takes the next entry, polling until one shows up
    ///
    /// Polls every `1s / shard_count` (at most a tenth of the wait time) until
    /// `empty_queue_wait_time` has passed, then returns `None`. Returns `None`
    /// right away once `cancel` fires.
    pub async fn pop(&self, cancel: &CancellationToken) -> Option<QueueEntry> {
        let deadline = Instant::now() + self.empty_queue_wait_time;
        let interval = self.poll_interval();

        loop {
            if cancel.is_cancelled() {
                return None;
            }
            if let Some(entry) = self.try_pop() {
                return Some(entry);
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }

            tracing::trace!("Frontier empty, polling again in {:?}", interval);
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(interval.min(deadline - now)) => {}
            }
        }
    }

    /// Total entries queued across all shards
    pub fn len(&self) -> StorageResult<usize> {
        self.shards.iter().map(|shard| shard.len()).sum()
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        self.len().map(|len| len == 0)
    }

    /// Removes every queued entry belonging to a root submission
    pub fn remove_root(&self, root_page_id: i64) -> StorageResult<usize> {
        self.shards
            .iter()
            .map(|shard| shard.remove_root(root_page_id))
            .sum()
    }

    fn poll_interval(&self) -> Duration {
        let per_shard = Duration::from_millis(1000u64.div_ceil(self.shards.len() as u64));
        per_shard
            .min(self.empty_queue_wait_time / 10)
            .max(Duration::from_millis(1))
    }
}
