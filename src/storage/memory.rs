//! In-memory store implementations
//!
//! Each store guards its data with a single mutex, so two shards never contend
//! with each other.

use crate::storage::traits::{FrontierQueue, HistoryStore, StorageError, StorageResult};
use crate::storage::{HistoryEntry, QueueEntry};
use crate::url::CanonicalUrl;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> StorageResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| StorageError::Unavailable("store lock poisoned".to_string()))
}

#[derive(Debug, Default)]
struct HistoryTable {
    by_url: HashMap<String, HistoryEntry>,
    next_id: i64,
}

impl HistoryTable {
    fn record(&mut self, url: &CanonicalUrl) -> HistoryEntry {
        self.next_id += 1;
        let entry = HistoryEntry {
            id: self.next_id,
            url: url.canonical_form().to_string(),
            timestamp: Utc::now(),
        };
        self.by_url.insert(entry.url.clone(), entry.clone());
        entry
    }
}

/// History store kept in a hash map
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    table: Mutex<HistoryTable>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded URLs
    pub fn len(&self) -> StorageResult<usize> {
        Ok(lock(&self.table)?.by_url.len())
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        self.len().map(|len| len == 0)
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn has_been_seen(&self, url: &CanonicalUrl) -> StorageResult<bool> {
        Ok(lock(&self.table)?.by_url.contains_key(url.canonical_form()))
    }

    fn insert(&self, url: &CanonicalUrl) -> StorageResult<HistoryEntry> {
        let mut table = lock(&self.table)?;
        if let Some(existing) = table.by_url.get(url.canonical_form()) {
            return Ok(existing.clone());
        }
        Ok(table.record(url))
    }

    fn insert_if_unseen(&self, url: &CanonicalUrl) -> StorageResult<Option<HistoryEntry>> {
        let mut table = lock(&self.table)?;
        if table.by_url.contains_key(url.canonical_form()) {
            return Ok(None);
        }
        Ok(Some(table.record(url)))
    }

    fn clear_history(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let mut table = lock(&self.table)?;
        let len_before = table.by_url.len();
        table.by_url.retain(|_, entry| entry.timestamp >= before);
        Ok(len_before - table.by_url.len())
    }
}

/// Heap slot ordering entries by priority, then by arrival
#[derive(Debug)]
struct Queued {
    sequence: u64,
    entry: QueueEntry,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the lowest (priority, sequence) pops first
        (other.entry.priority, other.sequence).cmp(&(self.entry.priority, self.sequence))
    }
}

#[derive(Debug, Default)]
struct QueueTable {
    heap: BinaryHeap<Queued>,
    next_sequence: u64,
}

/// Frontier queue shard kept in a binary heap
#[derive(Debug, Default)]
pub struct MemoryFrontierQueue {
    table: Mutex<QueueTable>,
}

impl MemoryFrontierQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrontierQueue for MemoryFrontierQueue {
    fn push(&self, entries: Vec<QueueEntry>) -> StorageResult<Vec<QueueEntry>> {
        let mut table = lock(&self.table)?;
        for entry in &entries {
            let sequence = table.next_sequence;
            table.next_sequence += 1;
            table.heap.push(Queued {
                sequence,
                entry: entry.clone(),
            });
        }
        Ok(entries)
    }

    fn pop(&self, n: usize) -> StorageResult<Vec<QueueEntry>> {
        let mut table = lock(&self.table)?;
        let mut popped = Vec::with_capacity(n.min(table.heap.len()));
        while popped.len() < n {
            match table.heap.pop() {
                Some(queued) => popped.push(queued.entry),
                None => break,
            }
        }
        Ok(popped)
    }

    fn len(&self) -> StorageResult<usize> {
        Ok(lock(&self.table)?.heap.len())
    }

    fn remove_root(&self, root_page_id: i64) -> StorageResult<usize> {
        let mut table = lock(&self.table)?;
        let len_before = table.heap.len();
        table.heap.retain(|queued| queued.entry.root_page_id != root_page_id);
        Ok(len_before - table.heap.len())
    }
}
