//! Storage traits and error types
//!
//! This module defines the two store contracts the crawl engine depends on:
//! a history of every canonical URL ever admitted, and a frontier queue shard
//! holding entries waiting to be processed.

use crate::storage::{HistoryEntry, QueueEntry};
use crate::url::CanonicalUrl;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Record of every canonical URL the crawl has admitted
///
/// Implementations must be safe to share between workers. Entries are created
/// once per canonical URL and only removed by [`clear_history`](Self::clear_history).
pub trait HistoryStore: Send + Sync {
    /// Returns true if the URL's canonical form is already recorded
    fn has_been_seen(&self, url: &CanonicalUrl) -> StorageResult<bool>;

    /// Records the URL and returns its history entry
    ///
    /// Inserting a URL that is already present returns the existing entry.
    fn insert(&self, url: &CanonicalUrl) -> StorageResult<HistoryEntry>;

    /// Records the URL only if it has not been seen
    ///
    /// # Returns
    ///
    /// * `Ok(Some(entry))` - The URL was new and is now recorded
    /// * `Ok(None)` - The URL was already in history
    ///
    /// The default implementation is a separate check and insert; stores
    /// shared by several workers should override it with an atomic version.
    fn insert_if_unseen(&self, url: &CanonicalUrl) -> StorageResult<Option<HistoryEntry>> {
        if self.has_been_seen(url)? {
            return Ok(None);
        }
        self.insert(url).map(Some)
    }

    /// Purges entries recorded strictly before `before`
    ///
    /// Returns the number of entries removed.
    fn clear_history(&self, before: DateTime<Utc>) -> StorageResult<usize>;
}

/// One shard of the crawl frontier
///
/// Entries pop lowest priority value first, then in insertion order.
pub trait FrontierQueue: Send + Sync {
    /// Stores the entries and returns what was stored
    fn push(&self, entries: Vec<QueueEntry>) -> StorageResult<Vec<QueueEntry>>;

    /// Removes and returns up to `n` entries
    ///
    /// Never blocks waiting for entries; an empty result means the shard is
    /// currently empty.
    fn pop(&self, n: usize) -> StorageResult<Vec<QueueEntry>>;

    /// Number of entries currently queued
    fn len(&self) -> StorageResult<usize>;

    /// Returns true if nothing is queued
    fn is_empty(&self) -> StorageResult<bool> {
        self.len().map(|len| len == 0)
    }

    /// Removes every entry spawned by the given root submission
    ///
    /// Returns the number of entries removed.
    fn remove_root(&self, root_page_id: i64) -> StorageResult<usize>;
}
