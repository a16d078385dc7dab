//! Storage module for crawl history and frontier queues
//!
//! This module holds the records the engine persists and two backends for them:
//! - In-memory stores, the engine's default
//! - SQLite stores, for crawls that should survive the process

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::{MemoryFrontierQueue, MemoryHistoryStore};
pub use sqlite::{open_connection, SqliteFrontierQueue, SqliteHistoryStore};
pub use traits::{FrontierQueue, HistoryStore, StorageError, StorageResult};

use chrono::{DateTime, Utc};

/// A canonical URL the crawl has admitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Store-generated, monotonically increasing id
    pub id: i64,
    /// Canonical form of the URL
    pub url: String,
    /// When the URL was first admitted
    pub timestamp: DateTime<Utc>,
}

/// A unit of pending crawl work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// Canonical form of the URL to process
    pub url: String,
    /// Identifies the seed or submission that spawned this branch
    pub root_page_id: i64,
    /// History entry of the page this URL was found on (`None` for seeds)
    pub parent: Option<HistoryEntry>,
    pub depth: u32,
    /// Lower values are popped first
    pub priority: i8,
    /// When the entry was enqueued
    pub timestamp: DateTime<Utc>,
}

impl QueueEntry {
    /// Creates a depth-zero entry for a seed or submitted URL
    pub fn root(url: impl Into<String>, root_page_id: i64, priority: i8) -> Self {
        Self {
            url: url.into(),
            root_page_id,
            parent: None,
            depth: 0,
            priority,
            timestamp: Utc::now(),
        }
    }

    /// Creates an entry for a URL found on `parent`, in the same branch as `from`
    pub fn child(url: impl Into<String>, from: &QueueEntry, parent: &HistoryEntry, depth: u32) -> Self {
        Self {
            url: url.into(),
            root_page_id: from.root_page_id,
            parent: Some(parent.clone()),
            depth,
            priority: from.priority,
            timestamp: Utc::now(),
        }
    }
}
