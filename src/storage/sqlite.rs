//! SQLite store implementations
//!
//! Every store owns its own connection, so history lookups and pops on
//! different shards only meet at SQLite's own file locking.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{FrontierQueue, HistoryStore, StorageError, StorageResult};
use crate::storage::{HistoryEntry, QueueEntry};
use crate::url::CanonicalUrl;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Opens (or creates) a crawl database and ensures the schema exists
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(Connection)` - Connection with WAL journaling and the schema in place
/// * `Err(rusqlite::Error)` - Failed to open or initialize the database
pub fn open_connection(path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(path)?;

    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA temp_store = MEMORY;
    ",
    )?;
    conn.busy_timeout(Duration::from_secs(5))?;

    initialize_schema(&conn)?;

    Ok(conn)
}

fn lock(conn: &Mutex<Connection>) -> StorageResult<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| StorageError::Unavailable("connection lock poisoned".to_string()))
}

/// Timestamps are stored at microsecond precision in a fixed-width form so
/// that text comparison orders them correctly.
fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("bad timestamp '{}': {}", value, e)))
}

fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// SQLite-backed history store
pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
}

impl SqliteHistoryStore {
    /// Opens the history table in the database at `path`
    pub fn open(path: &Path) -> StorageResult<Self> {
        Ok(Self {
            conn: Mutex::new(open_connection(path)?),
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn find(conn: &Connection, url: &str) -> StorageResult<Option<HistoryEntry>> {
        let row = conn
            .query_row(
                "SELECT id, url, timestamp FROM history WHERE url = ?1",
                params![url],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?)),
            )
            .optional()?;

        row.map(|(id, url, timestamp)| {
            Ok(HistoryEntry {
                id,
                url,
                timestamp: parse_timestamp(&timestamp)?,
            })
        })
        .transpose()
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn has_been_seen(&self, url: &CanonicalUrl) -> StorageResult<bool> {
        let conn = lock(&self.conn)?;
        let found = conn
            .query_row(
                "SELECT 1 FROM history WHERE url = ?1",
                params![url.canonical_form()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn insert(&self, url: &CanonicalUrl) -> StorageResult<HistoryEntry> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT OR IGNORE INTO history (url, timestamp) VALUES (?1, ?2)",
            params![url.canonical_form(), format_timestamp(&now())],
        )?;

        Self::find(&conn, url.canonical_form())?.ok_or_else(|| {
            StorageError::Unavailable(format!("history row for {} vanished", url))
        })
    }

    fn insert_if_unseen(&self, url: &CanonicalUrl) -> StorageResult<Option<HistoryEntry>> {
        let conn = lock(&self.conn)?;
        let timestamp = now();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO history (url, timestamp) VALUES (?1, ?2)",
            params![url.canonical_form(), format_timestamp(&timestamp)],
        )?;

        if inserted == 0 {
            return Ok(None);
        }

        Ok(Some(HistoryEntry {
            id: conn.last_insert_rowid(),
            url: url.canonical_form().to_string(),
            timestamp,
        }))
    }

    fn clear_history(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let conn = lock(&self.conn)?;
        let removed = conn.execute(
            "DELETE FROM history WHERE timestamp < ?1",
            params![format_timestamp(&before)],
        )?;
        Ok(removed)
    }
}

/// Raw queue row before timestamp parsing
struct QueueRow {
    id: i64,
    url: String,
    root_page_id: i64,
    parent_id: Option<i64>,
    parent_url: Option<String>,
    parent_timestamp: Option<String>,
    depth: i64,
    priority: i64,
    timestamp: String,
}

impl QueueRow {
    fn into_entry(self) -> StorageResult<QueueEntry> {
        let parent = match (self.parent_id, self.parent_url, self.parent_timestamp) {
            (Some(id), Some(url), Some(timestamp)) => Some(HistoryEntry {
                id,
                url,
                timestamp: parse_timestamp(&timestamp)?,
            }),
            _ => None,
        };

        Ok(QueueEntry {
            url: self.url,
            root_page_id: self.root_page_id,
            parent,
            depth: u32::try_from(self.depth)
                .map_err(|_| StorageError::Serialization(format!("bad depth {}", self.depth)))?,
            priority: i8::try_from(self.priority).map_err(|_| {
                StorageError::Serialization(format!("bad priority {}", self.priority))
            })?,
            timestamp: parse_timestamp(&self.timestamp)?,
        })
    }
}

/// SQLite-backed frontier queue shard
///
/// Several shards may share one database file; each only sees rows tagged
/// with its own shard index.
pub struct SqliteFrontierQueue {
    conn: Mutex<Connection>,
    shard: i64,
}

impl SqliteFrontierQueue {
    /// Opens shard `shard` of the queue table in the database at `path`
    pub fn open(path: &Path, shard: usize) -> StorageResult<Self> {
        Ok(Self {
            conn: Mutex::new(open_connection(path)?),
            shard: shard as i64,
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory(shard: usize) -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            shard: shard as i64,
        })
    }
}

impl FrontierQueue for SqliteFrontierQueue {
    fn push(&self, entries: Vec<QueueEntry>) -> StorageResult<Vec<QueueEntry>> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO queue (shard, url, root_page_id, parent_id, parent_url, parent_timestamp, depth, priority, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for entry in &entries {
                let parent = entry.parent.as_ref();
                stmt.execute(params![
                    self.shard,
                    entry.url,
                    entry.root_page_id,
                    parent.map(|p| p.id),
                    parent.map(|p| p.url.as_str()),
                    parent.map(|p| format_timestamp(&p.timestamp)),
                    entry.depth as i64,
                    entry.priority as i64,
                    format_timestamp(&entry.timestamp),
                ])?;
            }
        }
        tx.commit()?;
        Ok(entries)
    }

    fn pop(&self, n: usize) -> StorageResult<Vec<QueueEntry>> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;

        let rows = {
            let mut stmt = tx.prepare(
                "SELECT id, url, root_page_id, parent_id, parent_url, parent_timestamp, depth, priority, timestamp
                 FROM queue WHERE shard = ?1 ORDER BY priority, id LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![self.shard, n as i64], |row| {
                    Ok(QueueRow {
                        id: row.get(0)?,
                        url: row.get(1)?,
                        root_page_id: row.get(2)?,
                        parent_id: row.get(3)?,
                        parent_url: row.get(4)?,
                        parent_timestamp: row.get(5)?,
                        depth: row.get(6)?,
                        priority: row.get(7)?,
                        timestamp: row.get(8)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        for row in &rows {
            tx.execute("DELETE FROM queue WHERE id = ?1", params![row.id])?;
        }
        tx.commit()?;

        rows.into_iter().map(QueueRow::into_entry).collect()
    }

    fn len(&self) -> StorageResult<usize> {
        let conn = lock(&self.conn)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM queue WHERE shard = ?1",
            params![self.shard],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn remove_root(&self, root_page_id: i64) -> StorageResult<usize> {
        let conn = lock(&self.conn)?;
        let removed = conn.execute(
            "DELETE FROM queue WHERE shard = ?1 AND root_page_id = ?2",
            params![self.shard, root_page_id],
        )?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn url(raw: &str) -> CanonicalUrl {
        CanonicalUrl::parse(raw, None).unwrap()
    }

    #[test]
    fn test_insert_if_unseen() {
        let store = SqliteHistoryStore::open_in_memory().unwrap();
        let page = url("http://a.test/");

        let entry = store.insert_if_unseen(&page).unwrap().unwrap();
        assert!(entry.id > 0);
        assert_eq!(entry.url, "http://a.test/");
        assert!(store.has_been_seen(&page).unwrap());
        assert!(store.insert_if_unseen(&page).unwrap().is_none());
    }

    #[test]
    fn test_insert_returns_stored_entry() {
        let store = SqliteHistoryStore::open_in_memory().unwrap();
        let first = store.insert_if_unseen(&url("http://a.test/x")).unwrap().unwrap();
        let again = store.insert(&url("http://A.test:80/x")).unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn test_clear_history() {
        let store = SqliteHistoryStore::open_in_memory().unwrap();
        store.insert(&url("http://a.test/1")).unwrap();
        store.insert(&url("http://a.test/2")).unwrap();

        let past = Utc::now() - chrono::Duration::hours(1);
        assert_eq!(store.clear_history(past).unwrap(), 0);

        let future = Utc::now() + chrono::Duration::seconds(1);
        assert_eq!(store.clear_history(future).unwrap(), 2);
        assert!(!store.has_been_seen(&url("http://a.test/1")).unwrap());
    }

    #[test]
    fn test_queue_preserves_entry_fields() {
        let queue = SqliteFrontierQueue::open_in_memory(0).unwrap();
        let root = QueueEntry::root("http://a.test/", 4, 1);
        let parent = HistoryEntry {
            id: 9,
            url: "http://a.test/".to_string(),
            timestamp: now(),
        };
        let child = QueueEntry::child("http://a.test/b", &root, &parent, 1);
        queue.push(vec![child.clone()]).unwrap();

        let popped = queue.pop(1).unwrap();
        assert_eq!(popped.len(), 1);
        assert_eq!(popped[0].url, child.url);
        assert_eq!(popped[0].root_page_id, 4);
        assert_eq!(popped[0].depth, 1);
        assert_eq!(popped[0].priority, 1);
        assert_eq!(popped[0].parent, Some(parent));
    }

    #[test]
    fn test_queue_priority_order_and_removal() {
        let queue = SqliteFrontierQueue::open_in_memory(0).unwrap();
        queue
            .push(vec![
                QueueEntry::root("http://a.test/late", 1, 3),
                QueueEntry::root("http://a.test/urgent", 1, -2),
                QueueEntry::root("http://a.test/late2", 1, 3),
            ])
            .unwrap();

        let first = queue.pop(1).unwrap();
        assert_eq!(first[0].url, "http://a.test/urgent");
        assert_eq!(queue.len().unwrap(), 2);

        let rest: Vec<String> = queue.pop(10).unwrap().into_iter().map(|e| e.url).collect();
        assert_eq!(rest, vec!["http://a.test/late", "http://a.test/late2"]);
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn test_shards_share_a_file_without_mixing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crawl.db");
        let shard0 = SqliteFrontierQueue::open(&path, 0).unwrap();
        let shard1 = SqliteFrontierQueue::open(&path, 1).unwrap();

        shard0.push(vec![QueueEntry::root("http://a.test/", 1, 0)]).unwrap();
        shard1.push(vec![QueueEntry::root("http://b.test/", 2, 0)]).unwrap();

        assert_eq!(shard0.len().unwrap(), 1);
        assert_eq!(shard1.remove_root(1).unwrap(), 0);
        assert_eq!(shard1.remove_root(2).unwrap(), 1);
        assert_eq!(shard0.pop(5).unwrap()[0].url, "http://a.test/");
    }

    #[test]
    fn test_history_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crawl.db");

        {
            let store = SqliteHistoryStore::open(&path).unwrap();
            store.insert(&url("http://a.test/kept")).unwrap();
        }

        let reopened = SqliteHistoryStore::open(&path).unwrap();
        assert!(reopened.has_been_seen(&url("http://a.test/kept")).unwrap());
    }
}
