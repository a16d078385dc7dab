//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Sumi-Engine database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Every canonical URL the crawl has admitted
CREATE TABLE IF NOT EXISTS history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    timestamp TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_history_timestamp ON history(timestamp);

-- Frontier queue, one logical queue per shard
CREATE TABLE IF NOT EXISTS queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    shard INTEGER NOT NULL,
    url TEXT NOT NULL,
    root_page_id INTEGER NOT NULL,
    parent_id INTEGER,
    parent_url TEXT,
    parent_timestamp TEXT,
    depth INTEGER NOT NULL,
    priority INTEGER NOT NULL,
    timestamp TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_queue_pop ON queue(shard, priority, id);
CREATE INDEX IF NOT EXISTS idx_queue_root ON queue(shard, root_page_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
