//! Queue database schema
//!
//! `idx` is an AUTOINCREMENT key: SQLite never hands out a value twice, even
//! after the rows holding the highest values were deleted, so records added
//! after a resume always sort after everything seen before.

use crate::queue::{QueueError, QueueResult};
use rusqlite::Connection;

/// Version stored in `PRAGMA user_version`
pub const SCHEMA_VERSION: i64 = 1;

/// SQL schema for the queue database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- One row per queued job
CREATE TABLE IF NOT EXISTS queue (
    idx INTEGER PRIMARY KEY AUTOINCREMENT,
    status TEXT NOT NULL,
    id TEXT NOT NULL,
    url TEXT NOT NULL,
    group_key TEXT,
    depth INTEGER NOT NULL,
    spider TEXT,
    priority INTEGER NOT NULL DEFAULT 0,
    data TEXT,
    parent TEXT
);

CREATE INDEX IF NOT EXISTS idx_queue_status_priority ON queue(status, priority, idx);
CREATE INDEX IF NOT EXISTS idx_queue_id ON queue(id);

-- Dedup keys of every job ever enqueued through put_unseen
CREATE TABLE IF NOT EXISTS urls (url TEXT PRIMARY KEY) WITHOUT ROWID;
"#;

/// Initializes the queue schema, refusing databases written by another version
pub fn initialize_schema(conn: &Connection) -> QueueResult<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if version != 0 && version != SCHEMA_VERSION {
        return Err(QueueError::SchemaVersion {
            found: version,
            expected: SCHEMA_VERSION,
        });
    }

    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute_batch(&format!("PRAGMA user_version = {};", SCHEMA_VERSION))?;
    Ok(())
}
