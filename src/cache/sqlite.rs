use crate::cache::{CacheError, CacheResult, UrlCache};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

const SCHEMA_SQL: &str = "CREATE TABLE IF NOT EXISTS urls (url TEXT PRIMARY KEY) WITHOUT ROWID;";

/// URL cache stored in an SQLite table
///
/// Survives restarts and is not bounded by memory. Opened on a crawl
/// database it works on the same `urls` table the queue fills through
/// [`CrawlerQueue::put_unseen`](crate::queue::CrawlerQueue::put_unseen).
pub struct SqliteUrlCache {
    conn: Mutex<Connection>,
}

impl SqliteUrlCache {
    /// Opens the cache stored in `path`
    ///
    /// Without `resume` previously stored URLs are forgotten.
    pub fn open(path: &Path, resume: bool) -> CacheResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        ",
        )?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::from_connection(conn, resume)
    }

    /// Creates an in-memory database (for testing)
    pub fn in_memory() -> CacheResult<Self> {
        Self::from_connection(Connection::open_in_memory()?, false)
    }

    fn from_connection(conn: Connection, resume: bool) -> CacheResult<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        if !resume {
            let cleared = conn.execute("DELETE FROM urls", [])?;
            if cleared > 0 {
                debug!("Discarded {} cached URLs from a previous run", cleared);
            }
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> CacheResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| CacheError::Poisoned)
    }
}

impl UrlCache for SqliteUrlCache {
    fn add(&self, url: &str) -> CacheResult<bool> {
        let conn = self.lock()?;
        let inserted = conn
            .prepare_cached("INSERT OR IGNORE INTO urls (url) VALUES (?1)")?
            .execute(params![url])?;
        Ok(inserted > 0)
    }

    fn add_many(&self, urls: &[String]) -> CacheResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut added = 0;
        {
            let mut stmt = tx.prepare_cached("INSERT OR IGNORE INTO urls (url) VALUES (?1)")?;
            for url in urls {
                added += stmt.execute(params![url])?;
            }
        }
        tx.commit()?;
        Ok(added)
    }

    fn contains(&self, url: &str) -> CacheResult<bool> {
        let conn = self.lock()?;
        let found: bool = conn
            .prepare_cached("SELECT EXISTS(SELECT 1 FROM urls WHERE url = ?1)")?
            .query_row(params![url], |row| row.get(0))?;
        Ok(found)
    }

    fn len(&self) -> CacheResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM urls", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn items(&self) -> CacheResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT url FROM urls")?;
        let items = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(items)
    }

    fn vacuum(&self) -> CacheResult<()> {
        self.lock()?.execute_batch("VACUUM;")?;
        Ok(())
    }
}
