//! URL deduplication store
//!
//! A plain set of strings. Whether URLs are normalized before they reach the
//! cache is up to the caller.

mod memory;
mod sqlite;

pub use memory::MemoryUrlCache;
pub use sqlite::SqliteUrlCache;

use thiserror::Error;

/// Errors that can occur in a URL cache
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("URL cache lock poisoned")]
    Poisoned,
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Set of already seen URLs
///
/// Implementations are shared between workers and must be thread-safe.
pub trait UrlCache: Send + Sync {
    /// Adds `url`, returning true if it was not present yet
    fn add(&self, url: &str) -> CacheResult<bool>;

    /// Adds every item, returning how many were not present yet
    fn add_many(&self, urls: &[String]) -> CacheResult<usize> {
        let mut added = 0;
        for url in urls {
            if self.add(url)? {
                added += 1;
            }
        }
        Ok(added)
    }

    fn contains(&self, url: &str) -> CacheResult<bool>;

    fn len(&self) -> CacheResult<usize>;

    fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Every stored URL, in no particular order
    fn items(&self) -> CacheResult<Vec<String>>;

    /// Reclaims unused storage
    fn vacuum(&self) -> CacheResult<()> {
        Ok(())
    }
}
