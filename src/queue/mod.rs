//! Persistent crawl queue
//!
//! This module provides the work queue the crawler drains:
//! - Priority ordering with FIFO or LIFO tie-breaking
//! - Group-based admission (at most N `doing` records per group)
//! - Acknowledgement tracking (`ready -> doing -> done | failed`)
//! - SQLite persistence with resume support
//! - Run bookkeeping for the command-line tool

mod record;
mod schema;
mod sqlite;

pub use record::{QueueRecord, RunRecord, RunStatus};
pub use schema::{initialize_schema, SCHEMA_VERSION};
pub use sqlite::CrawlerQueue;

use crate::state::RecordStatus;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the queue
///
/// None of these are recoverable from the crawler's point of view: they
/// mean the persisted state and the in-process view disagree.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Job {id} is {status}, only doing jobs can be acknowledged")]
    NotDoing { id: String, status: RecordStatus },

    #[error("Job {0} is not in the queue")]
    UnknownJob(String),

    #[error("Queue is closed")]
    Closed,

    #[error("Queue schema version {found} is not supported (expected {expected})")]
    SchemaVersion { found: i64, expected: i64 },

    #[error("Corrupt queue record {index}: {reason}")]
    CorruptRecord { index: i64, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Queue lock poisoned")]
    Poisoned,
}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// How a [`CrawlerQueue`] is opened and scheduled
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Database file; `None` keeps the queue in memory
    pub path: Option<PathBuf>,

    /// Keep the records of a previous run instead of clearing them
    pub resume: bool,

    /// Dequeue equal-priority records newest first
    pub lifo: bool,

    /// Maximum `doing` records per group; `None` means unlimited
    pub group_parallelism: Option<usize>,

    /// Per-group exceptions to `group_parallelism`
    pub group_parallelism_overrides: HashMap<String, usize>,

    /// Acknowledgements between two automatic cleanups
    pub cleanup_interval: usize,

    /// Open for inspection: records are neither cleared nor reverted
    pub inspect: bool,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            path: None,
            resume: false,
            lifo: false,
            group_parallelism: None,
            group_parallelism_overrides: HashMap::new(),
            cleanup_interval: 1000,
            inspect: false,
        }
    }
}

impl QueueOptions {
    /// Options for a queue that lives in memory
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Options for a queue stored in `path`
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Options for looking at a stored queue without altering its records
    pub fn inspect(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            resume: true,
            inspect: true,
            ..Self::default()
        }
    }

    pub fn resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn lifo(mut self, lifo: bool) -> Self {
        self.lifo = lifo;
        self
    }

    pub fn group_parallelism(mut self, parallelism: usize) -> Self {
        self.group_parallelism = Some(parallelism);
        self
    }

    pub fn group_parallelism_override(mut self, group: impl Into<String>, parallelism: usize) -> Self {
        self.group_parallelism_overrides
            .insert(group.into(), parallelism);
        self
    }

    pub fn cleanup_interval(mut self, interval: usize) -> Self {
        self.cleanup_interval = interval.max(1);
        self
    }

    /// Parallelism cap of `group`, `None` when unlimited
    pub fn parallelism_for(&self, group: &str) -> Option<usize> {
        self.group_parallelism_overrides
            .get(group)
            .copied()
            .or(self.group_parallelism)
    }
}
