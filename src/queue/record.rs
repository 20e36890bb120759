use crate::job::CrawlJob;
use crate::queue::{QueueError, QueueResult};
use crate::state::RecordStatus;
use rusqlite::Row;
use serde_json::Value;

/// A job as stored in the queue
#[derive(Debug, Clone)]
pub struct QueueRecord {
    /// Insertion index, never reused
    pub index: i64,
    pub status: RecordStatus,
    /// Parallelism group, the job's domain
    pub group: Option<String>,
    pub job: CrawlJob,
}

/// Columns selected by every record query, in [`RawRecord::from_row`] order
pub(crate) const RECORD_COLUMNS: &str =
    "idx, status, id, url, group_key, depth, spider, priority, data, parent";

/// Row values before status and data are decoded
pub(crate) struct RawRecord {
    index: i64,
    status: String,
    id: String,
    url: String,
    group: Option<String>,
    depth: u32,
    spider: Option<String>,
    priority: i64,
    data: Option<String>,
    parent: Option<String>,
}

impl RawRecord {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            index: row.get(0)?,
            status: row.get(1)?,
            id: row.get(2)?,
            url: row.get(3)?,
            group: row.get(4)?,
            depth: row.get(5)?,
            spider: row.get(6)?,
            priority: row.get(7)?,
            data: row.get(8)?,
            parent: row.get(9)?,
        })
    }

    pub(crate) fn into_record(self) -> QueueResult<QueueRecord> {
        let status =
            RecordStatus::from_db_string(&self.status).ok_or_else(|| QueueError::CorruptRecord {
                index: self.index,
                reason: format!("unknown status '{}'", self.status),
            })?;

        let data = self
            .data
            .as_deref()
            .map(serde_json::from_str::<Value>)
            .transpose()?;

        Ok(QueueRecord {
            index: self.index,
            status,
            group: self.group,
            job: CrawlJob::restore(
                self.id,
                self.url,
                self.depth,
                self.spider,
                data,
                self.parent,
                self.priority,
            ),
        })
    }
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
