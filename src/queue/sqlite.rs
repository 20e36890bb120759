//! SQLite-backed crawler queue
//!
//! Every operation takes the single queue lock, so admission decisions on the
//! in-process group counters and the persisted status changes they imply are
//! always applied together.

use crate::job::CrawlJob;
use crate::queue::record::{RawRecord, RECORD_COLUMNS};
use crate::queue::schema::initialize_schema;
use crate::queue::{QueueError, QueueOptions, QueueRecord, QueueResult, RunRecord, RunStatus};
use crate::state::RecordStatus;
use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, trace};

/// Priority-ordered, group-aware work queue with acknowledgements
pub struct CrawlerQueue {
    options: QueueOptions,
    inner: Mutex<QueueInner>,
    /// Woken whenever records are added or released
    notify: Notify,
}

struct QueueInner {
    /// `None` once the queue is closed
    conn: Option<Connection>,
    /// Number of `doing` records per group
    worked_groups: HashMap<String, usize>,
    acks_since_cleanup: usize,
    run_id: Option<i64>,
}

impl QueueInner {
    fn conn(&self) -> QueueResult<&Connection> {
        self.conn.as_ref().ok_or(QueueError::Closed)
    }

    fn conn_mut(&mut self) -> QueueResult<&mut Connection> {
        self.conn.as_mut().ok_or(QueueError::Closed)
    }

    fn release_group(&mut self, group: &str) {
        let remaining = match self.worked_groups.get_mut(group) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            self.worked_groups.remove(group);
        }
    }
}

/// Outcome of one dequeue attempt
enum Poll {
    Job(CrawlJob),
    /// Records remain but none is eligible right now
    Pending,
    /// No `ready` nor `doing` record is left
    Exhausted,
}

impl CrawlerQueue {
    /// Opens (or creates) a queue
    ///
    /// Without `resume` every record of a previous run is discarded. With it,
    /// records left `doing` by an interrupted run become `ready` again.
    ///
    /// # Arguments
    ///
    /// * `options` - Location and scheduling options
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlerQueue)` - The opened queue
    /// * `Err(QueueError)` - The database could not be opened or has an unknown schema
    pub fn open(options: QueueOptions) -> QueueResult<Self> {
        let conn = match &options.path {
            Some(path) => {
                let conn = Connection::open(path)?;
                conn.execute_batch(
                    "
                    PRAGMA journal_mode = WAL;
                    PRAGMA synchronous = NORMAL;
                    PRAGMA temp_store = MEMORY;
                ",
                )?;
                conn
            }
            None => Connection::open_in_memory()?,
        };
        conn.busy_timeout(Duration::from_secs(5))?;
        initialize_schema(&conn)?;

        if options.inspect {
            debug!("Queue opened for inspection");
        } else if options.resume {
            let reverted = conn.execute(
                "UPDATE queue SET status = ?1 WHERE status = ?2",
                params![
                    RecordStatus::Ready.to_db_string(),
                    RecordStatus::Doing.to_db_string()
                ],
            )?;
            if reverted > 0 {
                info!("Resuming queue: {} interrupted jobs are ready again", reverted);
            }
        } else {
            let cleared = conn.execute("DELETE FROM queue", [])?;
            let forgotten = conn.execute("DELETE FROM urls", [])?;
            if cleared > 0 || forgotten > 0 {
                debug!(
                    "Discarded {} records and {} seen URLs from a previous run",
                    cleared, forgotten
                );
            }
        }

        Ok(Self {
            options,
            inner: Mutex::new(QueueInner {
                conn: Some(conn),
                worked_groups: HashMap::new(),
                acks_since_cleanup: 0,
                run_id: None,
            }),
            notify: Notify::new(),
        })
    }

    /// Opens an in-memory queue with default options
    pub fn in_memory() -> QueueResult<Self> {
        Self::open(QueueOptions::in_memory())
    }

    pub fn options(&self) -> &QueueOptions {
        &self.options
    }

    fn lock(&self) -> QueueResult<MutexGuard<'_, QueueInner>> {
        self.inner.lock().map_err(|_| QueueError::Poisoned)
    }

    // ===== Insertion =====

    /// Adds a job and returns its index
    pub fn put(&self, job: &CrawlJob) -> QueueResult<i64> {
        let index = {
            let inner = self.lock()?;
            insert_job(inner.conn()?, job)?
        };
        self.notify.notify_waiters();
        Ok(index)
    }

    /// Adds several jobs in one transaction and returns their indices
    pub fn put_many<'a, I>(&self, jobs: I) -> QueueResult<Vec<i64>>
    where
        I: IntoIterator<Item = &'a CrawlJob>,
    {
        let indices = {
            let mut inner = self.lock()?;
            let tx = inner.conn_mut()?.transaction()?;
            let mut indices = Vec::new();
            for job in jobs {
                indices.push(insert_job(&tx, job)?);
            }
            tx.commit()?;
            indices
        };

        if !indices.is_empty() {
            self.notify.notify_waiters();
        }
        Ok(indices)
    }

    /// Adds the jobs whose dedup key was never seen before
    ///
    /// Each key goes into the `urls` table in the same transaction as its
    /// job, so a crash can never leave a URL marked as seen without the job
    /// that was meant to crawl it. Keys repeated within `entries` only
    /// enqueue their first job.
    ///
    /// # Arguments
    ///
    /// * `entries` - `(dedup key, job)` pairs
    ///
    /// # Returns
    ///
    /// * `Ok(count)` - Number of jobs enqueued
    /// * `Err(QueueError)` - Nothing was enqueued nor marked as seen
    pub fn put_unseen<'a, I>(&self, entries: I) -> QueueResult<usize>
    where
        I: IntoIterator<Item = (&'a str, &'a CrawlJob)>,
    {
        let added = {
            let mut inner = self.lock()?;
            let tx = inner.conn_mut()?.transaction()?;
            let mut added = 0;
            for (key, job) in entries {
                let fresh = tx
                    .prepare_cached("INSERT OR IGNORE INTO urls (url) VALUES (?1)")?
                    .execute(params![key])?
                    > 0;
                if fresh {
                    insert_job(&tx, job)?;
                    added += 1;
                } else {
                    trace!("Already seen {}", key);
                }
            }
            tx.commit()?;
            added
        };

        if added > 0 {
            self.notify.notify_waiters();
        }
        Ok(added)
    }

    /// Whether `key` was stored by [`put_unseen`](Self::put_unseen)
    pub fn is_seen(&self, key: &str) -> QueueResult<bool> {
        let inner = self.lock()?;
        let seen: bool = inner
            .conn()?
            .prepare_cached("SELECT EXISTS(SELECT 1 FROM urls WHERE url = ?1)")?
            .query_row(params![key], |row| row.get(0))?;
        Ok(seen)
    }

    // ===== Dequeue =====

    /// Takes the next eligible job without waiting
    ///
    /// # Returns
    ///
    /// * `Ok(Some(job))` - The job, now `doing`
    /// * `Ok(None)` - Nothing is eligible (empty queue or every group capped)
    pub fn try_get(&self) -> QueueResult<Option<CrawlJob>> {
        match self.poll()? {
            Poll::Job(job) => Ok(Some(job)),
            Poll::Pending | Poll::Exhausted => Ok(None),
        }
    }

    /// Takes the next eligible job, waiting while work remains
    ///
    /// Returns `Ok(None)` once no `ready` or `doing` record is left, which is
    /// how workers learn that the crawl is over.
    pub async fn get(&self) -> QueueResult<Option<CrawlJob>> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.poll()? {
                Poll::Job(job) => return Ok(Some(job)),
                Poll::Exhausted => return Ok(None),
                Poll::Pending => notified.await,
            }
        }
    }

    fn poll(&self) -> QueueResult<Poll> {
        let mut inner = self.lock()?;

        let capped: Vec<String> = inner
            .worked_groups
            .iter()
            .filter(|(group, count)| {
                self.options
                    .parallelism_for(group)
                    .is_some_and(|cap| **count >= cap)
            })
            .map(|(group, _)| group.clone())
            .collect();

        let exclusion = if capped.is_empty() {
            String::new()
        } else {
            format!(
                " AND (group_key IS NULL OR group_key NOT IN ({}))",
                vec!["?"; capped.len()].join(", ")
            )
        };
        let sql = format!(
            "SELECT {} FROM queue WHERE status = '{}'{} ORDER BY priority ASC, idx {} LIMIT 1",
            RECORD_COLUMNS,
            RecordStatus::Ready.to_db_string(),
            exclusion,
            if self.options.lifo { "DESC" } else { "ASC" }
        );

        let conn = inner.conn()?;
        let raw = conn
            .prepare_cached(&sql)?
            .query_row(params_from_iter(capped.iter()), RawRecord::from_row)
            .optional()?;

        let Some(raw) = raw else {
            let pending = count_pending(conn)?;
            if pending == 0 {
                return Ok(Poll::Exhausted);
            }
            trace!(
                "No eligible job: {} pending, capped groups {:?}",
                pending,
                capped
            );
            return Ok(Poll::Pending);
        };

        let record = raw.into_record()?;
        conn.execute(
            "UPDATE queue SET status = ?1 WHERE idx = ?2",
            params![RecordStatus::Doing.to_db_string(), record.index],
        )?;

        if let Some(group) = &record.group {
            *inner.worked_groups.entry(group.clone()).or_insert(0) += 1;
        }

        trace!("Dequeued job {} (index {})", record.job.id(), record.index);
        Ok(Poll::Job(record.job))
    }

    // ===== Acknowledgement =====

    /// Marks a `doing` job as done
    pub fn ack(&self, job: &CrawlJob) -> QueueResult<()> {
        self.finish(job, RecordStatus::Done)
    }

    /// Marks a `doing` job as failed
    pub fn fail(&self, job: &CrawlJob) -> QueueResult<()> {
        self.finish(job, RecordStatus::Failed)
    }

    fn finish(&self, job: &CrawlJob, status: RecordStatus) -> QueueResult<()> {
        {
            let mut inner = self.lock()?;
            let conn = inner.conn()?;

            let (index, current, group): (i64, String, Option<String>) = conn
                .query_row(
                    "SELECT idx, status, group_key FROM queue WHERE id = ?1 ORDER BY idx DESC LIMIT 1",
                    params![job.id()],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?
                .ok_or_else(|| QueueError::UnknownJob(job.id().to_string()))?;

            let current =
                RecordStatus::from_db_string(&current).ok_or_else(|| QueueError::CorruptRecord {
                    index,
                    reason: format!("unknown status '{}'", current),
                })?;

            if !current.can_transition_to(status) {
                return Err(QueueError::NotDoing {
                    id: job.id().to_string(),
                    status: current,
                });
            }

            conn.execute(
                "UPDATE queue SET status = ?1 WHERE idx = ?2",
                params![status.to_db_string(), index],
            )?;

            if let Some(group) = group {
                inner.release_group(&group);
            }

            inner.acks_since_cleanup += 1;
            if inner.acks_since_cleanup >= self.options.cleanup_interval {
                inner.acks_since_cleanup = 0;
                let removed = delete_terminal(inner.conn()?)?;
                debug!("Queue cleanup removed {} finished records", removed);
            }
        }

        self.notify.notify_waiters();
        Ok(())
    }

    // ===== Inspection =====

    /// Number of `ready` records
    pub fn qsize(&self) -> QueueResult<usize> {
        let inner = self.lock()?;
        let count: i64 = inner.conn()?.query_row(
            "SELECT COUNT(*) FROM queue WHERE status = ?1",
            params![RecordStatus::Ready.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Number of non-terminal (`ready` or `doing`) records
    pub fn len(&self) -> QueueResult<usize> {
        let inner = self.lock()?;
        Ok(count_pending(inner.conn()?)? as usize)
    }

    pub fn is_empty(&self) -> QueueResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Every record still stored, ordered by index
    pub fn dump(&self) -> QueueResult<Vec<QueueRecord>> {
        let inner = self.lock()?;
        let conn = inner.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM queue ORDER BY idx ASC",
            RECORD_COLUMNS
        ))?;
        let raws = stmt
            .query_map([], RawRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        raws.into_iter().map(RawRecord::into_record).collect()
    }

    /// Record counts per status, every status included
    pub fn counts_by_status(&self) -> QueueResult<BTreeMap<RecordStatus, u64>> {
        let inner = self.lock()?;
        let conn = inner.conn()?;

        let mut counts: BTreeMap<RecordStatus, u64> = RecordStatus::all_statuses()
            .into_iter()
            .map(|status| (status, 0))
            .collect();

        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM queue GROUP BY status")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (status, count) = row?;
            if let Some(status) = RecordStatus::from_db_string(&status) {
                counts.insert(status, count as u64);
            }
        }

        Ok(counts)
    }

    /// Groups with `doing` records, as `(in_flight, parallelism)`
    ///
    /// A parallelism of 0 means the group is not capped.
    pub fn worked_groups(&self) -> QueueResult<BTreeMap<String, (usize, usize)>> {
        let inner = self.lock()?;
        Ok(inner
            .worked_groups
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(group, count)| {
                let cap = self.options.parallelism_for(group).unwrap_or(0);
                (group.clone(), (*count, cap))
            })
            .collect())
    }

    // ===== Maintenance =====

    /// Deletes `done` and `failed` records, returning how many were removed
    pub fn cleanup(&self) -> QueueResult<usize> {
        let mut inner = self.lock()?;
        inner.acks_since_cleanup = 0;
        delete_terminal(inner.conn()?)
    }

    /// Rebuilds the database file to give freed pages back to the OS
    pub fn vacuum(&self) -> QueueResult<()> {
        let inner = self.lock()?;
        inner.conn()?.execute_batch("VACUUM;")?;
        Ok(())
    }

    /// Closes the database; every later operation fails with [`QueueError::Closed`]
    ///
    /// Records still `doing` stay so in the file and become `ready` again
    /// when the queue is resumed.
    pub fn close(&self) -> QueueResult<()> {
        let conn = self.lock()?.conn.take();
        if let Some(conn) = conn {
            conn.close().map_err(|(_, e)| QueueError::Sqlite(e))?;
            debug!("Queue closed");
        }
        self.notify.notify_waiters();
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.conn.is_none())
            .unwrap_or(true)
    }

    // ===== Run Management =====

    /// Records the start of a crawl run
    pub fn begin_run(&self, config_hash: &str) -> QueueResult<i64> {
        let mut inner = self.lock()?;
        let conn = inner.conn()?;
        conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![
                Utc::now().to_rfc3339(),
                config_hash,
                RunStatus::Running.to_db_string()
            ],
        )?;
        let run_id = conn.last_insert_rowid();
        inner.run_id = Some(run_id);
        Ok(run_id)
    }

    /// Records the end of the run started by [`begin_run`](Self::begin_run)
    pub fn finish_run(&self, status: RunStatus) -> QueueResult<()> {
        let inner = self.lock()?;
        if let Some(run_id) = inner.run_id {
            inner.conn()?.execute(
                "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
                params![status.to_db_string(), Utc::now().to_rfc3339(), run_id],
            )?;
        }
        Ok(())
    }

    pub fn latest_run(&self) -> QueueResult<Option<RunRecord>> {
        let inner = self.lock()?;
        let run = inner
            .conn()?
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok(RunRecord {
                        id: row.get(0)?,
                        started_at: row.get(1)?,
                        finished_at: row.get(2)?,
                        config_hash: row.get(3)?,
                        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
                            .unwrap_or(RunStatus::Interrupted),
                    })
                },
            )
            .optional()?;
        Ok(run)
    }
}

fn insert_job(conn: &Connection, job: &CrawlJob) -> QueueResult<i64> {
    let data = job.data().map(serde_json::to_string).transpose()?;

    conn.prepare_cached(
        "INSERT INTO queue (status, id, url, group_key, depth, spider, priority, data, parent)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?
    .execute(params![
        RecordStatus::Ready.to_db_string(),
        job.id(),
        job.url(),
        job.group(),
        job.depth(),
        job.spider(),
        job.priority(),
        data,
        job.parent(),
    ])?;

    Ok(conn.last_insert_rowid())
}

fn count_pending(conn: &Connection) -> QueueResult<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM queue WHERE status IN (?1, ?2)",
        params![
            RecordStatus::Ready.to_db_string(),
            RecordStatus::Doing.to_db_string()
        ],
        |row| row.get(0),
    )?)
}

fn delete_terminal(conn: &Connection) -> QueueResult<usize> {
    Ok(conn.execute(
        "DELETE FROM queue WHERE status IN (?1, ?2)",
        params![
            RecordStatus::Done.to_db_string(),
            RecordStatus::Failed.to_db_string()
        ],
    )?)
}
