//! Statistics generation from the queue database
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from a (possibly closed down) crawler queue.

use crate::queue::{CrawlerQueue, QueueResult, RunRecord};
use crate::state::RecordStatus;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::io::{self, Write};

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Records still stored, per status
    pub records_by_status: BTreeMap<RecordStatus, u64>,

    /// Records still stored
    pub total_records: u64,

    /// In-flight jobs per group, as `(in_flight, parallelism)`
    pub worked_groups: BTreeMap<String, (usize, usize)>,

    /// Most recent crawl run
    pub latest_run: Option<RunRecord>,
}

impl CrawlStatistics {
    /// Jobs still waiting or being processed
    pub fn pending(&self) -> u64 {
        self.records_by_status
            .iter()
            .filter(|(status, _)| status.is_pending())
            .map(|(_, count)| count)
            .sum()
    }

    /// Duration of the latest run in seconds, once it finished
    pub fn run_duration_seconds(&self) -> Option<i64> {
        let run = self.latest_run.as_ref()?;
        let started = run.started_at.parse::<DateTime<Utc>>().ok()?;
        let finished = run.finished_at.as_deref()?.parse::<DateTime<Utc>>().ok()?;
        Some((finished - started).num_seconds())
    }
}

/// Loads statistics from a queue
///
/// # Arguments
///
/// * `queue` - An open queue, typically opened with `resume` so nothing is cleared
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(QueueError)` - Failed to query the queue
pub fn load_statistics(queue: &CrawlerQueue) -> QueueResult<CrawlStatistics> {
    let records_by_status = queue.counts_by_status()?;
    let total_records = records_by_status.values().sum();

    Ok(CrawlStatistics {
        records_by_status,
        total_records,
        worked_groups: queue.worked_groups()?,
        latest_run: queue.latest_run()?,
    })
}

/// Writes statistics in a human readable layout
pub fn write_statistics<W: Write>(stats: &CrawlStatistics, out: &mut W) -> io::Result<()> {
    writeln!(out, "=== Crawl Statistics ===\n")?;

    match &stats.latest_run {
        Some(run) => {
            writeln!(out, "Latest Run:")?;
            writeln!(out, "  Id: {}", run.id)?;
            writeln!(out, "  Status: {}", run.status.to_db_string())?;
            writeln!(out, "  Started: {}", run.started_at)?;
            if let Some(finished) = &run.finished_at {
                writeln!(out, "  Finished: {}", finished)?;
            }
            if let Some(seconds) = stats.run_duration_seconds() {
                writeln!(out, "  Duration: {}s", seconds)?;
            }
            if !run.config_hash.is_empty() {
                writeln!(out, "  Config hash: {}", run.config_hash)?;
            }
        }
        None => writeln!(out, "No crawl run recorded")?,
    }
    writeln!(out)?;

    writeln!(out, "Records by Status:")?;
    for (status, count) in &stats.records_by_status {
        let percentage = if stats.total_records > 0 {
            (*count as f64 / stats.total_records as f64) * 100.0
        } else {
            0.0
        };
        writeln!(out, "  {}: {} ({:.1}%)", status, count, percentage)?;
    }
    writeln!(out, "  Pending: {}", stats.pending())?;

    if !stats.worked_groups.is_empty() {
        writeln!(out)?;
        writeln!(out, "Groups in Flight ({}):", stats.worked_groups.len())?;
        for (group, (in_flight, cap)) in &stats.worked_groups {
            writeln!(out, "  - {}: {}/{}", group, in_flight, cap)?;
        }
    }

    Ok(())
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_statistics(stats, &mut out)
}
