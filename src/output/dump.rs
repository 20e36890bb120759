//! Inspection views over the queue records

use crate::queue::QueueRecord;
use serde_json::{json, Value};
use std::collections::HashSet;

/// Formats one `status | depth | url` line per record
pub fn dump_lines(records: &[QueueRecord]) -> Vec<String> {
    records
        .iter()
        .map(|record| {
            format!(
                "{:<6} | {:>3} | {}",
                record.status.to_db_string(),
                record.job.depth(),
                record.job.url()
            )
        })
        .collect()
}

/// Builds the job graph of the records
///
/// Nodes are jobs, edges go from a parent job to the jobs it discovered.
/// Edges whose parent record was already cleaned up are left out.
///
/// # Example
///
/// ```json
/// {
///   "nodes": [{"id": "...", "url": "...", "depth": 0, "status": "done", "spider": null}],
///   "edges": [{"source": "...", "target": "..."}]
/// }
/// ```
pub fn dump_graph(records: &[QueueRecord]) -> Value {
    let ids: HashSet<&str> = records.iter().map(|record| record.job.id()).collect();

    let nodes: Vec<Value> = records
        .iter()
        .map(|record| {
            json!({
                "id": record.job.id(),
                "url": record.job.url(),
                "depth": record.job.depth(),
                "status": record.status.to_db_string(),
                "spider": record.job.spider(),
            })
        })
        .collect();

    let edges: Vec<Value> = records
        .iter()
        .filter_map(|record| {
            let parent = record.job.parent()?;
            ids.contains(parent).then(|| {
                json!({
                    "source": parent,
                    "target": record.job.id(),
                })
            })
        })
        .collect();

    json!({ "nodes": nodes, "edges": edges })
}
