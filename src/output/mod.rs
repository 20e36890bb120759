//! Output module for crawl reports
//!
//! This module handles:
//! - Writing crawl results and spider tables as CSV
//! - Printing queue statistics
//! - Dumping the queue as lines or as a job graph

mod dump;
pub mod stats;
mod writer;

pub use dump::{dump_graph, dump_lines};
pub use stats::{load_statistics, print_statistics, write_statistics, CrawlStatistics};
pub use writer::{ResultWriter, TableWriter};
