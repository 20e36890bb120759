//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with redirect and retry handling
//! - HTML parsing and link extraction
//! - Per-domain request throttling
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod parser;
mod scheduler;

pub use coordinator::{CrawlStream, Crawler, CrawlerOptions};
pub use fetcher::{
    build_http_client, classify_error, format_user_agent, FetchError, Fetcher, HttpFetcher,
    Response,
};
pub use parser::{parse_html, ParsedPage};
pub use scheduler::Throttle;

use crate::config::Config;
use crate::job::CrawlResult;

/// Runs a complete crawl and returns every result
///
/// This is the simplest entry point: it builds the crawler from the
/// configuration, starts it and drains the result stream.
///
/// # Arguments
///
/// * `config` - A validated configuration
///
/// # Returns
///
/// * `Ok(results)` - The crawl finished
/// * `Err(CrawlerError)` - The crawl could not start or was aborted
pub async fn crawl(config: &Config) -> crate::Result<Vec<CrawlResult>> {
    Crawler::from_config(config, None)?.start()?.collect().await
}
