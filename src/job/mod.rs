//! Job data model
//!
//! - `CrawlTarget`: a caller- or spider-supplied description of a URL to crawl
//! - `CrawlJob`: the uniquely identified unit of work stored in the queue
//! - `CrawlResult`: the outcome of processing one job

mod crawl_job;
mod result;
mod target;

pub use crawl_job::CrawlJob;
pub use result::{CrawlError, CrawlResult, ErroredCrawlResult, SuccessfulCrawlResult};
pub use target::{CrawlTarget, TargetError};
