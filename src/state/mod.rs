//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `RecordStatus`: Lifecycle of a queue record (ready, doing, done, failed)
//! - `DomainState`: Per-group request bookkeeping used by the throttle
//! - `CrawlerState`: Shared progress counters and the crawl status machine

mod crawl_state;
mod domain_state;
mod record_status;

// Re-export main types
pub use crawl_state::{CrawlerState, CrawlerStatus, StateSnapshot};
pub use domain_state::DomainState;
pub use record_status::RecordStatus;
