//! Ripple-Crawl: a resumable web crawler engine
//!
//! This crate implements the orchestration core of a long-running crawler:
//! a durable, group-aware work queue with acknowledgement semantics, a URL
//! deduplication store, a pluggable spider contract and the orchestrator
//! that drives them under per-domain throttling and parallelism caps.

pub mod cache;
pub mod config;
pub mod crawler;
pub mod job;
pub mod output;
pub mod queue;
pub mod spider;
pub mod state;
pub mod url;

use thiserror::Error;

/// Main error type for Ripple-Crawl operations
///
/// Everything that reaches this type is fatal for the crawl. Recoverable
/// per-job failures are reported as [`job::CrawlResult::Error`] instead.
#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Queue error: {0}")]
    Queue(#[from] queue::QueueError),

    #[error("URL cache error: {0}")]
    Cache(#[from] cache::CacheError),

    #[error("Spider error: {0}")]
    Spider(#[from] spider::SpiderError),

    #[error("Invalid crawl target: {0}")]
    Target(#[from] job::TargetError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Output error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Crawler was already started")]
    AlreadyStarted,

    #[error("Worker task failed: {0}")]
    Worker(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid pattern in config: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Ripple-Crawl operations
pub type Result<T> = std::result::Result<T, CrawlerError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use cache::{MemoryUrlCache, SqliteUrlCache, UrlCache};
pub use config::Config;
pub use crawler::{CrawlStream, Crawler, CrawlerOptions, Fetcher, HttpFetcher, Response};
pub use job::{CrawlJob, CrawlResult, CrawlTarget};
pub use queue::{CrawlerQueue, QueueOptions};
pub use spider::{Spider, SpiderOutput, SpiderSet};
pub use state::{CrawlerState, CrawlerStatus, RecordStatus};
