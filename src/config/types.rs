use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure for Ripple-Crawl
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Seed targets: URL strings or `{ url, depth, spider, priority, data }` tables
    #[serde(default)]
    pub seeds: Vec<toml::Value>,

    #[serde(default)]
    pub crawler: CrawlerConfig,

    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub output: OutputConfig,

    /// The spider of a single-spider crawl
    #[serde(default)]
    pub spider: Option<SpiderConfig>,

    /// Named spiders of a multi-spider crawl
    #[serde(default)]
    pub spiders: BTreeMap<String, SpiderConfig>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum depth to crawl from seed URLs (unbounded when absent)
    #[serde(rename = "max-depth", default)]
    pub max_depth: Option<u32>,

    /// Number of concurrent workers draining the queue
    #[serde(rename = "max-workers", default = "default_max_workers")]
    pub max_workers: usize,

    /// Maximum number of in-flight jobs per domain
    #[serde(rename = "domain-parallelism", default = "default_domain_parallelism")]
    pub domain_parallelism: usize,

    /// Per-domain parallelism overrides, keyed by domain
    #[serde(rename = "domain-parallelism-overrides", default)]
    pub domain_parallelism_overrides: BTreeMap<String, usize>,

    /// Minimum time between two requests to the same domain (milliseconds)
    #[serde(default)]
    pub throttle: u64,

    /// Dequeue equal-priority jobs newest first
    #[serde(default)]
    pub lifo: bool,

    /// Normalize URLs before checking them against the URL cache
    #[serde(rename = "normalize-urls", default)]
    pub normalize_urls: bool,

    /// Never enqueue the same URL twice
    #[serde(rename = "visit-urls-only-once", default)]
    pub visit_urls_only_once: bool,

    /// Number of acknowledgements between two queue compactions
    #[serde(rename = "cleanup-interval", default = "default_cleanup_interval")]
    pub cleanup_interval: usize,

    /// Resume from the persisted queue instead of starting over
    #[serde(default)]
    pub resume: bool,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// HTTP fetch configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Total request timeout (seconds)
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Connection timeout (seconds)
    #[serde(rename = "connect-timeout", default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Retries for transient transport errors
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Maximum number of redirects followed per job
    #[serde(rename = "max-redirects", default = "default_max_redirects")]
    pub max_redirects: usize,
}

/// Output configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database holding the queue and the URL cache
    ///
    /// Without it both live in memory and the crawl cannot be resumed.
    #[serde(rename = "database-path", default)]
    pub database_path: Option<String>,

    /// Path of the CSV results file (stdout when absent)
    #[serde(rename = "results-path", default)]
    pub results_path: Option<String>,
}

/// Which spider implementation to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpiderKind {
    #[default]
    Links,
    Regex,
    Prefix,
}

/// Spider configuration
///
/// Keys beyond `kind` and `seeds` only apply to some kinds; validation
/// rejects missing required keys.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpiderConfig {
    #[serde(default)]
    pub kind: SpiderKind,

    /// Seeds owned by this spider, in the same shape as the top-level list
    #[serde(default)]
    pub seeds: Vec<toml::Value>,

    /// Relevance pattern (regex)
    #[serde(default)]
    pub pattern: Option<String>,

    /// Only follow links matching this pattern (regex)
    #[serde(rename = "follow-pattern", default)]
    pub follow_pattern: Option<String>,

    /// Match `pattern` against the extracted text instead of the raw body (regex)
    #[serde(rename = "match-text", default)]
    pub match_text: bool,

    /// Only follow links found on relevant pages (regex)
    #[serde(rename = "follow-relevant-only", default)]
    pub follow_relevant_only: bool,

    /// Webentity registry (prefix)
    #[serde(default)]
    pub webentities: Vec<WebentityConfig>,
}

/// A named group of URL prefixes
#[derive(Debug, Clone, Deserialize)]
pub struct WebentityConfig {
    pub name: String,

    /// URL prefixes such as `https://example.com/blog`
    pub prefixes: Vec<String>,

    /// `in`, `out` or `undecided`
    #[serde(default = "default_webentity_status")]
    pub status: String,
}

fn default_max_workers() -> usize {
    8
}

fn default_domain_parallelism() -> usize {
    1
}

fn default_cleanup_interval() -> usize {
    1000
}

fn default_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_retries() -> u32 {
    2
}

fn default_max_redirects() -> usize {
    10
}

fn default_webentity_status() -> String {
    "in".to_string()
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            max_workers: default_max_workers(),
            domain_parallelism: default_domain_parallelism(),
            domain_parallelism_overrides: BTreeMap::new(),
            throttle: 0,
            lifo: false,
            normalize_urls: false,
            visit_urls_only_once: false,
            cleanup_interval: default_cleanup_interval(),
            resume: false,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
            retries: default_retries(),
            max_redirects: default_max_redirects(),
        }
    }
}

impl Config {
    /// Returns true when the crawl runs several named spiders
    pub fn is_multi_spider(&self) -> bool {
        !self.spiders.is_empty()
    }
}
