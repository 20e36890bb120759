//! Spider contract and the spiders shipped with the crate
//!
//! A spider decides where a crawl starts and what to do with each fetched
//! page. The crawler never looks inside spider data; it only enqueues the
//! targets a spider returns.

mod links;
mod pattern;
mod prefix;

pub use links::LinkSpider;
pub use pattern::RegexSpider;
pub use prefix::{lru_stems, LruTrie, PrefixSpider, Webentity, WebentityStatus};

use crate::config::{parse_seeds, Config, SpiderConfig, SpiderKind};
use crate::crawler::Response;
use crate::job::{CrawlJob, CrawlTarget};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while building a spider
///
/// These are programming or configuration mistakes and abort the crawl
/// before anything is fetched.
#[derive(Debug, Error)]
pub enum SpiderError {
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid webentity: {0}")]
    InvalidWebentity(String),

    #[error("Invalid spider configuration: {0}")]
    Config(String),
}

/// What a spider extracted from one page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpiderOutput {
    /// Application data, opaque to the crawler
    pub data: Option<Value>,

    /// Follow-up targets; relative URLs are resolved by the crawler
    pub targets: Vec<CrawlTarget>,
}

impl SpiderOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_targets<I, T>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<CrawlTarget>,
    {
        self.targets.extend(targets.into_iter().map(Into::into));
        self
    }
}

/// A crawl strategy
///
/// `process` runs on a blocking thread. An `Err` (or a panic) is reported
/// as an errored result for that job and the crawl goes on.
pub trait Spider: Send + Sync {
    /// Seed targets, called once before anything is dequeued
    fn start(&self) -> Vec<CrawlTarget>;

    /// Handles one fetched job
    ///
    /// # Returns
    ///
    /// * `Ok(Some(output))` - Extracted data and follow-up targets
    /// * `Ok(None)` - No data and no follow-ups
    /// * `Err(_)` - The page could not be processed
    fn process(&self, job: &CrawlJob, response: &Response) -> anyhow::Result<Option<SpiderOutput>>;

    /// Rows for auxiliary structured output
    fn tabulate(&self, _data: &Value) -> Vec<Vec<String>> {
        Vec::new()
    }
}

/// The spiders of a crawl
#[derive(Clone)]
pub enum SpiderSet {
    /// One spider handles every job
    Single(Arc<dyn Spider>),

    /// Jobs are routed by their spider name
    Named(BTreeMap<String, Arc<dyn Spider>>),
}

impl SpiderSet {
    pub fn single(spider: impl Spider + 'static) -> Self {
        Self::Single(Arc::new(spider))
    }

    pub fn named<I, S>(spiders: I) -> Self
    where
        I: IntoIterator<Item = (S, Arc<dyn Spider>)>,
        S: Into<String>,
    {
        Self::Named(
            spiders
                .into_iter()
                .map(|(name, spider)| (name.into(), spider))
                .collect(),
        )
    }

    /// Builds the spiders described by a configuration
    ///
    /// Top-level seeds go to the single spider, or to the named spider they
    /// designate.
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        let seeds = parse_seeds(&config.seeds)?;

        if !config.is_multi_spider() {
            let spider_config = config.spider.clone().unwrap_or_default();
            let mut all_seeds = seeds;
            all_seeds.extend(parse_seeds(&spider_config.seeds)?);
            return Ok(Self::Single(build_spider(&spider_config, all_seeds)?));
        }

        let mut spiders = BTreeMap::new();
        for (name, spider_config) in &config.spiders {
            let mut own_seeds: Vec<CrawlTarget> = seeds
                .iter()
                .filter(|seed| seed.spider() == Some(name.as_str()))
                .cloned()
                .collect();
            own_seeds.extend(parse_seeds(&spider_config.seeds)?);
            spiders.insert(name.clone(), build_spider(spider_config, own_seeds)?);
        }

        Ok(Self::Named(spiders))
    }

    /// Returns true when jobs carry a spider name
    pub fn is_multi(&self) -> bool {
        matches!(self, Self::Named(_))
    }

    pub fn names(&self) -> Vec<&str> {
        match self {
            Self::Single(_) => Vec::new(),
            Self::Named(spiders) => spiders.keys().map(String::as_str).collect(),
        }
    }

    /// Finds the spider responsible for a job
    pub fn resolve(&self, name: Option<&str>) -> Option<Arc<dyn Spider>> {
        match self {
            Self::Single(spider) => Some(Arc::clone(spider)),
            Self::Named(spiders) => name.and_then(|name| spiders.get(name)).cloned(),
        }
    }

    /// Seed targets of every spider
    ///
    /// Seeds of a named spider are tagged with its name unless they already
    /// name one.
    pub fn start(&self) -> Vec<CrawlTarget> {
        match self {
            Self::Single(spider) => spider.start(),
            Self::Named(spiders) => spiders
                .iter()
                .flat_map(|(name, spider)| {
                    spider.start().into_iter().map(move |target| {
                        if target.spider().is_some() {
                            target
                        } else {
                            target.with_spider(name.clone())
                        }
                    })
                })
                .collect(),
        }
    }
}

/// Builds one spider from its configuration
pub fn build_spider(
    config: &SpiderConfig,
    seeds: Vec<CrawlTarget>,
) -> Result<Arc<dyn Spider>, SpiderError> {
    let spider: Arc<dyn Spider> = match config.kind {
        SpiderKind::Links => Arc::new(LinkSpider::new(seeds)),
        SpiderKind::Regex => {
            let pattern = config
                .pattern
                .as_deref()
                .ok_or_else(|| SpiderError::Config("regex spider requires a pattern".to_string()))?;
            Arc::new(
                RegexSpider::new(seeds, pattern, config.follow_pattern.as_deref())?
                    .match_text(config.match_text)
                    .follow_relevant_only(config.follow_relevant_only),
            )
        }
        SpiderKind::Prefix => {
            let entities = config
                .webentities
                .iter()
                .map(|entity| {
                    let status = WebentityStatus::from_config_str(&entity.status).ok_or_else(|| {
                        SpiderError::InvalidWebentity(format!(
                            "'{}' has unknown status '{}'",
                            entity.name, entity.status
                        ))
                    })?;
                    Ok(Webentity::new(&entity.name, entity.prefixes.clone(), status))
                })
                .collect::<Result<Vec<_>, SpiderError>>()?;
            Arc::new(PrefixSpider::new(seeds, entities)?)
        }
    };

    Ok(spider)
}
