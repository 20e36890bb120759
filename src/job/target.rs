use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

/// Reasons a target description is rejected
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TargetError {
    #[error("Target URL must be a non-empty string, got {0}")]
    InvalidUrl(String),

    #[error("Target depth must be a non-negative integer, got {0}")]
    InvalidDepth(String),

    #[error("Target spider must be a non-empty string, got {0}")]
    InvalidSpider(String),

    #[error("Target priority must be an integer, got {0}")]
    InvalidPriority(String),

    #[error("Target must be a URL string or an object, got {0}")]
    InvalidShape(String),
}

/// Something to crawl, before it is turned into a [`CrawlJob`](super::CrawlJob)
///
/// Targets are immutable once built and are never queued themselves. The URL
/// may be relative when the target comes out of a spider; the crawler
/// resolves it against the final URL of the job that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlTarget {
    url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    depth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    spider: Option<String>,
    #[serde(default)]
    priority: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CrawlTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            depth: None,
            spider: None,
            priority: 0,
            data: None,
        }
    }

    /// Overrides the depth the job would otherwise inherit from its parent
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn with_spider(mut self, spider: impl Into<String>) -> Self {
        self.spider = Some(spider.into());
        self
    }

    /// Lower values are dequeued sooner
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn depth(&self) -> Option<u32> {
        self.depth
    }

    pub fn spider(&self) -> Option<&str> {
        self.spider.as_deref()
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Returns a copy of this target pointing at `url`
    pub(crate) fn with_url(&self, url: String) -> Self {
        Self {
            url,
            ..self.clone()
        }
    }

    /// Checks the target is usable
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the URL is non-blank and the spider name, when set, is non-blank
    /// * `Err(TargetError)` - Describing the first offending field
    pub fn validate(&self) -> Result<(), TargetError> {
        if self.url.trim().is_empty() {
            return Err(TargetError::InvalidUrl(format!("{:?}", self.url)));
        }

        if let Some(spider) = &self.spider {
            if spider.trim().is_empty() {
                return Err(TargetError::InvalidSpider(format!("{:?}", spider)));
            }
        }

        Ok(())
    }

    /// Builds a target from loosely typed JSON
    ///
    /// Accepts either a bare URL string or an object with `url` and the
    /// optional `depth`, `spider`, `priority` and `data` keys. Field types are
    /// checked here, which is where untyped input (config files, spider data)
    /// enters the crawler.
    ///
    /// # Examples
    ///
    /// ```
    /// use ripple_crawl::CrawlTarget;
    /// use serde_json::json;
    ///
    /// let target = CrawlTarget::from_value(json!({"url": "https://example.com", "depth": 2})).unwrap();
    /// assert_eq!(target.depth(), Some(2));
    ///
    /// assert!(CrawlTarget::from_value(json!({"url": 42})).is_err());
    /// ```
    pub fn from_value(value: Value) -> Result<Self, TargetError> {
        let mut object = match value {
            Value::String(url) => {
                let target = Self::new(url);
                target.validate()?;
                return Ok(target);
            }
            Value::Object(object) => object,
            other => return Err(TargetError::InvalidShape(other.to_string())),
        };

        let url = match object.remove("url") {
            Some(Value::String(url)) => url,
            Some(other) => return Err(TargetError::InvalidUrl(other.to_string())),
            None => return Err(TargetError::InvalidUrl("nothing".to_string())),
        };

        let depth = match object.remove("depth") {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => match n.as_u64().and_then(|d| u32::try_from(d).ok()) {
                Some(depth) => Some(depth),
                None => return Err(TargetError::InvalidDepth(n.to_string())),
            },
            Some(other) => return Err(TargetError::InvalidDepth(other.to_string())),
        };

        let spider = match object.remove("spider") {
            None | Some(Value::Null) => None,
            Some(Value::String(name)) => Some(name),
            Some(other) => return Err(TargetError::InvalidSpider(other.to_string())),
        };

        let priority = match object.remove("priority") {
            None | Some(Value::Null) => 0,
            Some(Value::Number(n)) => match n.as_i64() {
                Some(priority) => priority,
                None => return Err(TargetError::InvalidPriority(n.to_string())),
            },
            Some(other) => return Err(TargetError::InvalidPriority(other.to_string())),
        };

        let data = object.remove("data").filter(|v| !v.is_null());

        let target = Self {
            url,
            depth,
            spider,
            priority,
            data,
        };
        target.validate()?;
        Ok(target)
    }
}

impl From<&str> for CrawlTarget {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for CrawlTarget {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

impl From<Url> for CrawlTarget {
    fn from(url: Url) -> Self {
        Self::new(String::from(url))
    }
}
