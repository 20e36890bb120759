use super::CrawlTarget;
use crate::url::domain_of;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;
use uuid::Uuid;

/// One durable unit of crawl work
///
/// Jobs are identified by a random id so that queues written by several
/// process lifetimes never collide; the queue index is used for ordering
/// only. Equality and hashing only look at the id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlJob {
    id: String,
    url: String,
    depth: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    spider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<String>,
    #[serde(default)]
    priority: i64,
    #[serde(skip)]
    domain: OnceLock<Option<String>>,
}

/// Generates a collision-resistant job id (32 lowercase hex characters)
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

impl CrawlJob {
    /// Creates a depth-0 job for `url` with a fresh id
    pub fn new(url: impl Into<String>) -> Self {
        Self::from_target(CrawlTarget::new(url), None)
    }

    /// Turns a target into a job
    ///
    /// Depth is the target's override when it has one, otherwise
    /// `parent.depth + 1`, otherwise 0. The spider name falls back to the
    /// parent's so that follow-ups stay with the spider that found them.
    ///
    /// # Arguments
    ///
    /// * `target` - The target to enqueue; its URL is used as is
    /// * `parent` - The job that discovered the target, if any
    pub fn from_target(target: CrawlTarget, parent: Option<&CrawlJob>) -> Self {
        let depth = target
            .depth()
            .or_else(|| parent.map(|p| p.depth + 1))
            .unwrap_or(0);

        let spider = target
            .spider()
            .map(str::to_string)
            .or_else(|| parent.and_then(|p| p.spider.clone()));

        Self {
            id: generate_id(),
            url: target.url().to_string(),
            depth,
            spider,
            data: target.data().cloned(),
            parent: parent.map(|p| p.id.clone()),
            priority: target.priority(),
            domain: OnceLock::new(),
        }
    }

    /// Rebuilds a job from its persisted fields
    pub(crate) fn restore(
        id: String,
        url: String,
        depth: u32,
        spider: Option<String>,
        data: Option<Value>,
        parent: Option<String>,
        priority: i64,
    ) -> Self {
        Self {
            id,
            url,
            depth,
            spider,
            data,
            parent,
            priority,
            domain: OnceLock::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn spider(&self) -> Option<&str> {
        self.spider.as_deref()
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    /// Domain of the job's URL, computed on first access
    ///
    /// Malformed URLs leave the domain unset instead of failing.
    pub fn domain(&self) -> Option<&str> {
        self.domain.get_or_init(|| domain_of(&self.url)).as_deref()
    }

    /// Key used by the queue for parallelism accounting
    pub fn group(&self) -> Option<&str> {
        self.domain()
    }
}

impl PartialEq for CrawlJob {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CrawlJob {}

impl Hash for CrawlJob {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
