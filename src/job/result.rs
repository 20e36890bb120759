use super::CrawlJob;
use crate::crawler::{FetchError, Response};
use serde_json::Value;
use thiserror::Error;

/// Why a job produced no usable result
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CrawlError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Spider failed on {url} (job {job_id}): {message}")]
    SpiderProcess {
        job_id: String,
        url: String,
        status: Option<u16>,
        message: String,
    },

    #[error("No spider named '{0}'")]
    UnknownSpider(String),
}

impl CrawlError {
    /// Short slug used in reports
    pub fn code(&self) -> &'static str {
        match self {
            Self::Fetch(e) => e.code(),
            Self::SpiderProcess { .. } => "spider-process-error",
            Self::UnknownSpider(_) => "unknown-spider",
        }
    }
}

/// A job that was fetched and processed
#[derive(Debug, Clone)]
pub struct SuccessfulCrawlResult {
    pub job: CrawlJob,
    pub response: Response,
    /// Whatever the spider extracted
    pub data: Option<Value>,
    /// Number of follow-up targets the spider returned
    pub degree: usize,
}

/// A job that failed while being fetched or processed
#[derive(Debug, Clone)]
pub struct ErroredCrawlResult {
    pub job: CrawlJob,
    pub error: CrawlError,
    /// Present when the failure happened after the fetch
    pub response: Option<Response>,
}

/// Outcome of processing one job
#[derive(Debug, Clone)]
pub enum CrawlResult {
    Success(SuccessfulCrawlResult),
    Error(ErroredCrawlResult),
}

const HEADERS: &[&str] = &[
    "id",
    "parent",
    "spider",
    "depth",
    "url",
    "resolved_url",
    "error",
    "status",
    "mimetype",
    "degree",
    "body_size",
];

impl CrawlResult {
    pub fn job(&self) -> &CrawlJob {
        match self {
            Self::Success(result) => &result.job,
            Self::Error(result) => &result.job,
        }
    }

    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Success(result) => Some(&result.response),
            Self::Error(result) => result.response.as_ref(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Error slug, absent on success
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::Success(_) => None,
            Self::Error(result) => Some(result.error.code()),
        }
    }

    /// Column names of [`as_row`](Self::as_row)
    ///
    /// The `spider` column is only present for multi-spider crawls; the
    /// relative order of the other columns never changes.
    pub fn headers(with_spider: bool) -> Vec<&'static str> {
        HEADERS
            .iter()
            .copied()
            .filter(|h| with_spider || *h != "spider")
            .collect()
    }

    /// Tabular projection used by every report sink
    pub fn as_row(&self, with_spider: bool) -> Vec<String> {
        let job = self.job();
        let response = self.response();

        let mut row = vec![
            job.id().to_string(),
            job.parent().unwrap_or_default().to_string(),
        ];

        if with_spider {
            row.push(job.spider().unwrap_or_default().to_string());
        }

        row.push(job.depth().to_string());
        row.push(job.url().to_string());
        row.push(
            response
                .map(|r| r.final_url.clone())
                .unwrap_or_default(),
        );
        row.push(self.error_code().unwrap_or_default().to_string());
        row.push(response.map(|r| r.status.to_string()).unwrap_or_default());
        row.push(response.and_then(Response::mimetype).unwrap_or_default());
        row.push(match self {
            Self::Success(result) => result.degree.to_string(),
            Self::Error(_) => String::new(),
        });
        row.push(
            response
                .map(|r| r.body_size().to_string())
                .unwrap_or_default(),
        );

        row
    }
}

impl From<SuccessfulCrawlResult> for CrawlResult {
    fn from(result: SuccessfulCrawlResult) -> Self {
        Self::Success(result)
    }
}

impl From<ErroredCrawlResult> for CrawlResult {
    fn from(result: ErroredCrawlResult) -> Self {
        Self::Error(result)
    }
}
