//! HTTP fetcher implementation
//!
//! This module turns a [`CrawlJob`] into a [`Response`], including:
//! - Building HTTP clients with proper user agent strings
//! - Manual redirect handling with loop detection
//! - Retry logic for transient failures
//! - Error classification into stable slugs

use crate::config::{FetchConfig, UserAgentConfig};
use crate::job::CrawlJob;
use async_trait::async_trait;
use reqwest::{header, redirect::Policy, Client};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use std::error::Error as StdError;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Transport and redirect failures reported by a [`Fetcher`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Connection timed out")]
    ConnectTimeout,

    #[error("Read timed out")]
    ReadTimeout,

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Connection refused")]
    ConnectionRefused,

    #[error("Connection aborted")]
    ConnectionAborted,

    #[error("Connection reset by peer")]
    ConnectionReset,

    #[error("DNS resolution failed: {0}")]
    Dns(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Could not decode response body: {0}")]
    Decode(String),

    #[error("Exceeded {0} redirects")]
    MaxRedirects(usize),

    #[error("Redirect loop through {0}")]
    InfiniteRedirects(String),

    #[error("Invalid redirect target: {0}")]
    InvalidRedirect(String),

    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Short slug used in reports
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidUrl(_) => "invalid-url",
            Self::ConnectTimeout => "connect-timeout",
            Self::ReadTimeout => "read-timeout",
            Self::Tls(_) => "ssl-error",
            Self::ConnectionRefused => "connection-refused",
            Self::ConnectionAborted => "connection-aborted",
            Self::ConnectionReset => "connection-reset",
            Self::Dns(_) => "dns-error",
            Self::Protocol(_) => "protocol-error",
            Self::Decode(_) => "decode-error",
            Self::MaxRedirects(_) => "max-redirects",
            Self::InfiniteRedirects(_) => "infinite-redirects",
            Self::InvalidRedirect(_) => "invalid-redirect",
            Self::Other(_) => "unknown-error",
        }
    }

    /// Returns true for failures worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout
                | Self::ReadTimeout
                | Self::ConnectionAborted
                | Self::ConnectionReset
        )
    }
}

/// A fetched page
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// URL that was requested
    pub url: String,

    /// URL after following redirects
    pub final_url: String,

    /// HTTP status code of the final response
    pub status: u16,

    /// Response headers, names lowercased
    pub headers: BTreeMap<String, String>,

    pub body: Vec<u8>,
}

impl Response {
    /// Creates a response that was not redirected
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) -> Self {
        let url = url.into();
        Self {
            final_url: url.clone(),
            url,
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_final_url(mut self, final_url: impl Into<String>) -> Self {
        self.final_url = final_url.into();
        self
    }

    /// Raw `Content-Type` header
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }

    /// Media type without parameters, lowercased
    pub fn mimetype(&self) -> Option<String> {
        self.content_type()
            .and_then(|ct| ct.split(';').next())
            .map(|mt| mt.trim().to_ascii_lowercase())
            .filter(|mt| !mt.is_empty())
    }

    /// Returns true when the body should be parsed as HTML
    ///
    /// Responses without a content type are sniffed.
    pub fn is_html(&self) -> bool {
        match self.mimetype() {
            Some(mt) => mt == "text/html" || mt == "application/xhtml+xml",
            None => {
                let start = self.text();
                let start = start.trim_start();
                start.starts_with('<')
            }
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8, invalid sequences replaced
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn body_size(&self) -> usize {
        self.body.len()
    }
}

/// The external fetch executor
///
/// Implementations must be safe to call from many workers at once.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, job: &CrawlJob) -> Result<Response, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// Redirects are never followed by the client itself; [`HttpFetcher`]
/// follows them so it can report redirect failures precisely.
///
/// # Example
///
/// ```no_run
/// use ripple_crawl::config::{FetchConfig, UserAgentConfig};
/// use ripple_crawl::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "RippleCrawl".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, &FetchConfig::default()).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    fetch: &FetchConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(format_user_agent(user_agent))
        .timeout(Duration::from_secs(fetch.timeout))
        .connect_timeout(Duration::from_secs(fetch.connect_timeout))
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()
}

/// Format: CrawlerName/Version (+ContactURL; ContactEmail)
pub fn format_user_agent(config: &UserAgentConfig) -> String {
    format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    )
}

/// [`Fetcher`] backed by `reqwest`
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    retries: u32,
    max_redirects: usize,
    retry_delay: Duration,
}

impl HttpFetcher {
    pub fn new(user_agent: &UserAgentConfig, fetch: &FetchConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(user_agent, fetch)?,
            retries: fetch.retries,
            max_redirects: fetch.max_redirects,
            retry_delay: Duration::from_secs(1),
        })
    }

    /// Sets the pause between two attempts of a transient failure
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Fetches a URL, following redirects manually
    ///
    /// # Redirect Handling
    ///
    /// | Condition | Error |
    /// |-----------|-------|
    /// | Location cannot be parsed or is not HTTP(S) | `invalid-redirect` |
    /// | Location already visited in this chain | `infinite-redirects` |
    /// | More than `max-redirects` hops | `max-redirects` |
    ///
    /// A 3xx response without a `Location` header is returned as is.
    pub async fn fetch_url(&self, url: &str) -> Result<Response, FetchError> {
        let requested = url.to_string();
        let mut current = Url::parse(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        let mut visited = HashSet::from([current.to_string()]);
        let mut hops = 0;

        loop {
            let response = self.send_with_retries(&current).await?;
            let status = response.status();

            if status.is_redirection() {
                if let Some(location) = response.headers().get(header::LOCATION) {
                    let location = location
                        .to_str()
                        .map_err(|e| FetchError::InvalidRedirect(e.to_string()))?;
                    let next = current
                        .join(location)
                        .map_err(|e| FetchError::InvalidRedirect(format!("{}: {}", location, e)))?;

                    if next.scheme() != "http" && next.scheme() != "https" {
                        return Err(FetchError::InvalidRedirect(next.to_string()));
                    }

                    if !visited.insert(next.to_string()) {
                        return Err(FetchError::InfiniteRedirects(next.to_string()));
                    }

                    hops += 1;
                    if hops > self.max_redirects {
                        return Err(FetchError::MaxRedirects(self.max_redirects));
                    }

                    debug!("Redirect {} -> {}", current, next);
                    current = next;
                    continue;
                }
            }

            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();

            let body = response.bytes().await.map_err(|e| classify_error(&e))?;

            return Ok(Response {
                url: requested,
                final_url: current.to_string(),
                status: status.as_u16(),
                headers,
                body: body.to_vec(),
            });
        }
    }

    async fn send_with_retries(&self, url: &Url) -> Result<reqwest::Response, FetchError> {
        let mut attempt = 0;

        loop {
            match self.client.get(url.clone()).send().await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    let error = classify_error(&e);
                    if error.is_transient() && attempt < self.retries {
                        attempt += 1;
                        warn!(
                            "Transient error fetching {} ({}), retry {}/{}",
                            url, error, attempt, self.retries
                        );
                        tokio::time::sleep(self.retry_delay).await;
                        continue;
                    }
                    return Err(error);
                }
            }
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, job: &CrawlJob) -> Result<Response, FetchError> {
        self.fetch_url(job.url()).await
    }
}

/// Maps a `reqwest` error onto the fetch error taxonomy
///
/// The underlying `io::Error`, when there is one, is the most reliable
/// signal; the message of the innermost source is used as a fallback.
pub fn classify_error(error: &reqwest::Error) -> FetchError {
    if error.is_timeout() {
        return if error.is_connect() {
            FetchError::ConnectTimeout
        } else {
            FetchError::ReadTimeout
        };
    }

    if error.is_decode() {
        return FetchError::Decode(root_message(error));
    }

    if let Some(io_error) = find_io_error(error) {
        match io_error.kind() {
            io::ErrorKind::ConnectionRefused => return FetchError::ConnectionRefused,
            io::ErrorKind::ConnectionReset => return FetchError::ConnectionReset,
            io::ErrorKind::ConnectionAborted => return FetchError::ConnectionAborted,
            io::ErrorKind::TimedOut => {
                return if error.is_connect() {
                    FetchError::ConnectTimeout
                } else {
                    FetchError::ReadTimeout
                }
            }
            _ => {}
        }
    }

    let message = root_message(error);
    let lowered = message.to_ascii_lowercase();

    if lowered.contains("dns")
        || lowered.contains("lookup address")
        || lowered.contains("name or service not known")
        || lowered.contains("no such host")
    {
        return FetchError::Dns(message);
    }

    if lowered.contains("certificate") || lowered.contains("tls") || lowered.contains("ssl") {
        return FetchError::Tls(message);
    }

    if error.is_body() {
        return FetchError::Decode(message);
    }

    if error.is_connect() {
        return FetchError::ConnectionRefused;
    }

    if error.is_request() {
        return FetchError::Protocol(message);
    }

    FetchError::Other(message)
}

fn find_io_error<'a>(error: &'a (dyn StdError + 'static)) -> Option<&'a io::Error> {
    let mut source = error.source();
    while let Some(err) = source {
        if let Some(io_error) = err.downcast_ref::<io::Error>() {
            return Some(io_error);
        }
        source = err.source();
    }
    None
}

fn root_message(error: &(dyn StdError + 'static)) -> String {
    let mut current: &(dyn StdError + 'static) = error;
    while let Some(next) = current.source() {
        current = next;
    }
    current.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config() -> UserAgentConfig {
        UserAgentConfig {
            crawler_name: "TestCrawler".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        }
    }

    fn test_fetcher() -> HttpFetcher {
        let fetch = FetchConfig {
            timeout: 5,
            connect_timeout: 2,
            retries: 0,
            max_redirects: 3,
        };
        HttpFetcher::new(&create_test_config(), &fetch)
            .unwrap()
            .with_retry_delay(Duration::from_millis(10))
    }

    #[test]
    fn test_user_agent_format() {
        assert_eq!(
            format_user_agent(&create_test_config()),
            "TestCrawler/1.0 (+https://example.com/about; admin@example.com)"
        );
    }

    #[test]
    fn test_response_helpers() {
        let response = Response::new("https://example.com/", 200, "<html></html>")
            .with_header("Content-Type", "Text/HTML; charset=utf-8");

        assert_eq!(response.mimetype(), Some("text/html".to_string()));
        assert!(response.is_html());
        assert!(response.is_success());
        assert_eq!(response.body_size(), 13);
        assert_eq!(response.final_url, "https://example.com/");
    }

    #[test]
    fn test_response_sniffs_html_without_content_type() {
        assert!(Response::new("https://a.com/", 200, "  <p>x</p>").is_html());
        assert!(!Response::new("https://a.com/", 200, "{\"a\":1}").is_html());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(FetchError::ConnectTimeout.code(), "connect-timeout");
        assert_eq!(FetchError::Tls("x".into()).code(), "ssl-error");
        assert_eq!(FetchError::MaxRedirects(3).code(), "max-redirects");
        assert_eq!(FetchError::Other("x".into()).code(), "unknown-error");
        assert!(FetchError::ReadTimeout.is_transient());
        assert!(!FetchError::Dns("x".into()).is_transient());
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("<html><title>Hi</title></html>", "text/html"),
            )
            .mount(&server)
            .await;

        let url = format!("{}/page", server.uri());
        let response = test_fetcher().fetch_url(&url).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.final_url, url);
        assert_eq!(response.mimetype(), Some("text/html".to_string()));
        assert!(response.text().contains("Hi"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_a_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let response = test_fetcher()
            .fetch_url(&format!("{}/missing", server.uri()))
            .await
            .unwrap();
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn test_follows_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_string("moved"))
            .mount(&server)
            .await;

        let old = format!("{}/old", server.uri());
        let response = test_fetcher().fetch_url(&old).await.unwrap();

        assert_eq!(response.url, old);
        assert_eq!(response.final_url, format!("{}/new", server.uri()));
        assert_eq!(response.text(), "moved");
    }

    #[tokio::test]
    async fn test_redirect_loop_detected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/b"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/a"))
            .mount(&server)
            .await;

        let result = test_fetcher().fetch_url(&format!("{}/a", server.uri())).await;
        assert!(matches!(result, Err(FetchError::InfiniteRedirects(_))));
    }

    #[tokio::test]
    async fn test_max_redirects() {
        let server = MockServer::start().await;
        for i in 0..5 {
            Mock::given(method("GET"))
                .and(path(format!("/r{}", i)))
                .respond_with(
                    ResponseTemplate::new(302).insert_header("location", format!("/r{}", i + 1).as_str()),
                )
                .mount(&server)
                .await;
        }

        let result = test_fetcher().fetch_url(&format!("{}/r0", server.uri())).await;
        assert_eq!(result, Err(FetchError::MaxRedirects(3)));
    }

    #[tokio::test]
    async fn test_invalid_redirect_target() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", "ftp://example.com/file"),
            )
            .mount(&server)
            .await;

        let result = test_fetcher().fetch_url(&server.uri()).await;
        assert!(matches!(result, Err(FetchError::InvalidRedirect(_))));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        // Bind then drop a listener to get a port nobody listens on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let result = test_fetcher()
            .fetch_url(&format!("http://127.0.0.1:{}/", port))
            .await;
        assert_eq!(result, Err(FetchError::ConnectionRefused));
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let result = test_fetcher().fetch_url("not a url").await;
        assert!(matches!(result, Err(FetchError::InvalidUrl(_))));
    }
}
