//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end.

use ripple_crawl::config::{parse_config, Config};
use ripple_crawl::job::CrawlJob;
use ripple_crawl::queue::{CrawlerQueue, QueueOptions, RunStatus};
use ripple_crawl::state::CrawlerStatus;
use ripple_crawl::url::normalize_url;
use ripple_crawl::{CrawlResult, Crawler};
use std::collections::HashSet;
use std::path::Path;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration crawling `seed`
fn create_test_config(seed: &str, extra: &str, db_path: Option<&Path>) -> Config {
    let output = match db_path {
        Some(path) => format!("[output]\ndatabase-path = \"{}\"\n", path.display()),
        None => String::new(),
    };

    parse_config(&format!(
        r#"
seeds = ["{seed}"]

[crawler]
max-workers = 4
visit-urls-only-once = true
normalize-urls = true
{extra}

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[fetch]
timeout = 5
connect-timeout = 2

{output}
"#
    ))
    .expect("Invalid test configuration")
}

async fn mount_page(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body, "text/html"),
        )
        .mount(server)
        .await;
}

/// Serves `/` -> {`/page1`, `/page2`}, `/page1` -> {`/`, `/page3`}
async fn start_site() -> MockServer {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/",
        format!(
            r#"<html><head><title>Home</title></head><body>
            <a href="{base}/page1">Page 1</a>
            <a href="/page2">Page 2</a>
            <a href="page1#top">Page 1 again</a>
            </body></html>"#
        ),
    )
    .await;
    mount_page(
        &server,
        "/page1",
        r#"<html><body><a href="/">Home</a><a href="/page3">Page 3</a></body></html>"#.to_string(),
    )
    .await;
    mount_page(&server, "/page2", "<html><body>Content 2</body></html>".to_string()).await;
    mount_page(&server, "/page3", "<html><body>Content 3</body></html>".to_string()).await;

    server
}

async fn run(config: &Config) -> (Crawler, Vec<CrawlResult>) {
    let crawler = Crawler::from_config(config, Some("test-hash".to_string()))
        .expect("Failed to build crawler");
    let results = crawler
        .start()
        .expect("Failed to start crawler")
        .collect()
        .await
        .expect("Crawl failed");
    (crawler, results)
}

#[tokio::test]
async fn test_full_crawl_max_depth_one() {
    let server = start_site().await;
    let base = server.uri();
    let config = create_test_config(&format!("{}/", base), "max-depth = 1", None);

    let (crawler, results) = run(&config).await;

    // The seed, then one result per unique link at depth 1
    assert_eq!(results.len(), 3, "results: {:?}", results);

    let seeds: Vec<&CrawlResult> = results.iter().filter(|r| r.job().depth() == 0).collect();
    assert_eq!(seeds.len(), 1);
    assert_eq!(seeds[0].job().url(), format!("{}/", base));

    let urls: HashSet<&str> = results.iter().map(|r| r.job().url()).collect();
    assert_eq!(urls.len(), results.len(), "a URL was crawled twice");
    assert!(urls.contains(format!("{}/page1", base).as_str()));
    assert!(urls.contains(format!("{}/page2", base).as_str()));

    for result in &results {
        assert!(result.is_success(), "unexpected error: {:?}", result.error_code());
        if result.job().depth() == 1 {
            assert_eq!(result.job().parent(), Some(seeds[0].job().id()));
        }
    }

    let state = crawler.state();
    assert_eq!(state.status, CrawlerStatus::Finished);
    assert_eq!(state.jobs_done, 3);
    assert_eq!(state.jobs_failed, 0);
}

#[tokio::test]
async fn test_full_crawl_unbounded_depth() {
    let server = start_site().await;
    let config = create_test_config(&format!("{}/", server.uri()), "", None);

    let (_, results) = run(&config).await;

    assert_eq!(results.len(), 4);
    let page3 = results
        .iter()
        .find(|r| r.job().url().ends_with("/page3"))
        .expect("page3 not crawled");
    assert_eq!(page3.job().depth(), 2);
}

#[tokio::test]
async fn test_fetch_failures_are_reported() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_page(
        &server,
        "/",
        r#"<a href="/missing">missing</a><a href="http://127.0.0.1:1/">down</a>"#.to_string(),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let config = create_test_config(&format!("{}/", base), "max-depth = 1", None);
    let (crawler, results) = run(&config).await;
    assert_eq!(results.len(), 3);

    let missing = results
        .iter()
        .find(|r| r.job().url().ends_with("/missing"))
        .expect("missing page not reported");
    assert!(missing.is_success());
    assert_eq!(missing.response().map(|r| r.status), Some(404));

    let down = results
        .iter()
        .find(|r| r.job().url().starts_with("http://127.0.0.1:1"))
        .expect("unreachable page not reported");
    assert_eq!(down.error_code(), Some("connection-refused"));

    assert_eq!(crawler.state().jobs_failed, 1);
}

#[tokio::test]
async fn test_run_is_recorded() {
    let server = start_site().await;
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("crawl.db");
    let config = create_test_config(&format!("{}/", server.uri()), "max-depth = 0", Some(&db_path));

    let (crawler, results) = run(&config).await;
    assert_eq!(results.len(), 1);
    assert!(crawler.queue().is_closed());

    let queue = CrawlerQueue::open(QueueOptions::inspect(&db_path)).unwrap();
    let run = queue.latest_run().unwrap().expect("run not recorded");
    assert_eq!(run.config_hash, "test-hash");
    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.finished_at.is_some());
    assert_eq!(queue.len().unwrap(), 0);
}

#[tokio::test]
async fn test_resume_processes_pending_jobs_only() {
    let server = start_site().await;
    let base = server.uri();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("crawl.db");

    // A previous run left one job behind
    {
        let queue = CrawlerQueue::open(QueueOptions::persistent(&db_path)).unwrap();
        queue.put(&CrawlJob::new(format!("{}/page2", base))).unwrap();
    }

    let config = create_test_config(
        &format!("{}/", base),
        "max-depth = 1\nresume = true",
        Some(&db_path),
    );
    let (crawler, results) = run(&config).await;

    assert!(crawler.state().resuming);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].job().url(), format!("{}/page2", base));
}

#[tokio::test]
async fn test_resume_after_crash_before_links_were_enqueued() {
    let server = start_site().await;
    let base = server.uri();
    let seed_url = format!("{}/", base);
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("crawl.db");

    // The previous run had the seed in flight when it died
    {
        let queue = CrawlerQueue::open(QueueOptions::persistent(&db_path)).unwrap();
        let seed = CrawlJob::new(seed_url.clone());
        let key = normalize_url(&seed_url).unwrap();
        assert_eq!(queue.put_unseen([(key.as_str(), &seed)]).unwrap(), 1);
        assert!(queue.try_get().unwrap().is_some());
    }

    let config = create_test_config(&seed_url, "max-depth = 1\nresume = true", Some(&db_path));
    let (crawler, results) = run(&config).await;

    assert!(crawler.state().resuming);
    let urls: HashSet<String> = results.iter().map(|r| r.job().url().to_string()).collect();
    let expected: HashSet<String> = [
        seed_url.clone(),
        format!("{}/page1", base),
        format!("{}/page2", base),
    ]
    .into_iter()
    .collect();
    assert_eq!(urls, expected);
    assert_eq!(results.len(), 3);

    let queue = CrawlerQueue::open(QueueOptions::inspect(&db_path)).unwrap();
    let page1_key = normalize_url(&format!("{}/page1", base)).unwrap();
    assert!(queue.is_seen(&page1_key).unwrap());
}

#[tokio::test]
async fn test_fresh_run_discards_previous_queue() {
    let server = start_site().await;
    let base = server.uri();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("crawl.db");

    {
        let queue = CrawlerQueue::open(QueueOptions::persistent(&db_path)).unwrap();
        queue.put(&CrawlJob::new(format!("{}/page3", base))).unwrap();
    }

    let config = create_test_config(&format!("{}/", base), "max-depth = 0", Some(&db_path));
    let (crawler, results) = run(&config).await;

    assert!(!crawler.state().resuming);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].job().url(), format!("{}/", base));
}

#[tokio::test]
async fn test_domain_parallelism_and_throttle() {
    let server = start_site().await;
    let config = create_test_config(
        &format!("{}/", server.uri()),
        "domain-parallelism = 1\nthrottle = 20",
        None,
    );

    let started = std::time::Instant::now();
    let (_, results) = run(&config).await;

    assert_eq!(results.len(), 4);
    // Four requests to one domain need at least three throttle intervals
    assert!(started.elapsed() >= std::time::Duration::from_millis(60));
}

#[tokio::test]
async fn test_multi_spider_routing() {
    let server = start_site().await;
    let base = server.uri();
    let config = parse_config(&format!(
        r#"
seeds = [{{ url = "{base}/", spider = "links" }}]

[crawler]
max-depth = 1
visit-urls-only-once = true

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[spiders.links]
kind = "links"

[spiders.pages]
kind = "regex"
pattern = "Content"
seeds = ["{base}/page3"]
"#
    ))
    .unwrap();

    let (crawler, results) = run(&config).await;
    assert!(crawler.spiders().is_multi());
    assert_eq!(results.len(), 4);

    for result in &results {
        let spider = result.job().spider().expect("job without spider");
        if result.job().url().ends_with("/page3") {
            assert_eq!(spider, "pages");
            let CrawlResult::Success(success) = result else {
                panic!("page3 failed");
            };
            assert_eq!(success.data.as_ref().unwrap()["relevant"], true);
        } else {
            assert_eq!(spider, "links");
        }
    }

    assert_eq!(CrawlResult::headers(crawler.spiders().is_multi())[2], "spider");
}
