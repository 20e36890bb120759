//! Integration tests for the persisted queue and URL cache
//!
//! Every test works on a database file in a temporary directory and
//! reopens it the way a resumed crawl would.

use ripple_crawl::cache::{SqliteUrlCache, UrlCache};
use ripple_crawl::job::CrawlJob;
use ripple_crawl::queue::{CrawlerQueue, QueueOptions};
use ripple_crawl::state::RecordStatus;
use std::path::Path;

fn open(path: &Path, resume: bool) -> CrawlerQueue {
    CrawlerQueue::open(QueueOptions::persistent(path).resume(resume)).expect("Failed to open queue")
}

#[test]
fn test_resume_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("queue.db");

    let indices = {
        let queue = open(&db_path, false);
        let indices = queue
            .put_many(&[
                CrawlJob::new("https://example.com/1"),
                CrawlJob::new("https://example.com/2"),
                CrawlJob::new("https://example.com/3"),
            ])
            .unwrap();

        let first = queue.try_get().unwrap().unwrap();
        assert_eq!(first.url(), "https://example.com/1");
        queue.ack(&first).unwrap();
        indices
    };

    let queue = open(&db_path, true);
    assert_eq!(queue.len().unwrap(), 2);

    let fourth = queue.put(&CrawlJob::new("https://example.com/4")).unwrap();
    assert!(indices.iter().all(|index| fourth > *index));

    let next = queue.try_get().unwrap().unwrap();
    assert_eq!(next.url(), "https://example.com/2");
}

#[test]
fn test_indices_not_reused_after_cleanup() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("queue.db");

    let last = {
        let queue = open(&db_path, false);
        let last = queue.put(&CrawlJob::new("https://example.com/1")).unwrap();
        let job = queue.try_get().unwrap().unwrap();
        queue.ack(&job).unwrap();
        assert_eq!(queue.cleanup().unwrap(), 1);
        queue.close().unwrap();
        last
    };

    let queue = open(&db_path, true);
    assert!(queue.dump().unwrap().is_empty());
    let next = queue.put(&CrawlJob::new("https://example.com/2")).unwrap();
    assert!(next > last);
}

#[test]
fn test_interrupted_jobs_become_ready() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("queue.db");

    let interrupted = {
        let queue = open(&db_path, false);
        queue.put(&CrawlJob::new("https://example.com/1")).unwrap();
        let job = queue.try_get().unwrap().unwrap();
        assert_eq!(queue.qsize().unwrap(), 0);
        job
    };

    // Inspection leaves the record as it was
    {
        let queue = CrawlerQueue::open(QueueOptions::inspect(&db_path)).unwrap();
        let records = queue.dump().unwrap();
        assert_eq!(records[0].status, RecordStatus::Doing);
    }

    let queue = open(&db_path, true);
    assert_eq!(queue.qsize().unwrap(), 1);

    let again = queue.try_get().unwrap().unwrap();
    assert_eq!(again.id(), interrupted.id());
    assert_eq!(again.url(), interrupted.url());
    queue.ack(&again).unwrap();
    assert!(queue.is_empty().unwrap());
}

#[test]
fn test_fresh_open_clears_records() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("queue.db");

    {
        let queue = open(&db_path, false);
        queue.put(&CrawlJob::new("https://example.com/1")).unwrap();
    }

    let queue = open(&db_path, false);
    assert_eq!(queue.len().unwrap(), 0);
}

#[test]
fn test_queue_and_cache_share_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("crawl.db");

    {
        let queue = open(&db_path, false);
        let cache = SqliteUrlCache::open(&db_path, false).unwrap();
        assert!(cache.add("https://example.com/1").unwrap());
        queue.put(&CrawlJob::new("https://example.com/1")).unwrap();
    }

    let queue = open(&db_path, true);
    let cache = SqliteUrlCache::open(&db_path, true).unwrap();
    assert_eq!(queue.len().unwrap(), 1);
    assert!(cache.contains("https://example.com/1").unwrap());
    assert!(!cache.add("https://example.com/1").unwrap());
    assert_eq!(
        cache
            .add_many(&[
                "https://example.com/1".to_string(),
                "https://example.com/2".to_string(),
                "https://example.com/2".to_string(),
            ])
            .unwrap(),
        1
    );

    // Keys the queue records with its jobs are visible to the cache and back
    let third = CrawlJob::new("https://example.com/3");
    assert_eq!(queue.put_unseen([("https://example.com/3", &third)]).unwrap(), 1);
    assert!(cache.contains("https://example.com/3").unwrap());

    let known = CrawlJob::new("https://example.com/2");
    assert_eq!(queue.put_unseen([("https://example.com/2", &known)]).unwrap(), 0);
    assert_eq!(queue.len().unwrap(), 2);
}
