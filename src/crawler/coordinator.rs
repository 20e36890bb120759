//! Crawler coordinator - main crawl orchestration logic
//!
//! The coordinator owns the queue and the URL cache and drives a fixed pool
//! of worker tasks. Each worker:
//! - Dequeues the next eligible job
//! - Waits for the throttle slot of the job's domain
//! - Fetches the job through the [`Fetcher`]
//! - Hands the response to the job's spider
//! - Enqueues the follow-up targets, then acknowledges the job
//!
//! Results are delivered through a [`CrawlStream`].

use crate::cache::{MemoryUrlCache, UrlCache};
use crate::config::Config;
use crate::crawler::{Fetcher, HttpFetcher, Response, Throttle};
use crate::job::{
    CrawlError, CrawlJob, CrawlResult, CrawlTarget, ErroredCrawlResult, SuccessfulCrawlResult,
};
use crate::queue::{CrawlerQueue, QueueOptions, RunStatus};
use crate::spider::{SpiderOutput, SpiderSet};
use crate::state::{CrawlerState, CrawlerStatus, StateSnapshot};
use crate::url::{normalize_url, resolve_url};
use crate::{CrawlerError, Result};
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

/// Orchestration settings of a [`Crawler`]
#[derive(Debug, Clone)]
pub struct CrawlerOptions {
    /// Number of worker tasks
    pub max_workers: usize,

    /// Targets deeper than this are dropped
    pub max_depth: Option<u32>,

    /// Normalize URLs before checking them against the URL cache
    pub normalize_urls: bool,

    /// Minimum delay between two requests of the same domain
    pub throttle: Duration,

    /// Recorded with the run in the queue database
    pub config_hash: Option<String>,
}

impl Default for CrawlerOptions {
    fn default() -> Self {
        Self {
            max_workers: 8,
            max_depth: None,
            normalize_urls: false,
            throttle: Duration::ZERO,
            config_hash: None,
        }
    }
}

impl CrawlerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_workers: config.crawler.max_workers,
            max_depth: config.crawler.max_depth,
            normalize_urls: config.crawler.normalize_urls,
            throttle: Duration::from_millis(config.crawler.throttle),
            config_hash: None,
        }
    }

    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn normalize_urls(mut self, normalize_urls: bool) -> Self {
        self.normalize_urls = normalize_urls;
        self
    }

    pub fn throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn config_hash(mut self, config_hash: impl Into<String>) -> Self {
        self.config_hash = Some(config_hash.into());
        self
    }
}

/// Main crawler structure
///
/// Cloning a crawler yields another handle on the same crawl, which is how a
/// signal handler gets to call [`stop`](Crawler::stop).
#[derive(Clone)]
pub struct Crawler {
    inner: Arc<CrawlerInner>,
}

/// Where the crawler remembers the URLs it already enqueued
enum Dedup {
    Off,
    /// In the queue database, committed together with the jobs
    Queue,
    Cache(Arc<dyn UrlCache>),
}

struct CrawlerInner {
    options: CrawlerOptions,
    spiders: SpiderSet,
    queue: Arc<CrawlerQueue>,
    dedup: Dedup,
    fetcher: Arc<dyn Fetcher>,
    throttle: Throttle,
    state: CrawlerState,
    cancel: CancellationToken,
}

impl Crawler {
    /// Creates a crawler over an opened queue
    ///
    /// Without a URL cache every discovered target is enqueued.
    pub fn new(
        spiders: SpiderSet,
        queue: Arc<CrawlerQueue>,
        fetcher: Arc<dyn Fetcher>,
        options: CrawlerOptions,
    ) -> Self {
        Self {
            inner: Arc::new(CrawlerInner {
                throttle: Throttle::new(options.throttle),
                options,
                spiders,
                queue,
                dedup: Dedup::Off,
                fetcher,
                state: CrawlerState::new(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Deduplicates enqueued URLs with `cache`
    ///
    /// The cache is updated before the jobs reach the queue, so a cache that
    /// outlives the process can remember URLs whose jobs were lost in a
    /// crash. Persistent crawls should use
    /// [`with_queue_dedup`](Self::with_queue_dedup) instead. Must be called
    /// before the crawler is cloned.
    pub fn with_cache(self, cache: Arc<dyn UrlCache>) -> Self {
        self.with_dedup(Dedup::Cache(cache))
    }

    /// Deduplicates enqueued URLs in the queue database
    ///
    /// Keys and jobs are written in one transaction, which keeps resumed
    /// crawls from dropping children of a job interrupted mid-enqueue. Must
    /// be called before the crawler is cloned.
    pub fn with_queue_dedup(self) -> Self {
        self.with_dedup(Dedup::Queue)
    }

    fn with_dedup(mut self, dedup: Dedup) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.dedup = dedup;
        } else {
            warn!("Deduplication ignored: crawler handle already shared");
        }
        self
    }

    /// Builds the whole crawl described by a configuration
    ///
    /// The queue lives in `output.database-path` when it is set, and so do
    /// the keys of seen URLs. Without a path both live in memory.
    ///
    /// # Arguments
    ///
    /// * `config` - A validated configuration
    /// * `config_hash` - Hash of the configuration file, recorded with the run
    ///
    /// # Returns
    ///
    /// * `Ok(Crawler)` - Ready to be started
    /// * `Err(CrawlerError)` - A spider, the queue or the HTTP client could not be built
    pub fn from_config(config: &Config, config_hash: Option<String>) -> Result<Self> {
        let spiders = SpiderSet::from_config(config)?;
        let crawler_config = &config.crawler;

        let mut queue_options = match &config.output.database_path {
            Some(path) => QueueOptions::persistent(path),
            None => QueueOptions::in_memory(),
        }
        .resume(crawler_config.resume)
        .lifo(crawler_config.lifo)
        .group_parallelism(crawler_config.domain_parallelism)
        .cleanup_interval(crawler_config.cleanup_interval);
        for (domain, parallelism) in &crawler_config.domain_parallelism_overrides {
            queue_options = queue_options.group_parallelism_override(domain.clone(), *parallelism);
        }
        let queue = Arc::new(CrawlerQueue::open(queue_options)?);

        let fetcher = Arc::new(HttpFetcher::new(&config.user_agent, &config.fetch)?);

        let mut options = CrawlerOptions::from_config(config);
        options.config_hash = config_hash;

        let crawler = Self::new(spiders, queue, fetcher, options);

        Ok(match (crawler_config.visit_urls_only_once, &config.output.database_path) {
            (false, _) => crawler,
            (true, Some(_)) => crawler.with_queue_dedup(),
            (true, None) => crawler.with_cache(Arc::new(MemoryUrlCache::new())),
        })
    }

    pub fn queue(&self) -> &Arc<CrawlerQueue> {
        &self.inner.queue
    }

    pub fn spiders(&self) -> &SpiderSet {
        &self.inner.spiders
    }

    /// Current status and progress counters
    pub fn state(&self) -> StateSnapshot {
        self.inner.state.snapshot()
    }

    /// Requests a clean stop
    ///
    /// No job is dequeued afterwards. Jobs already being processed run to
    /// completion, then the queue is closed and the result stream ends.
    pub fn stop(&self) {
        if !self.inner.cancel.is_cancelled() {
            info!("Stop requested");
            self.inner.cancel.cancel();
        }
    }

    /// Starts the crawl
    ///
    /// Seeds the queue from the spiders, unless the queue was resumed with
    /// pending work, then spawns the workers.
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlStream)` - Yields one result per processed job
    /// * `Err(CrawlerError::AlreadyStarted)` - If `start` was already called
    /// * `Err(CrawlerError)` - If seeding failed
    pub fn start(&self) -> Result<CrawlStream> {
        let inner = &self.inner;

        if inner.state.status() != CrawlerStatus::NotStarted
            || !inner.state.transition(CrawlerStatus::Running)
        {
            return Err(CrawlerError::AlreadyStarted);
        }

        if let Err(e) = inner.prepare_run() {
            error!("Crawl could not start: {}", e);
            inner.state.transition(CrawlerStatus::Stopped);
            return Err(e);
        }

        let workers = inner.options.max_workers.max(1);
        let (tx, rx) = mpsc::channel(workers * 2);
        tokio::spawn(drive(Arc::clone(&self.inner), tx, workers));

        Ok(CrawlStream { receiver: rx })
    }
}

/// Results of a running crawl
///
/// Ends once the crawl finished or stopped and the queue was closed. A fatal
/// error is delivered as the last item.
pub struct CrawlStream {
    receiver: mpsc::Receiver<Result<CrawlResult>>,
}

impl CrawlStream {
    /// Waits for the next result
    pub async fn next(&mut self) -> Option<Result<CrawlResult>> {
        self.receiver.recv().await
    }

    /// Drains the stream
    ///
    /// # Returns
    ///
    /// * `Ok(results)` - Every result, in completion order
    /// * `Err(CrawlerError)` - The fatal error that ended the crawl
    pub async fn collect(mut self) -> Result<Vec<CrawlResult>> {
        let mut results = Vec::new();
        while let Some(item) = self.next().await {
            results.push(item?);
        }
        Ok(results)
    }
}

/// Runs the worker pool and tears the crawl down once it is over
async fn drive(inner: Arc<CrawlerInner>, tx: mpsc::Sender<Result<CrawlResult>>, workers: usize) {
    let start_time = Instant::now();
    let mut pool = JoinSet::new();
    for worker_id in 0..workers {
        pool.spawn(work(Arc::clone(&inner), tx.clone(), worker_id));
    }

    let mut fatal = None;
    while let Some(joined) = pool.join_next().await {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => Err(CrawlerError::Worker(e.to_string())),
        };
        if let Err(e) = outcome {
            if fatal.is_none() {
                error!("Crawl aborted: {}", e);
                inner.cancel.cancel();
                fatal = Some(e);
            }
        }
    }

    let (status, run_status) = if fatal.is_some() {
        (CrawlerStatus::Stopped, RunStatus::Failed)
    } else if inner.cancel.is_cancelled() {
        (CrawlerStatus::Stopped, RunStatus::Interrupted)
    } else {
        (CrawlerStatus::Finished, RunStatus::Completed)
    };
    inner.state.transition(status);

    if let Err(e) = inner.queue.finish_run(run_status) {
        warn!("Failed to record end of run: {}", e);
    }
    if let Err(e) = inner.queue.close() {
        warn!("Failed to close queue: {}", e);
    }

    let snapshot = inner.state.snapshot();
    info!(
        "Crawl {}: {} done, {} failed in {:?}",
        status,
        snapshot.jobs_done,
        snapshot.jobs_failed,
        start_time.elapsed()
    );

    if let Some(e) = fatal {
        let _ = tx.send(Err(e)).await;
    }
}

/// One worker: dequeues and processes jobs until the queue is exhausted
async fn work(
    inner: Arc<CrawlerInner>,
    tx: mpsc::Sender<Result<CrawlResult>>,
    worker_id: usize,
) -> Result<()> {
    loop {
        let job = tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => break,
            job = inner.queue.get() => job?,
        };

        let Some(job) = job else {
            break;
        };

        trace!("Worker {} took job {}", worker_id, job.id());
        let result = inner.process(job).await?;

        if tx.send(Ok(result)).await.is_err() {
            debug!("Result stream dropped, stopping");
            inner.cancel.cancel();
            break;
        }
    }

    trace!("Worker {} exiting", worker_id);
    Ok(())
}

impl CrawlerInner {
    /// Seeds or resumes the queue and records the new run
    fn prepare_run(&self) -> Result<()> {
        let pending = self.queue.len()?;
        let resuming = self.queue.options().resume && pending > 0;
        self.state.set_resuming(resuming);

        let config_hash = self.options.config_hash.clone().unwrap_or_default();
        if resuming {
            if let Some(run) = self.queue.latest_run()? {
                if !config_hash.is_empty() && run.config_hash != config_hash {
                    warn!(
                        "Configuration changed since run {} ({} -> {})",
                        run.id, run.config_hash, config_hash
                    );
                }
            }
            info!("Resuming crawl with {} pending jobs", pending);
            self.state.add_queued(pending as u64);
        } else {
            let seeds = self.spiders.start();
            let queued = self.enqueue(None, None, seeds)?;
            info!("Seeded queue with {} jobs", queued);
        }

        let run_id = self.queue.begin_run(&config_hash)?;
        debug!("Started run {}", run_id);
        Ok(())
    }

    /// Processes one dequeued job
    ///
    /// Fetch and spider failures become errored results. Only queue and
    /// cache failures are returned as errors.
    async fn process(&self, job: CrawlJob) -> Result<CrawlResult> {
        self.state.job_started();

        let Some(spider) = self.spiders.resolve(job.spider()) else {
            let name = job.spider().unwrap_or_default().to_string();
            warn!("Job {} names unknown spider '{}'", job.id(), name);
            return self.failed(job, CrawlError::UnknownSpider(name), None);
        };

        self.throttle.wait(job.group()).await;

        debug!("Fetching {} (depth {})", job.url(), job.depth());
        let response = match self.fetcher.fetch(&job).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Failed to fetch {}: {}", job.url(), e);
                return self.failed(job, CrawlError::Fetch(e), None);
            }
        };

        let response = Arc::new(response);
        let processed = {
            let job = job.clone();
            let response = Arc::clone(&response);
            tokio::task::spawn_blocking(move || spider.process(&job, &response)).await
        };
        let response = Arc::try_unwrap(response).unwrap_or_else(|shared| (*shared).clone());

        let output = match processed {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!("Spider failed on {}: {:#}", job.url(), e);
                let error = spider_error(&job, &response, format!("{:#}", e));
                return self.failed(job, error, Some(response));
            }
            Err(join_error) if join_error.is_panic() => {
                let message = panic_message(join_error.into_panic());
                warn!("Spider panicked on {}: {}", job.url(), message);
                let error = spider_error(&job, &response, message);
                return self.failed(job, error, Some(response));
            }
            Err(join_error) => return Err(CrawlerError::Worker(join_error.to_string())),
        };

        let SpiderOutput { data, targets } = output.unwrap_or_default();
        let degree = targets.len();

        let base = Url::parse(&response.final_url).or_else(|_| Url::parse(job.url()));
        match base {
            Ok(base) => {
                self.enqueue(Some(&job), Some(&base), targets)?;
            }
            Err(e) => warn!("Cannot resolve targets of {}: {}", job.url(), e),
        }

        self.queue.ack(&job)?;
        self.state.job_finished(true);

        Ok(CrawlResult::Success(SuccessfulCrawlResult {
            job,
            response,
            data,
            degree,
        }))
    }

    fn failed(
        &self,
        job: CrawlJob,
        error: CrawlError,
        response: Option<Response>,
    ) -> Result<CrawlResult> {
        self.queue.fail(&job)?;
        self.state.job_finished(false);
        Ok(CrawlResult::Error(ErroredCrawlResult {
            job,
            error,
            response,
        }))
    }

    /// Turns targets into jobs and enqueues the ones worth crawling
    ///
    /// Relative URLs are resolved against `base`. Targets that are invalid,
    /// too deep or already seen are dropped.
    ///
    /// # Returns
    ///
    /// The number of enqueued jobs
    fn enqueue(
        &self,
        parent: Option<&CrawlJob>,
        base: Option<&Url>,
        targets: Vec<CrawlTarget>,
    ) -> Result<usize> {
        let mut jobs = Vec::with_capacity(targets.len());

        for target in targets {
            if let Err(e) = target.validate() {
                warn!("Dropping invalid target: {}", e);
                continue;
            }

            let target = match base {
                Some(base) => match resolve_url(base, target.url()) {
                    Some(url) => target.with_url(url),
                    None => {
                        trace!("Dropping unresolvable target {}", target.url());
                        continue;
                    }
                },
                None => target,
            };

            let job = CrawlJob::from_target(target, parent);

            if let Some(max_depth) = self.options.max_depth {
                if job.depth() > max_depth {
                    trace!("Dropping {} beyond max depth {}", job.url(), max_depth);
                    continue;
                }
            }

            jobs.push(job);
        }

        if jobs.is_empty() {
            return Ok(0);
        }

        let queued = match &self.dedup {
            Dedup::Off => self.queue.put_many(&jobs)?.len(),
            Dedup::Queue => {
                let keys: Vec<String> = jobs.iter().map(|job| self.dedup_key(job.url())).collect();
                self.queue
                    .put_unseen(keys.iter().map(String::as_str).zip(&jobs))?
            }
            Dedup::Cache(cache) => {
                let mut fresh = Vec::with_capacity(jobs.len());
                for job in jobs {
                    if cache.add(&self.dedup_key(job.url()))? {
                        fresh.push(job);
                    } else {
                        trace!("Already seen {}", job.url());
                    }
                }
                self.queue.put_many(&fresh)?.len()
            }
        };

        self.state.add_queued(queued as u64);
        Ok(queued)
    }

    fn dedup_key(&self, url: &str) -> String {
        if self.options.normalize_urls {
            normalize_url(url).unwrap_or_else(|_| url.to_string())
        } else {
            url.to_string()
        }
    }
}

fn spider_error(job: &CrawlJob, response: &Response, message: String) -> CrawlError {
    CrawlError::SpiderProcess {
        job_id: job.id().to_string(),
        url: job.url().to_string(),
        status: Some(response.status),
        message,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map(|message| message.to_string())
            .unwrap_or_else(|| "spider panicked".to_string()),
    }
}
