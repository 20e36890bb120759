use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

/// Lifecycle of a whole crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlerStatus {
    NotStarted,
    Running,
    Finished,
    Stopped,
}

impl CrawlerStatus {
    fn as_u8(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::Running => 1,
            Self::Finished => 2,
            Self::Stopped => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Finished,
            3 => Self::Stopped,
            _ => Self::NotStarted,
        }
    }

    /// Returns true once the crawl can no longer produce results
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Stopped)
    }
}

impl fmt::Display for CrawlerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

/// Progress counters shared between the orchestrator and its workers
///
/// Counters are plain atomics used for reporting only; no scheduling decision
/// is taken from them.
#[derive(Debug, Default)]
pub struct CrawlerState {
    status: AtomicU8,
    resuming: AtomicBool,
    jobs_queued: AtomicU64,
    jobs_done: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_in_flight: AtomicU64,
}

/// Point-in-time copy of [`CrawlerState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateSnapshot {
    pub status: CrawlerStatus,
    pub resuming: bool,
    pub jobs_queued: u64,
    pub jobs_done: u64,
    pub jobs_failed: u64,
    pub jobs_in_flight: u64,
}

impl CrawlerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> CrawlerStatus {
        CrawlerStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    /// Moves to `next` unless the crawl already reached a terminal status
    ///
    /// # Returns
    ///
    /// * `true` - If the status changed
    /// * `false` - If the crawl was already finished or stopped
    pub fn transition(&self, next: CrawlerStatus) -> bool {
        let mut current = self.status.load(Ordering::SeqCst);
        loop {
            if CrawlerStatus::from_u8(current).is_terminal() {
                return false;
            }
            match self.status.compare_exchange(
                current,
                next.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn set_resuming(&self, resuming: bool) {
        self.resuming.store(resuming, Ordering::SeqCst);
    }

    pub fn is_resuming(&self) -> bool {
        self.resuming.load(Ordering::SeqCst)
    }

    pub fn add_queued(&self, count: u64) {
        self.jobs_queued.fetch_add(count, Ordering::Relaxed);
    }

    pub fn job_started(&self) {
        self.jobs_in_flight.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the end of a job, successful or not
    pub fn job_finished(&self, success: bool) {
        self.jobs_in_flight.fetch_sub(1, Ordering::Relaxed);
        if success {
            self.jobs_done.fetch_add(1, Ordering::Relaxed);
        } else {
            self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            status: self.status(),
            resuming: self.is_resuming(),
            jobs_queued: self.jobs_queued.load(Ordering::Relaxed),
            jobs_done: self.jobs_done.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_in_flight: self.jobs_in_flight.load(Ordering::Relaxed),
        }
    }
}
