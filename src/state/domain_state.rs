use std::time::{Duration, Instant};

/// Tracks the request history of one throttling group during crawling
///
/// `last_request_time` is the instant of the most recently *booked* slot,
/// which may lie in the future when several workers queue up behind the same
/// group.
#[derive(Debug, Clone, Default)]
pub struct DomainState {
    /// Number of requests booked for this group in the current crawl
    pub request_count: u32,

    /// Instant of the latest booked request slot
    pub last_request_time: Option<Instant>,
}

impl DomainState {
    /// Creates a new DomainState with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks if a request can be issued right now
    ///
    /// # Arguments
    ///
    /// * `interval` - Minimum time between two requests of the group
    /// * `now` - The current time instant
    pub fn can_request(&self, interval: Duration, now: Instant) -> bool {
        self.time_until_next_request(interval, now).is_none()
    }

    /// Calculates the time until the next request can be made
    ///
    /// Returns None if a request can be made now, or the duration to wait otherwise.
    pub fn time_until_next_request(&self, interval: Duration, now: Instant) -> Option<Duration> {
        let next = self.last_request_time? + interval;
        if next > now {
            Some(next - now)
        } else {
            None
        }
    }

    /// Books the next request slot and returns how long the caller must wait
    ///
    /// The slot is `max(now, last + interval)`; booking it immediately means
    /// two callers racing for the same group get consecutive slots instead of
    /// firing together.
    ///
    /// # Arguments
    ///
    /// * `interval` - Minimum time between two requests of the group
    /// * `now` - The current time instant
    ///
    /// # Returns
    ///
    /// The delay before the booked slot (zero when it is available now)
    pub fn reserve(&mut self, interval: Duration, now: Instant) -> Duration {
        let wait = self.time_until_next_request(interval, now).unwrap_or_default();
        self.record_request(now + wait);
        wait
    }

    /// Records that a request was made at `at`
    pub fn record_request(&mut self, at: Instant) {
        self.request_count += 1;
        self.last_request_time = Some(at);
    }
}
