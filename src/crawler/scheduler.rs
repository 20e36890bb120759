//! Per-domain request throttling
//!
//! This module handles:
//! - Booking request slots per throttling group
//! - Respecting the minimum delay between two requests of a group
//! - Per-group request counting for progress reporting

use crate::state::DomainState;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::trace;

/// Key used for jobs whose URL has no domain
const NO_GROUP: &str = "";

/// Spaces out requests that share a group key
///
/// Groups are independent: throttling one domain never delays another.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    domain_states: Mutex<HashMap<String, DomainState>>,
}

impl Throttle {
    /// Creates a throttle enforcing `interval` between two requests of a group
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            domain_states: Mutex::new(HashMap::new()),
        }
    }

    /// A throttle that never waits
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Books the next request slot of `group`
    ///
    /// # Returns
    ///
    /// How long the caller must wait before issuing its request
    pub fn reserve(&self, group: Option<&str>) -> Duration {
        let key = group.unwrap_or(NO_GROUP);
        let now = Instant::now();

        let mut states = self
            .domain_states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let wait = states
            .entry(key.to_string())
            .or_default()
            .reserve(self.interval, now);

        trace!("Throttle slot for '{}' in {:?}", key, wait);
        wait
    }

    /// Waits for the next request slot of `group`
    pub async fn wait(&self, group: Option<&str>) {
        let wait = self.reserve(group);
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    /// Requests booked so far for `group`
    pub fn request_count(&self, group: &str) -> u32 {
        self.domain_states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(group)
            .map(|state| state.request_count)
            .unwrap_or(0)
    }

    /// Requests booked so far, per group
    pub fn request_counts(&self) -> HashMap<String, u32> {
        self.domain_states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(group, state)| (group.clone(), state.request_count))
            .collect()
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::disabled()
    }
}
