use std::time::Duration;
use tokio::time::Instant;

/// Tracks request timing for a single host
///
/// The politeness throttle keeps one of these per host behind its own lock.
#[derive(Debug, Clone, Default)]
pub struct HostState {
    /// Timestamp of the last request to this host
    pub last_request_time: Option<Instant>,

    /// Number of requests made to this host
    pub request_count: u64,
}

impl HostState {
    /// Creates a new HostState with no request history
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that a request was made to this host
    pub fn record_request(&mut self, now: Instant) {
        self.request_count += 1;
        self.last_request_time = Some(now);
    }

    /// Calculates the time until the next request can be made
    ///
    /// Returns None if a request can be made now, or the duration to wait otherwise.
    pub fn time_until_next_request(&self, min_delay: Duration, now: Instant) -> Option<Duration> {
        let last = self.last_request_time?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed < min_delay {
            Some(min_delay - elapsed)
        } else {
            None
        }
    }
}
