use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

/// Per-host politeness policy, derived from configuration
///
/// Shared read-only by the frontier's eligibility checks; the fetch path
/// never sees a URL whose host would violate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostPolicy {
    /// Minimum delay between request starts to the same host
    pub min_delay: Duration,

    /// Maximum simultaneous in-flight requests to the same host
    pub max_concurrent: usize,
}

/// Tracks the politeness state of a single host during crawling
///
/// Timestamps are `DateTime<Utc>` rather than `Instant` so the frontier can
/// compare them against persisted `next_eligible_at` values on one clock.
#[derive(Debug, Clone, Default)]
pub struct HostState {
    /// Number of requests to this host currently in flight
    pub in_flight: usize,

    /// When the most recent request to this host was started
    pub last_started_at: Option<DateTime<Utc>>,
}

impl HostState {
    /// Creates a new HostState with no history
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks if a new request to this host may start now
    ///
    /// Enforces both halves of the politeness contract:
    /// - at most `policy.max_concurrent` requests in flight
    /// - at least `policy.min_delay` between request starts
    pub fn can_start(&self, policy: &HostPolicy, now: DateTime<Utc>) -> bool {
        if self.in_flight >= policy.max_concurrent {
            return false;
        }

        if let Some(last) = self.last_started_at {
            if duration_since(now, last) < policy.min_delay {
                return false;
            }
        }

        true
    }

    /// Calculates the time until the min-delay gate opens again
    ///
    /// Returns None if the delay has already elapsed. A host blocked only by
    /// its concurrency cap has no time-based answer; it becomes ready when a
    /// request finishes, which the caller observes separately.
    pub fn time_until_ready(&self, policy: &HostPolicy, now: DateTime<Utc>) -> Option<Duration> {
        if let Some(last) = self.last_started_at {
            let elapsed = duration_since(now, last);
            if elapsed < policy.min_delay {
                return Some(policy.min_delay - elapsed);
            }
        }
        None
    }

    /// Records that a request to this host has started
    pub fn record_start(&mut self, now: DateTime<Utc>) {
        self.in_flight += 1;
        self.last_started_at = Some(now);
    }

    /// Records that a request to this host has finished (any outcome)
    pub fn record_finish(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }
}

/// Signed-safe elapsed time between two instants on the Utc clock
fn duration_since(now: DateTime<Utc>, earlier: DateTime<Utc>) -> Duration {
    (now - earlier).to_std().unwrap_or(Duration::ZERO)
}

/// Converts a std Duration to a chrono Duration, saturating on overflow
pub fn to_chrono(duration: Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or(ChronoDuration::MAX)
}
