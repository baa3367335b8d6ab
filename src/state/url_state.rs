/// URL state definitions for tracking crawl progress
///
/// Every URL in the frontier ledger occupies exactly one of these states at
/// any time. Transitions are monotonic except Failed-with-retry and
/// crash-recovery, both of which return a URL to Discovered.
use std::fmt;

/// Represents the current state of a URL in the crawl process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrlState {
    /// URL is known and waiting to be fetched (or waiting out a retry backoff)
    Discovered,

    /// URL is currently being fetched by a worker
    InFlight,

    /// URL was fetched successfully (whether or not it yielded an article)
    Visited,

    /// URL failed terminally: a non-retriable error, or the retry cap was hit
    Failed,
}

impl UrlState {
    /// Returns true if this is a terminal state (no further fetch will happen)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Visited | Self::Failed)
    }

    /// Returns true if a transition from `self` to `to` is legal
    ///
    /// Legal transitions:
    /// - Discovered -> InFlight
    /// - InFlight -> Visited | Failed | Discovered (retry or crash requeue)
    pub fn can_transition_to(&self, to: UrlState) -> bool {
        matches!(
            (self, to),
            (Self::Discovered, Self::InFlight)
                | (Self::InFlight, Self::Visited)
                | (Self::InFlight, Self::Failed)
                | (Self::InFlight, Self::Discovered)
        )
    }

    /// Converts the state to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::InFlight => "in_flight",
            Self::Visited => "visited",
            Self::Failed => "failed",
        }
    }

    /// Parses a state from its database string representation
    ///
    /// Returns None if the string doesn't match any known state.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "discovered" => Some(Self::Discovered),
            "in_flight" => Some(Self::InFlight),
            "visited" => Some(Self::Visited),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for UrlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
