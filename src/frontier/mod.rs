//! Frontier: the URL queue and scheduler
//!
//! The frontier tracks every URL the crawl knows about, deduplicates by
//! normalized form, decides which URL may be fetched next under the per-host
//! politeness policy, and owns retry backoff. Every state transition is
//! written through to the URL ledger in a single SQLite statement, so a crash
//! at any point leaves a resumable picture: URLs left InFlight are requeued
//! to Discovered on the next startup (at-least-once fetch semantics).

use crate::config::CrawlerConfig;
use crate::state::{to_chrono, HostPolicy, HostState, UrlState};
use crate::storage::{SqliteStorage, Storage};
use crate::url::extract_host;
use crate::{RakerError, Result};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

/// What the frontier has to offer the coordinator right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextUrl {
    /// A URL whose host is polite to fetch now
    Ready(String),

    /// URLs are queued but none is eligible yet; retry after this long.
    /// Distinguishes "empty but waiting" from Idle per the frontier contract.
    Wait(Duration),

    /// Nothing queued at all (in-flight URLs may still produce new links)
    Idle,
}

/// A queued URL with its scheduling metadata
#[derive(Debug, Clone)]
struct QueuedUrl {
    url: String,
    host: String,
    /// Discovery order; retries keep their original position
    seq: i64,
    attempt_count: u32,
    next_eligible_at: Option<DateTime<Utc>>,
}

/// The URL queue/scheduler
///
/// Owned mutably by the coordinator, which is the single writer of URL state
/// transitions; workers never touch the frontier directly, so no transition
/// for the same URL can race another.
pub struct Frontier {
    storage: Arc<Mutex<SqliteStorage>>,
    config: CrawlerConfig,
    policy: HostPolicy,
    run_id: i64,

    /// Discovered URLs awaiting fetch, kept sorted by seq (oldest first)
    pending: Vec<QueuedUrl>,

    /// URLs handed out by `next()` but not yet marked in flight
    handed_out: HashMap<String, QueuedUrl>,

    /// URLs currently being fetched
    in_flight: HashMap<String, QueuedUrl>,

    /// Every normalized URL ever seen (the dedup set)
    known: HashSet<String>,

    /// Per-host politeness state
    hosts: HashMap<String, HostState>,
}

impl Frontier {
    /// Opens the frontier over the URL ledger, recovering crashed state
    ///
    /// Any URL left InFlight by a prior run is requeued to Discovered before
    /// the ledger is loaded. Backoff eligibility times survive the restart;
    /// per-host delay timers do not (an idle restart gap covers them).
    pub fn new(
        config: CrawlerConfig,
        storage: Arc<Mutex<SqliteStorage>>,
        run_id: i64,
    ) -> Result<Self> {
        let policy = config.host_policy();

        let mut pending = Vec::new();
        let mut known = HashSet::new();

        {
            let mut guard = storage.lock().unwrap();

            let requeued = guard.requeue_in_flight()?;
            if requeued > 0 {
                tracing::info!("Requeued {} interrupted in-flight URLs", requeued);
            }

            for record in guard.load_urls()? {
                known.insert(record.url.clone());

                if record.state == UrlState::Discovered {
                    let next_eligible_at = record
                        .next_eligible_at
                        .as_deref()
                        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                        .map(|dt| dt.with_timezone(&Utc));

                    pending.push(QueuedUrl {
                        url: record.url,
                        host: record.host,
                        seq: record.seq,
                        attempt_count: record.attempt_count,
                        next_eligible_at,
                    });
                }
            }
        }

        pending.sort_by_key(|q| q.seq);

        Ok(Self {
            storage,
            config,
            policy,
            run_id,
            pending,
            handed_out: HashMap::new(),
            in_flight: HashMap::new(),
            known,
            hosts: HashMap::new(),
        })
    }

    /// Offers a normalized URL to the frontier
    ///
    /// Returns false if the URL is already known (in any state); the ledger
    /// row doubles as the dedup check. The caller is expected to have applied
    /// the allowed-hosts fence already.
    pub fn add_discovered(&mut self, url: &Url) -> Result<bool> {
        let url_str = url.as_str().to_string();

        if self.known.contains(&url_str) {
            return Ok(false);
        }

        let host = extract_host(url).ok_or(crate::UrlError::MissingHost)?;

        let seq = {
            let mut guard = self.storage.lock().unwrap();
            let inserted = guard.insert_url(&url_str, &host, self.run_id)?;
            if !inserted {
                // Known to the ledger but not to us: a prior run discovered it
                self.known.insert(url_str);
                return Ok(false);
            }
            guard
                .get_url(&url_str)?
                .map(|r| r.seq)
                .unwrap_or(i64::MAX)
        };

        self.known.insert(url_str.clone());
        self.pending.push(QueuedUrl {
            url: url_str,
            host,
            seq,
            attempt_count: 0,
            next_eligible_at: None,
        });

        Ok(true)
    }

    /// Selects the next URL to fetch
    ///
    /// Among Discovered URLs whose backoff has elapsed and whose host is
    /// polite to contact, returns the oldest-discovered one. When nothing is
    /// eligible yet, returns how long until the earliest candidate could be;
    /// when the queue is empty, returns Idle.
    pub fn next(&mut self) -> NextUrl {
        let now = Utc::now();

        if self.pending.is_empty() {
            return NextUrl::Idle;
        }

        let mut found = None;
        for (index, queued) in self.pending.iter().enumerate() {
            if let Some(eligible_at) = queued.next_eligible_at {
                if eligible_at > now {
                    continue;
                }
            }

            let host_ready = self
                .hosts
                .get(&queued.host)
                .map(|state| state.can_start(&self.policy, now))
                .unwrap_or(true);

            if host_ready {
                found = Some(index);
                break;
            }
        }

        if let Some(index) = found {
            let queued = self.pending.remove(index);
            let url = queued.url.clone();
            self.handed_out.insert(url.clone(), queued);
            return NextUrl::Ready(url);
        }

        NextUrl::Wait(self.minimum_wait(now))
    }

    /// Calculates the shortest wait before any pending URL could become eligible
    ///
    /// A host blocked only by its concurrency cap has no time-based answer;
    /// the caller also wakes on worker completion, so the returned duration
    /// is just an upper bound on the sleep.
    fn minimum_wait(&self, now: DateTime<Utc>) -> Duration {
        let mut min_wait: Option<Duration> = None;

        for queued in &self.pending {
            let backoff_wait = queued
                .next_eligible_at
                .filter(|at| *at > now)
                .map(|at| (at - now).to_std().unwrap_or(Duration::ZERO))
                .unwrap_or(Duration::ZERO);

            let host_wait = self
                .hosts
                .get(&queued.host)
                .and_then(|state| state.time_until_ready(&self.policy, now))
                .unwrap_or(Duration::ZERO);

            let wait = backoff_wait.max(host_wait);
            if wait.is_zero() {
                // Eligible by time; blocked by concurrency only
                continue;
            }

            min_wait = Some(match min_wait {
                Some(current) => current.min(wait),
                None => wait,
            });
        }

        // Small buffer so the candidate is definitely ready on re-check
        min_wait
            .map(|w| w + Duration::from_millis(10))
            .unwrap_or(Duration::from_millis(100))
    }

    /// Transitions a URL handed out by `next()` to InFlight
    ///
    /// Increments the attempt count and starts the host's politeness clock.
    pub fn mark_in_flight(&mut self, url: &str) -> Result<()> {
        let mut queued = self.handed_out.remove(url).ok_or_else(|| {
            RakerError::InvalidTransition {
                url: url.to_string(),
                from: UrlState::Discovered,
                to: UrlState::InFlight,
            }
        })?;

        let now = Utc::now();
        queued.attempt_count += 1;
        queued.next_eligible_at = None;

        self.hosts
            .entry(queued.host.clone())
            .or_insert_with(HostState::new)
            .record_start(now);

        {
            let mut guard = self.storage.lock().unwrap();
            guard.update_url_state(
                url,
                UrlState::InFlight,
                queued.attempt_count,
                Some(&now.to_rfc3339()),
                None,
                None,
            )?;
        }

        self.in_flight.insert(url.to_string(), queued);
        Ok(())
    }

    /// Transitions an InFlight URL to Visited
    pub fn mark_visited(&mut self, url: &str) -> Result<()> {
        let queued = self.take_in_flight(url, UrlState::Visited)?;

        let mut guard = self.storage.lock().unwrap();
        guard.update_url_state(url, UrlState::Visited, queued.attempt_count, None, None, None)?;
        Ok(())
    }

    /// Records a fetch failure for an InFlight URL
    ///
    /// Retriable failures return the URL to Discovered with an exponential,
    /// capped backoff (or the server-suggested delay for HTTP 429) until the
    /// attempt count exceeds `max-retries`; then, and for non-retriable
    /// failures immediately, the URL becomes terminally Failed.
    pub fn mark_failed(
        &mut self,
        url: &str,
        retriable: bool,
        server_delay: Option<Duration>,
        error: &str,
    ) -> Result<()> {
        let mut queued = self.take_in_flight(url, UrlState::Failed)?;
        let now = Utc::now();

        if retriable && queued.attempt_count <= self.config.max_retries {
            let delay = server_delay.unwrap_or_else(|| self.config.backoff(queued.attempt_count));
            let eligible_at = now + to_chrono(delay);
            queued.next_eligible_at = Some(eligible_at);

            tracing::debug!(
                "Retrying {} (attempt {}) in {:?}",
                url,
                queued.attempt_count,
                delay
            );

            {
                let mut guard = self.storage.lock().unwrap();
                guard.update_url_state(
                    url,
                    UrlState::Discovered,
                    queued.attempt_count,
                    None,
                    Some(&eligible_at.to_rfc3339()),
                    Some(error),
                )?;
            }

            // Re-insert at the original discovery position
            let insert_at = self
                .pending
                .binary_search_by_key(&queued.seq, |q| q.seq)
                .unwrap_or_else(|i| i);
            self.pending.insert(insert_at, queued);
        } else {
            tracing::debug!(
                "URL {} terminally failed after {} attempts: {}",
                url,
                queued.attempt_count,
                error
            );

            let mut guard = self.storage.lock().unwrap();
            guard.update_url_state(
                url,
                UrlState::Failed,
                queued.attempt_count,
                None,
                None,
                Some(error),
            )?;
        }

        Ok(())
    }

    fn take_in_flight(&mut self, url: &str, to: UrlState) -> Result<QueuedUrl> {
        let queued =
            self.in_flight
                .remove(url)
                .ok_or_else(|| RakerError::InvalidTransition {
                    url: url.to_string(),
                    from: UrlState::Discovered,
                    to,
                })?;

        if let Some(state) = self.hosts.get_mut(&queued.host) {
            state.record_finish();
        }

        Ok(queued)
    }

    /// Number of URLs waiting to be fetched
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of URLs currently being fetched
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len() + self.handed_out.len()
    }

    /// True when nothing is queued or in flight
    pub fn is_drained(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty() && self.handed_out.is_empty()
    }
}
