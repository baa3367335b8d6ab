//! Crawl coordinator - main crawl orchestration logic
//!
//! The coordinator drives the Frontier/Fetcher/Extractor/Store loop:
//! - seeds the frontier and resumes interrupted runs
//! - keeps a bounded pool of fetch workers busy (global cap here, per-host
//!   caps inside the frontier)
//! - is the single writer of frontier state transitions, so per-URL ordering
//!   is serialized by construction
//! - converts every per-URL failure into a CrawlOutcome; only
//!   store-connectivity problems are fatal to the run
//!
//! Run phases: Idle -> Running -> (Draining | Stopped). A stop signal or an
//! exhausted page budget moves the run to Draining: in-flight fetches finish
//! under a timeout, no new fetches start, and whatever is still InFlight when
//! the timeout expires is requeued by the next run's crash recovery.

use crate::config::Config;
use crate::crawler::extractor::{extract_article, extract_links};
use crate::crawler::fetcher::{build_http_client, fetch};
use crate::crawler::outcome::{CrawlOutcome, OutcomeKind, OutcomeTally};
use crate::frontier::{Frontier, NextUrl};
use crate::storage::{RunStatus, SqliteStorage, Storage, UpsertOutcome};
use crate::url::{extract_host, host_is_allowed, normalize_url};
use crate::{RakerError, Result};
use reqwest::Client;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;
use url::Url;

/// How often an upsert is retried against a transiently unavailable store
const STORE_RETRY_ATTEMPTS: u32 = 3;

/// Phase of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Running,
    Draining,
    Stopped,
}

/// What a fetch worker reports back to the coordinator
struct WorkerReport {
    url: String,
    disposition: Disposition,
    links: Vec<String>,
}

enum Disposition {
    /// Fetched, extracted, and handed to the store
    Stored(UpsertOutcome),

    /// Fetched fine, but the page is not an article
    NotArticle(String),

    /// The fetch itself failed
    FetchFailed {
        retriable: bool,
        server_delay: Option<Duration>,
        detail: String,
    },

    /// The store stayed unavailable through retries; fatal to the run
    StoreFailed(String),
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    storage: Arc<Mutex<SqliteStorage>>,
    frontier: Frontier,
    client: Client,
    run_id: i64,
    phase: RunPhase,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `fresh` - Re-fetch everything: every ledger row is reset to
    ///   Discovered. The ledger itself is never deleted.
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(RakerError)` - Failed to initialize
    pub fn new(config: Config, config_hash: &str, fresh: bool) -> Result<Self> {
        let storage_path = Path::new(&config.storage.database_path);
        let storage = Arc::new(Mutex::new(SqliteStorage::new(storage_path)?));

        let run_id = {
            let mut guard = storage.lock().unwrap();

            if fresh {
                let reset = guard.reset_frontier()?;
                if reset > 0 {
                    tracing::info!("Fresh crawl: reset {} ledger rows to discovered", reset);
                }
                guard.create_run(config_hash)?
            } else if let Some(latest) = guard.get_latest_run()? {
                if matches!(latest.status, RunStatus::Running | RunStatus::Interrupted) {
                    tracing::info!("Resuming interrupted run {}", latest.id);
                    latest.id
                } else {
                    guard.create_run(config_hash)?
                }
            } else {
                guard.create_run(config_hash)?
            }
        };

        let client = build_http_client(&config.user_agent)?;
        let frontier = Frontier::new(config.crawler.clone(), storage.clone(), run_id)?;

        Ok(Self {
            config: Arc::new(config),
            storage,
            frontier,
            client,
            run_id,
            phase: RunPhase::Idle,
        })
    }

    /// Runs the crawl until the frontier drains or a stop signal arrives
    ///
    /// Returns the per-outcome tally for the run.
    pub async fn run(&mut self) -> Result<OutcomeTally> {
        self.set_phase(RunPhase::Running);
        self.seed_frontier()?;

        let global_cap = self.config.crawler.global_concurrency as usize;
        let max_pages = self.config.crawler.max_pages;

        let mut join_set: JoinSet<WorkerReport> = JoinSet::new();
        let mut tally = OutcomeTally::default();
        let mut stopping = false;
        let mut fatal: Option<RakerError> = None;

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        // ===== Running =====
        'running: loop {
            // Apply any already-finished workers without blocking
            while let Some(joined) = join_set.try_join_next() {
                match joined {
                    Ok(report) => {
                        if let Err(e) = self.apply_report(report, &mut tally) {
                            fatal = Some(e);
                            break 'running;
                        }
                    }
                    Err(e) => tracing::warn!("Fetch worker task failed: {}", e),
                }
            }

            if max_pages > 0 && tally.total() >= max_pages {
                tracing::info!("Page budget of {} reached", max_pages);
                break;
            }

            let wait = if join_set.len() < global_cap {
                match self.frontier.next() {
                    NextUrl::Ready(url) => {
                        self.frontier.mark_in_flight(&url)?;
                        join_set.spawn(process_url(
                            self.client.clone(),
                            self.config.clone(),
                            self.storage.clone(),
                            url,
                        ));
                        continue;
                    }
                    NextUrl::Wait(duration) => duration,
                    NextUrl::Idle => {
                        if join_set.is_empty() {
                            tracing::info!("Frontier is empty, crawl complete");
                            break;
                        }
                        // In-flight fetches may still discover links
                        Duration::from_secs(1)
                    }
                }
            } else {
                Duration::from_secs(1)
            };

            tokio::select! {
                _ = &mut ctrl_c, if !stopping => {
                    tracing::info!("Stop signal received, draining in-flight fetches");
                    stopping = true;
                    break;
                }
                joined = join_set.join_next(), if !join_set.is_empty() => {
                    match joined {
                        Some(Ok(report)) => {
                            if let Err(e) = self.apply_report(report, &mut tally) {
                                fatal = Some(e);
                                break 'running;
                            }
                        }
                        Some(Err(e)) => tracing::warn!("Fetch worker task failed: {}", e),
                        None => {}
                    }
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }

        // ===== Draining =====
        if !join_set.is_empty() {
            self.set_phase(RunPhase::Draining);
            let deadline = tokio::time::Instant::now()
                + Duration::from_secs(self.config.crawler.drain_timeout_seconds);

            loop {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {
                        tracing::warn!(
                            "Drain timeout expired with {} fetches in flight; they will be requeued on the next run",
                            join_set.len()
                        );
                        join_set.abort_all();
                        break;
                    }
                    joined = join_set.join_next() => {
                        match joined {
                            Some(Ok(report)) => {
                                // A fatal store error during drain still ends the run;
                                // remaining workers are cut loose
                                if let Err(e) = self.apply_report(report, &mut tally) {
                                    fatal = Some(e);
                                    join_set.abort_all();
                                    break;
                                }
                            }
                            Some(Err(e)) => tracing::warn!("Fetch worker task failed: {}", e),
                            None => break,
                        }
                    }
                }
            }
        }

        // ===== Stopped =====
        self.set_phase(RunPhase::Stopped);
        let status = if fatal.is_some() {
            RunStatus::Failed
        } else if stopping || !self.frontier.is_drained() {
            RunStatus::Interrupted
        } else {
            RunStatus::Completed
        };

        {
            let mut guard = self.storage.lock().unwrap();
            guard.finish_run(self.run_id, status)?;
        }

        tracing::info!(
            "Run {} finished ({}): {} stored, {} duplicate, {} not-article, {} fetch-failed",
            self.run_id,
            status.to_db_string(),
            tally.stored,
            tally.skipped_duplicate,
            tally.extraction_failed,
            tally.fetch_failed
        );

        match fatal {
            Some(e) => Err(e),
            None => Ok(tally),
        }
    }

    /// Offers the configured seed URLs to the frontier
    ///
    /// On a resumed run the ledger already knows them and this is a no-op.
    fn seed_frontier(&mut self) -> Result<()> {
        let seeds = self.config.crawler.seed_urls.clone();
        for seed in &seeds {
            let normalized = normalize_url(seed)?;
            if self.frontier.add_discovered(&normalized)? {
                tracing::debug!("Seeded frontier with {}", normalized);
            }
        }
        Ok(())
    }

    /// Applies a finished worker's report: frontier transition, link
    /// discovery, outcome accounting
    ///
    /// Returns an error only for fatal conditions (persistent store failure).
    fn apply_report(&mut self, report: WorkerReport, tally: &mut OutcomeTally) -> Result<()> {
        let outcome = match &report.disposition {
            Disposition::Stored(UpsertOutcome::Stored) => {
                self.frontier.mark_visited(&report.url)?;
                CrawlOutcome::new(&report.url, OutcomeKind::Stored, None)
            }
            Disposition::Stored(UpsertOutcome::Unchanged) => {
                self.frontier.mark_visited(&report.url)?;
                CrawlOutcome::new(&report.url, OutcomeKind::SkippedDuplicate, None)
            }
            Disposition::NotArticle(detail) => {
                // The fetch succeeded; only extraction declined the page
                self.frontier.mark_visited(&report.url)?;
                CrawlOutcome::new(&report.url, OutcomeKind::ExtractionFailed, Some(detail.as_str()))
            }
            Disposition::FetchFailed {
                retriable,
                server_delay,
                detail,
            } => {
                self.frontier
                    .mark_failed(&report.url, *retriable, *server_delay, detail)?;
                CrawlOutcome::new(&report.url, OutcomeKind::FetchFailed, Some(detail.as_str()))
            }
            Disposition::StoreFailed(detail) => {
                // Leave the URL retriable for the next run, then halt:
                // continuing without a store would silently lose data
                self.frontier
                    .mark_failed(&report.url, true, None, detail)?;
                return Err(RakerError::StoreUnavailable(detail.clone()));
            }
        };

        outcome.log();
        tally.record(&outcome.result);

        self.ingest_links(&report.links)?;
        Ok(())
    }

    /// Normalizes discovered links, applies the allowed-hosts fence, and
    /// offers survivors to the frontier
    fn ingest_links(&mut self, links: &[String]) -> Result<()> {
        let mut added = 0;
        for link in links {
            let normalized = match normalize_url(link) {
                Ok(n) => n,
                Err(e) => {
                    tracing::debug!("Skipping unparseable link {}: {}", link, e);
                    continue;
                }
            };

            let host = match extract_host(&normalized) {
                Some(h) => h,
                None => continue,
            };

            if !host_is_allowed(&host, &self.config.crawler.allowed_hosts) {
                tracing::trace!("Host {} outside allowed-hosts, skipping {}", host, normalized);
                continue;
            }

            if self.frontier.add_discovered(&normalized)? {
                added += 1;
            }
        }

        if added > 0 {
            tracing::debug!(
                "Discovered {} new URLs ({} now pending)",
                added,
                self.frontier.pending_len()
            );
        }

        Ok(())
    }

    fn set_phase(&mut self, phase: RunPhase) {
        tracing::debug!("Run phase: {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }
}

/// Fetches one URL and runs it through extraction and storage
///
/// Pure with respect to the frontier: all state transitions happen in the
/// coordinator when the report is applied.
async fn process_url(
    client: Client,
    config: Arc<Config>,
    storage: Arc<Mutex<SqliteStorage>>,
    url: String,
) -> WorkerReport {
    let fetched = match fetch(&client, &url).await {
        Ok(success) => success,
        Err(e) => {
            return WorkerReport {
                disposition: Disposition::FetchFailed {
                    retriable: e.is_retriable(),
                    server_delay: e.server_delay(),
                    detail: e.to_string(),
                },
                links: Vec::new(),
                url,
            };
        }
    };

    // Resolve relative links against where the page actually came from
    let base = Url::parse(&fetched.final_url)
        .or_else(|_| Url::parse(&url))
        .ok();

    let (links, disposition) = match base {
        Some(base) => {
            let links = extract_links(&fetched.body, &base);
            let key = match normalize_url(&url) {
                Ok(k) => k,
                Err(_) => base.clone(),
            };

            let disposition = match extract_article(&fetched.body, &key, &config.extraction) {
                Ok(article) => match upsert_with_retry(&storage, &article).await {
                    Ok(outcome) => Disposition::Stored(outcome),
                    Err(e) => Disposition::StoreFailed(e.to_string()),
                },
                Err(e) => Disposition::NotArticle(e.to_string()),
            };

            (links, disposition)
        }
        None => (
            Vec::new(),
            Disposition::FetchFailed {
                retriable: false,
                server_delay: None,
                detail: "Fetched URL is not parseable".to_string(),
            },
        ),
    };

    WorkerReport {
        url,
        disposition,
        links,
    }
}

/// Upserts an article, retrying briefly while the store looks transiently busy
async fn upsert_with_retry(
    storage: &Arc<Mutex<SqliteStorage>>,
    article: &crate::storage::Article,
) -> std::result::Result<UpsertOutcome, crate::storage::StorageError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = {
            let mut guard = storage.lock().unwrap();
            guard.upsert_article(article)
        };

        match result {
            Ok(outcome) => return Ok(outcome),
            Err(e) if e.is_transient() && attempt < STORE_RETRY_ATTEMPTS => {
                tracing::warn!(
                    "Store busy upserting {} (attempt {}), retrying: {}",
                    article.url,
                    attempt,
                    e
                );
                tokio::time::sleep(Duration::from_millis(100 * attempt as u64)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_phase_transitions_are_logged_types() {
        // Phase values used by run(): compile-time sanity over the state machine
        let order = [
            RunPhase::Idle,
            RunPhase::Running,
            RunPhase::Draining,
            RunPhase::Stopped,
        ];
        assert_eq!(order.len(), 4);
        assert_ne!(RunPhase::Running, RunPhase::Draining);
    }
}
