//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::UrlState;
use crate::storage::{Article, ArticleRecord, RunRecord, RunStatus, SearchResult, UpsertOutcome, UrlRecord};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("URL not found: {0}")]
    UrlNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StorageError {
    /// Returns true for errors worth retrying (the store may recover)
    ///
    /// SQLITE_BUSY / SQLITE_LOCKED mean another connection holds the write
    /// lock; everything else is treated as persistent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines all database operations needed by the crawler. The
/// frontier and coordinator only touch persistent state through it.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new crawl run, returning its ID
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Marks a run finished with the given status and a finish timestamp
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    // ===== URL Ledger =====

    /// Inserts a URL into the ledger in Discovered state
    ///
    /// Returns false (and changes nothing) if the URL is already known; this
    /// is the dedup check behind `Frontier::add_discovered`.
    fn insert_url(&mut self, url: &str, host: &str, discovered_run: i64) -> StorageResult<bool>;

    /// Gets a ledger row by normalized URL
    fn get_url(&self, url: &str) -> StorageResult<Option<UrlRecord>>;

    /// Writes a URL state transition in one statement
    ///
    /// The frontier owns attempt accounting, so the full set of mutable
    /// columns is passed each time.
    fn update_url_state(
        &mut self,
        url: &str,
        state: UrlState,
        attempt_count: u32,
        last_attempt_at: Option<&str>,
        next_eligible_at: Option<&str>,
        last_error: Option<&str>,
    ) -> StorageResult<()>;

    /// Loads the entire ledger in discovery order (frontier startup)
    fn load_urls(&self) -> StorageResult<Vec<UrlRecord>>;

    /// Requeues URLs left InFlight by a crashed run back to Discovered
    ///
    /// Returns the number of rows requeued.
    fn requeue_in_flight(&mut self) -> StorageResult<u64>;

    /// Resets every ledger row to Discovered for a fresh re-crawl
    ///
    /// Attempt counts and eligibility times are cleared; the rows themselves
    /// (and stored articles) are kept, so unchanged pages surface as
    /// `Unchanged` upserts rather than duplicates.
    fn reset_frontier(&mut self) -> StorageResult<u64>;

    /// Counts ledger rows in a given state
    fn count_urls_by_state(&self, state: UrlState) -> StorageResult<u64>;

    // ===== Articles =====

    /// Idempotently upserts an article keyed by its URL
    ///
    /// When the stored content hash matches the incoming body, only
    /// `fetched_at` is refreshed and `Unchanged` is returned. Repeated calls
    /// with identical content never produce a second record.
    fn upsert_article(&mut self, article: &Article) -> StorageResult<UpsertOutcome>;

    /// Gets a stored article by URL
    fn get_article(&self, url: &str) -> StorageResult<Option<ArticleRecord>>;

    /// Counts stored articles
    fn count_articles(&self) -> StorageResult<u64>;

    /// Keyword search over the full-text index
    ///
    /// Results are ranked by number of matched keywords, then recency
    /// (published_at falling back to fetched_at), then URL lexical order, so
    /// identical queries over identical state return identical sequences.
    fn search(&self, keywords: &[String], limit: usize) -> StorageResult<Vec<SearchResult>>;
}
