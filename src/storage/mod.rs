//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - The URL ledger (the frontier's durable state)
//! - Idempotent article upserts keyed by normalized URL
//! - The full-text index behind keyword search
//! - Run tracking and resumption support

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::UrlState;
use serde::Serialize;

/// A URL row in the frontier ledger
///
/// Rows are created on discovery and never deleted; they are the crawl's
/// audit trail and dedup ledger.
#[derive(Debug, Clone)]
pub struct UrlRecord {
    pub url: String,
    pub host: String,
    pub state: UrlState,
    pub attempt_count: u32,
    /// Insertion order; retries keep their original position
    pub seq: i64,
    pub discovered_at: String,
    pub last_attempt_at: Option<String>,
    pub next_eligible_at: Option<String>,
    pub last_error: Option<String>,
    pub discovered_run: i64,
}

/// A cleansed article, as produced by extraction
#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    pub url: String,
    pub headline: String,
    pub author: Option<String>,
    pub body_text: String,
    /// RFC 3339 publish timestamp, when the page carried one
    pub published_at: Option<String>,
}

/// An article row as stored, with ingest bookkeeping
#[derive(Debug, Clone)]
pub struct ArticleRecord {
    pub url: String,
    pub headline: String,
    pub author: Option<String>,
    pub body_text: String,
    pub published_at: Option<String>,
    pub fetched_at: String,
    /// SHA-256 hex digest of body_text
    pub content_hash: String,
}

/// Result of an article upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new record was inserted, or an existing one rewritten with new content
    Stored,
    /// Content hash matched the existing record; only fetched_at was refreshed
    Unchanged,
}

/// A ranked search hit
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub url: String,
    pub headline: String,
    pub author: Option<String>,
    pub published_at: Option<String>,
    pub snippet: String,
    /// Number of distinct query keywords the article matched
    pub match_count: usize,
}

/// A crawl run row
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_roundtrip() {
        for status in &[
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Interrupted,
            RunStatus::Failed,
        ] {
            let parsed = RunStatus::from_db_string(status.to_db_string());
            assert_eq!(Some(*status), parsed);
        }
    }

    #[test]
    fn test_run_status_invalid() {
        assert_eq!(RunStatus::from_db_string("invalid"), None);
    }
}
