//! SQLite storage implementation
//!
//! This module provides the SQLite-based implementation of the Storage trait,
//! including the FTS5-backed keyword search.

use crate::state::UrlState;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageResult};
use crate::storage::{
    Article, ArticleRecord, RunRecord, RunStatus, SearchResult, UpsertOutcome, UrlRecord,
};
use crate::RakerError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(RakerError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, RakerError> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self, RakerError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Computes the hex SHA-256 digest of an article body
    pub fn content_hash(body_text: &str) -> String {
        hex::encode(Sha256::digest(body_text.as_bytes()))
    }

    fn row_to_url_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<UrlRecord> {
        Ok(UrlRecord {
            seq: row.get(0)?,
            url: row.get(1)?,
            host: row.get(2)?,
            state: UrlState::from_db_string(&row.get::<_, String>(3)?)
                .unwrap_or(UrlState::Failed),
            attempt_count: row.get(4)?,
            discovered_at: row.get(5)?,
            last_attempt_at: row.get(6)?,
            next_eligible_at: row.get(7)?,
            last_error: row.get(8)?,
            discovered_run: row.get(9)?,
        })
    }
}

const URL_COLUMNS: &str = "rowid, url, host, state, attempt_count, discovered_at,
             last_attempt_at, next_eligible_at, last_error, discovered_run";

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
        )?;

        let run = stmt
            .query_row([], |row| {
                Ok(RunRecord {
                    id: row.get(0)?,
                    started_at: row.get(1)?,
                    finished_at: row.get(2)?,
                    config_hash: row.get(3)?,
                    status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
                        .unwrap_or(RunStatus::Running),
                })
            })
            .optional()?;

        Ok(run)
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        Ok(())
    }

    // ===== URL Ledger =====

    fn insert_url(&mut self, url: &str, host: &str, discovered_run: i64) -> StorageResult<bool> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO urls (url, host, state, discovered_at, discovered_run)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                url,
                host,
                UrlState::Discovered.to_db_string(),
                now,
                discovered_run
            ],
        )?;
        Ok(changed > 0)
    }

    fn get_url(&self, url: &str) -> StorageResult<Option<UrlRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM urls WHERE url = ?1", URL_COLUMNS))?;

        let record = stmt
            .query_row(params![url], Self::row_to_url_record)
            .optional()?;

        Ok(record)
    }

    fn update_url_state(
        &mut self,
        url: &str,
        state: UrlState,
        attempt_count: u32,
        last_attempt_at: Option<&str>,
        next_eligible_at: Option<&str>,
        last_error: Option<&str>,
    ) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE urls SET state = ?1, attempt_count = ?2, last_attempt_at = ?3,
             next_eligible_at = ?4, last_error = ?5 WHERE url = ?6",
            params![
                state.to_db_string(),
                attempt_count,
                last_attempt_at,
                next_eligible_at,
                last_error,
                url
            ],
        )?;
        Ok(())
    }

    fn load_urls(&self) -> StorageResult<Vec<UrlRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM urls ORDER BY rowid", URL_COLUMNS))?;

        let records = stmt
            .query_map([], Self::row_to_url_record)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn requeue_in_flight(&mut self) -> StorageResult<u64> {
        let changed = self.conn.execute(
            "UPDATE urls SET state = ?1, next_eligible_at = NULL WHERE state = ?2",
            params![
                UrlState::Discovered.to_db_string(),
                UrlState::InFlight.to_db_string()
            ],
        )?;
        Ok(changed as u64)
    }

    fn reset_frontier(&mut self) -> StorageResult<u64> {
        let changed = self.conn.execute(
            "UPDATE urls SET state = ?1, attempt_count = 0, next_eligible_at = NULL, last_error = NULL
             WHERE state != ?1",
            params![UrlState::Discovered.to_db_string()],
        )?;
        Ok(changed as u64)
    }

    fn count_urls_by_state(&self, state: UrlState) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM urls WHERE state = ?1",
            params![state.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Articles =====

    fn upsert_article(&mut self, article: &Article) -> StorageResult<UpsertOutcome> {
        let now = Utc::now().to_rfc3339();
        let content_hash = Self::content_hash(&article.body_text);

        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT content_hash FROM articles WHERE url = ?1",
                params![article.url],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(hash) if hash == content_hash => {
                self.conn.execute(
                    "UPDATE articles SET fetched_at = ?1 WHERE url = ?2",
                    params![now, article.url],
                )?;
                Ok(UpsertOutcome::Unchanged)
            }
            Some(_) => {
                self.conn.execute(
                    "UPDATE articles SET headline = ?1, author = ?2, body_text = ?3,
                     published_at = ?4, fetched_at = ?5, content_hash = ?6 WHERE url = ?7",
                    params![
                        article.headline,
                        article.author,
                        article.body_text,
                        article.published_at,
                        now,
                        content_hash,
                        article.url
                    ],
                )?;
                Ok(UpsertOutcome::Stored)
            }
            None => {
                self.conn.execute(
                    "INSERT INTO articles (url, headline, author, body_text, published_at, fetched_at, content_hash)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        article.url,
                        article.headline,
                        article.author,
                        article.body_text,
                        article.published_at,
                        now,
                        content_hash
                    ],
                )?;
                Ok(UpsertOutcome::Stored)
            }
        }
    }

    fn get_article(&self, url: &str) -> StorageResult<Option<ArticleRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, headline, author, body_text, published_at, fetched_at, content_hash
             FROM articles WHERE url = ?1",
        )?;

        let record = stmt
            .query_row(params![url], |row| {
                Ok(ArticleRecord {
                    url: row.get(0)?,
                    headline: row.get(1)?,
                    author: row.get(2)?,
                    body_text: row.get(3)?,
                    published_at: row.get(4)?,
                    fetched_at: row.get(5)?,
                    content_hash: row.get(6)?,
                })
            })
            .optional()?;

        Ok(record)
    }

    fn count_articles(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn search(&self, keywords: &[String], limit: usize) -> StorageResult<Vec<SearchResult>> {
        // One FTS pass per keyword; an article's rank is the number of
        // distinct keywords whose passes found it.
        let mut matches: HashMap<String, usize> = HashMap::new();
        let mut matched_terms: HashMap<String, Vec<String>> = HashMap::new();

        for keyword in keywords {
            let term = sanitize_keyword(keyword);
            if term.is_empty() {
                continue;
            }

            let mut stmt = self.conn.prepare(
                "SELECT a.url FROM articles_fts f JOIN articles a ON a.rowid = f.rowid
                 WHERE articles_fts MATCH ?1",
            )?;

            let urls = stmt
                .query_map(params![format!("\"{}\"", term)], |row| {
                    row.get::<_, String>(0)
                })?
                .collect::<Result<Vec<_>, _>>()?;

            for url in urls {
                *matches.entry(url.clone()).or_insert(0) += 1;
                matched_terms.entry(url).or_default().push(term.clone());
            }
        }

        // Pull the matched rows and rank deterministically
        let mut hits: Vec<(SearchResult, usize, DateTime<Utc>)> = Vec::new();
        for (url, match_count) in matches {
            let record = match self.get_article(&url)? {
                Some(r) => r,
                None => continue,
            };

            let recency = parse_recency(record.published_at.as_deref(), &record.fetched_at);
            let terms = matched_terms.remove(&url).unwrap_or_default();
            let snippet = make_snippet(&record.body_text, &terms);

            hits.push((
                SearchResult {
                    url: record.url,
                    headline: record.headline,
                    author: record.author,
                    published_at: record.published_at,
                    snippet,
                    match_count,
                },
                match_count,
                recency,
            ));
        }

        // Rank: matched-keyword count desc, recency desc, URL asc
        hits.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then_with(|| b.2.cmp(&a.2))
                .then_with(|| a.0.url.cmp(&b.0.url))
        });

        Ok(hits
            .into_iter()
            .take(limit)
            .map(|(result, _, _)| result)
            .collect())
    }
}

/// Reduces a raw query keyword to a safe FTS term
///
/// Keeps alphanumerics only, lowercased; FTS5 syntax characters in user
/// input must not reach the MATCH expression.
fn sanitize_keyword(keyword: &str) -> String {
    keyword
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// Ranking timestamp for an article: published_at when present, else fetched_at
fn parse_recency(published_at: Option<&str>, fetched_at: &str) -> DateTime<Utc> {
    published_at
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .or_else(|| DateTime::parse_from_rfc3339(fetched_at).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Builds a short plain-text snippet around the first keyword hit
///
/// Falls back to the head of the body when no keyword is found in the text
/// (e.g. the match was in the headline).
fn make_snippet(body: &str, terms: &[String]) -> String {
    const WINDOW: usize = 160;

    let lowered = body.to_lowercase();
    // Byte positions in the lowercased copy only map back cleanly when
    // lowercasing didn't change the length; otherwise snip from the start.
    let positions_map = lowered.len() == body.len();

    let hit = if positions_map {
        terms
            .iter()
            .filter_map(|t| lowered.find(t.as_str()))
            .min()
    } else {
        None
    };

    let start = match hit {
        Some(pos) => {
            // Back up to a char boundary
            let mut from = pos.saturating_sub(WINDOW / 4);
            while from > 0 && !body.is_char_boundary(from) {
                from -= 1;
            }
            from
        }
        None => 0,
    };

    let mut end = (start + WINDOW).min(body.len());
    while end < body.len() && !body.is_char_boundary(end) {
        end += 1;
    }

    let mut snippet = String::new();
    if start > 0 {
        snippet.push_str("...");
    }
    snippet.push_str(body[start..end].trim());
    if end < body.len() {
        snippet.push_str("...");
    }
    snippet
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(url: &str, headline: &str, body: &str, published_at: Option<&str>) -> Article {
        Article {
            url: url.to_string(),
            headline: headline.to_string(),
            author: None,
            body_text: body.to_string(),
            published_at: published_at.map(String::from),
        }
    }

    #[test]
    fn test_insert_url_dedups() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run = storage.create_run("hash").unwrap();

        assert!(storage
            .insert_url("https://news.example/a", "news.example", run)
            .unwrap());
        assert!(!storage
            .insert_url("https://news.example/a", "news.example", run)
            .unwrap());

        let record = storage.get_url("https://news.example/a").unwrap().unwrap();
        assert_eq!(record.state, UrlState::Discovered);
        assert_eq!(record.attempt_count, 0);
    }

    #[test]
    fn test_update_url_state() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run = storage.create_run("hash").unwrap();
        storage
            .insert_url("https://news.example/a", "news.example", run)
            .unwrap();

        storage
            .update_url_state(
                "https://news.example/a",
                UrlState::InFlight,
                1,
                Some("2026-01-01T00:00:00+00:00"),
                None,
                None,
            )
            .unwrap();

        let record = storage.get_url("https://news.example/a").unwrap().unwrap();
        assert_eq!(record.state, UrlState::InFlight);
        assert_eq!(record.attempt_count, 1);
        assert!(record.last_attempt_at.is_some());
    }

    #[test]
    fn test_requeue_in_flight() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run = storage.create_run("hash").unwrap();
        storage
            .insert_url("https://news.example/a", "news.example", run)
            .unwrap();
        storage
            .insert_url("https://news.example/b", "news.example", run)
            .unwrap();
        storage
            .update_url_state("https://news.example/a", UrlState::InFlight, 1, None, None, None)
            .unwrap();

        let requeued = storage.requeue_in_flight().unwrap();
        assert_eq!(requeued, 1);

        let record = storage.get_url("https://news.example/a").unwrap().unwrap();
        assert_eq!(record.state, UrlState::Discovered);
        // Attempt history survives the requeue
        assert_eq!(record.attempt_count, 1);
    }

    #[test]
    fn test_reset_frontier_requeues_everything() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run = storage.create_run("hash").unwrap();
        storage
            .insert_url("https://news.example/a", "news.example", run)
            .unwrap();
        storage
            .update_url_state("https://news.example/a", UrlState::Visited, 2, None, None, None)
            .unwrap();

        let reset = storage.reset_frontier().unwrap();
        assert_eq!(reset, 1);

        let record = storage.get_url("https://news.example/a").unwrap().unwrap();
        assert_eq!(record.state, UrlState::Discovered);
        assert_eq!(record.attempt_count, 0);
    }

    #[test]
    fn test_load_urls_in_discovery_order() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run = storage.create_run("hash").unwrap();
        for path in ["a", "b", "c"] {
            storage
                .insert_url(
                    &format!("https://news.example/{}", path),
                    "news.example",
                    run,
                )
                .unwrap();
        }

        let urls = storage.load_urls().unwrap();
        assert_eq!(urls.len(), 3);
        assert!(urls[0].seq < urls[1].seq && urls[1].seq < urls[2].seq);
        assert_eq!(urls[0].url, "https://news.example/a");
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let a = article("https://news.example/a", "Headline", "Body text here.", None);

        assert_eq!(storage.upsert_article(&a).unwrap(), UpsertOutcome::Stored);
        assert_eq!(storage.upsert_article(&a).unwrap(), UpsertOutcome::Unchanged);
        assert_eq!(storage.count_articles().unwrap(), 1);
    }

    #[test]
    fn test_upsert_changed_content_rewrites() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let a = article("https://news.example/a", "Headline", "First version.", None);
        storage.upsert_article(&a).unwrap();

        let b = article("https://news.example/a", "Headline", "Second version.", None);
        assert_eq!(storage.upsert_article(&b).unwrap(), UpsertOutcome::Stored);
        assert_eq!(storage.count_articles().unwrap(), 1);

        let stored = storage.get_article("https://news.example/a").unwrap().unwrap();
        assert_eq!(stored.body_text, "Second version.");
        assert_eq!(stored.content_hash, SqliteStorage::content_hash("Second version."));
    }

    #[test]
    fn test_unchanged_upsert_refreshes_fetched_at() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let a = article("https://news.example/a", "Headline", "Body.", None);
        storage.upsert_article(&a).unwrap();

        let first = storage.get_article("https://news.example/a").unwrap().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        storage.upsert_article(&a).unwrap();
        let second = storage.get_article("https://news.example/a").unwrap().unwrap();

        assert!(second.fetched_at >= first.fetched_at);
        assert_eq!(first.content_hash, second.content_hash);
    }

    #[test]
    fn test_search_ranks_by_match_count_then_recency() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();

        storage
            .upsert_article(&article(
                "https://news.example/one",
                "Election results",
                "The election turnout was high across the region.",
                Some("2026-01-02T00:00:00+00:00"),
            ))
            .unwrap();
        storage
            .upsert_article(&article(
                "https://news.example/two",
                "Election recount ordered",
                "A recount of the election followed the close turnout figures.",
                Some("2026-01-01T00:00:00+00:00"),
            ))
            .unwrap();
        storage
            .upsert_article(&article(
                "https://news.example/three",
                "Weather report",
                "Sunny skies expected all week.",
                Some("2026-01-03T00:00:00+00:00"),
            ))
            .unwrap();

        let keywords = vec!["election".to_string(), "recount".to_string()];
        let results = storage.search(&keywords, 10).unwrap();

        assert_eq!(results.len(), 2);
        // /two matches both keywords, /one only one; the weather page neither
        assert_eq!(results[0].url, "https://news.example/two");
        assert_eq!(results[0].match_count, 2);
        assert_eq!(results[1].url, "https://news.example/one");
        assert_eq!(results[1].match_count, 1);
    }

    #[test]
    fn test_search_recency_breaks_match_ties() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();

        storage
            .upsert_article(&article(
                "https://news.example/old",
                "Election piece",
                "An election story.",
                Some("2026-01-01T00:00:00+00:00"),
            ))
            .unwrap();
        storage
            .upsert_article(&article(
                "https://news.example/new",
                "Election update",
                "Another election story.",
                Some("2026-02-01T00:00:00+00:00"),
            ))
            .unwrap();

        let results = storage.search(&["election".to_string()], 10).unwrap();
        assert_eq!(results[0].url, "https://news.example/new");
        assert_eq!(results[1].url, "https://news.example/old");
    }

    #[test]
    fn test_search_is_deterministic() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        for i in 0..5 {
            storage
                .upsert_article(&article(
                    &format!("https://news.example/{}", i),
                    "Election coverage",
                    "Election coverage body.",
                    Some("2026-01-01T00:00:00+00:00"),
                ))
                .unwrap();
        }

        let keywords = vec!["election".to_string()];
        let first: Vec<String> = storage
            .search(&keywords, 10)
            .unwrap()
            .into_iter()
            .map(|r| r.url)
            .collect();

        for _ in 0..3 {
            let again: Vec<String> = storage
                .search(&keywords, 10)
                .unwrap()
                .into_iter()
                .map(|r| r.url)
                .collect();
            assert_eq!(first, again);
        }

        // Identical rank keys fall back to URL lexical order
        assert!(first.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_search_respects_limit() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        for i in 0..5 {
            storage
                .upsert_article(&article(
                    &format!("https://news.example/{}", i),
                    "Election coverage",
                    "Election coverage body.",
                    None,
                ))
                .unwrap();
        }

        let results = storage.search(&["election".to_string()], 2).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_search_ignores_hostile_keywords() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .upsert_article(&article(
                "https://news.example/a",
                "Election",
                "Election body.",
                None,
            ))
            .unwrap();

        // FTS syntax in the query must not break or widen the search
        let results = storage
            .search(&["election\" OR \"*".to_string()], 10)
            .unwrap();
        assert!(results.is_empty() || results[0].match_count == 1);

        let results = storage.search(&["".to_string()], 10).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_snippet_centers_on_keyword() {
        let padding = "Lorem ipsum dolor sit amet. ".repeat(20);
        let body = format!("{}The election result surprised everyone. {}", padding, padding);
        let snippet = make_snippet(&body, &["election".to_string()]);

        assert!(snippet.contains("election"));
        assert!(snippet.starts_with("..."));
        assert!(snippet.ends_with("..."));
    }

    #[test]
    fn test_snippet_falls_back_to_head() {
        let snippet = make_snippet("Short body.", &["absent".to_string()]);
        assert_eq!(snippet, "Short body.");
    }
}
