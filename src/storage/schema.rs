//! Database schema definitions
//!
//! All SQL schema for the newsraker database lives here. The `urls` table is
//! the frontier's durable ledger; `articles` plus its FTS5 shadow table are
//! the document collection and full-text index.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- The frontier ledger: every URL ever discovered, keyed by normalized form.
-- Rows are never deleted; rowid doubles as discovery order.
CREATE TABLE IF NOT EXISTS urls (
    url TEXT PRIMARY KEY,
    host TEXT NOT NULL,
    state TEXT NOT NULL,
    attempt_count INTEGER NOT NULL DEFAULT 0,
    discovered_at TEXT NOT NULL,
    last_attempt_at TEXT,
    next_eligible_at TEXT,
    last_error TEXT,
    discovered_run INTEGER NOT NULL REFERENCES runs(id)
);

CREATE INDEX IF NOT EXISTS idx_urls_state ON urls(state);
CREATE INDEX IF NOT EXISTS idx_urls_host ON urls(host);

-- The document collection, keyed by normalized URL
CREATE TABLE IF NOT EXISTS articles (
    url TEXT PRIMARY KEY,
    headline TEXT NOT NULL,
    author TEXT,
    body_text TEXT NOT NULL,
    published_at TEXT,
    fetched_at TEXT NOT NULL,
    content_hash TEXT NOT NULL
);

-- Full-text index over the document collection, kept in sync by triggers
CREATE VIRTUAL TABLE IF NOT EXISTS articles_fts USING fts5(
    headline,
    body_text,
    content='articles',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS articles_after_insert AFTER INSERT ON articles BEGIN
    INSERT INTO articles_fts(rowid, headline, body_text)
    VALUES (new.rowid, new.headline, new.body_text);
END;

CREATE TRIGGER IF NOT EXISTS articles_after_delete AFTER DELETE ON articles BEGIN
    INSERT INTO articles_fts(articles_fts, rowid, headline, body_text)
    VALUES ('delete', old.rowid, old.headline, old.body_text);
END;

CREATE TRIGGER IF NOT EXISTS articles_after_update AFTER UPDATE ON articles BEGIN
    INSERT INTO articles_fts(articles_fts, rowid, headline, body_text)
    VALUES ('delete', old.rowid, old.headline, old.body_text);
    INSERT INTO articles_fts(rowid, headline, body_text)
    VALUES (new.rowid, new.headline, new.body_text);
END;
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
