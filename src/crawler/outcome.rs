//! Per-URL crawl outcomes
//!
//! Every URL the coordinator processes produces exactly one outcome. Outcomes
//! are transient: they are logged and tallied, never persisted (the URL
//! ledger and article store carry the durable record).

/// How processing one URL ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// Article extracted and written to the store
    Stored,

    /// Content unchanged since the last fetch; only fetched_at moved
    SkippedDuplicate,

    /// Fetched fine, but the page is not an article (listing, index, hub)
    ExtractionFailed,

    /// The fetch failed (the frontier decides whether it retries)
    FetchFailed,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stored => "stored",
            Self::SkippedDuplicate => "skipped_duplicate",
            Self::ExtractionFailed => "extraction_failed",
            Self::FetchFailed => "fetch_failed",
        }
    }
}

/// One URL's processing outcome
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub url: String,
    pub result: OutcomeKind,
    pub detail: Option<String>,
}

impl CrawlOutcome {
    pub fn new(url: &str, result: OutcomeKind, detail: Option<&str>) -> Self {
        Self {
            url: url.to_string(),
            result,
            detail: detail.map(String::from),
        }
    }

    /// Emits the outcome as a structured log line
    pub fn log(&self) {
        match self.result {
            OutcomeKind::Stored | OutcomeKind::SkippedDuplicate => {
                tracing::info!(url = %self.url, outcome = self.result.as_str());
            }
            OutcomeKind::ExtractionFailed => {
                tracing::debug!(
                    url = %self.url,
                    outcome = self.result.as_str(),
                    detail = self.detail.as_deref().unwrap_or("")
                );
            }
            OutcomeKind::FetchFailed => {
                tracing::warn!(
                    url = %self.url,
                    outcome = self.result.as_str(),
                    detail = self.detail.as_deref().unwrap_or("")
                );
            }
        }
    }
}

/// Running totals for a crawl run
#[derive(Debug, Clone, Default)]
pub struct OutcomeTally {
    pub stored: u64,
    pub skipped_duplicate: u64,
    pub extraction_failed: u64,
    pub fetch_failed: u64,
}

impl OutcomeTally {
    /// Records one outcome
    pub fn record(&mut self, kind: &OutcomeKind) {
        match kind {
            OutcomeKind::Stored => self.stored += 1,
            OutcomeKind::SkippedDuplicate => self.skipped_duplicate += 1,
            OutcomeKind::ExtractionFailed => self.extraction_failed += 1,
            OutcomeKind::FetchFailed => self.fetch_failed += 1,
        }
    }

    /// Total URLs processed
    pub fn total(&self) -> u64 {
        self.stored + self.skipped_duplicate + self.extraction_failed + self.fetch_failed
    }
}
