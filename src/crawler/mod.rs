//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with typed error classification
//! - Article extraction and link discovery
//! - Overall crawl coordination and the bounded worker pool

mod coordinator;
mod extractor;
mod fetcher;
mod outcome;

pub use coordinator::{Coordinator, RunPhase};
pub use extractor::{extract_article, extract_links, ExtractError};
pub use fetcher::{build_http_client, fetch, FetchError, FetchSuccess};
pub use outcome::{CrawlOutcome, OutcomeKind, OutcomeTally};

use crate::config::Config;
use crate::Result;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the storage layer and resume or create a run
/// 2. Seed the frontier and recover crashed in-flight URLs
/// 3. Fetch, extract, and store pages under the politeness policy
/// 4. Drain cleanly on a stop signal
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `config_hash` - Hash of the loaded configuration file
/// * `fresh` - Re-fetch everything instead of resuming
///
/// # Returns
///
/// * `Ok(OutcomeTally)` - Crawl completed; per-outcome totals
/// * `Err(RakerError)` - Crawl failed
pub async fn crawl(config: Config, config_hash: &str, fresh: bool) -> Result<OutcomeTally> {
    let mut coordinator = Coordinator::new(config, config_hash, fresh)?;
    coordinator.run().await
}
