//! Newsraker main entry point
//!
//! Command-line interface for the newsraker crawl-and-ingest pipeline.

use clap::{Parser, Subcommand};
use newsraker::config::load_config_with_hash;
use newsraker::crawler::crawl;
use newsraker::storage::{SqliteStorage, Storage};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Newsraker: a polite news crawl-and-ingest pipeline
///
/// Newsraker fetches article pages under per-host politeness limits,
/// cleanses them down to headline/author/body/date, and stores them in a
/// deduplicated, keyword-searchable document collection.
#[derive(Parser, Debug)]
#[command(name = "newsraker")]
#[command(version)]
#[command(about = "A polite news crawl-and-ingest pipeline", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    /// Resume an interrupted crawl (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Re-fetch everything instead of resuming
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Query stored articles by keyword
    Search {
        /// Keywords to match; results are ranked by how many match
        #[arg(value_name = "KEYWORD", required = true)]
        keywords: Vec<String>,

        /// Maximum number of results
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)?;

    match cli.command {
        Some(Command::Search { keywords, limit }) => handle_search(&config, &keywords, limit)?,
        None => handle_crawl(config, &config_hash, cli.fresh).await?,
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("newsraker=info,warn"),
            1 => EnvFilter::new("newsraker=debug,info"),
            2 => EnvFilter::new("newsraker=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: newsraker::config::Config,
    config_hash: &str,
    fresh: bool,
) -> anyhow::Result<()> {
    if fresh {
        tracing::info!("Starting fresh crawl (re-fetching everything)");
    } else {
        tracing::info!("Starting crawl (will resume if an interrupted run exists)");
    }

    tracing::info!(
        "Seeds: {}, allowed hosts: {}",
        config.crawler.seed_urls.len(),
        config.crawler.allowed_hosts.len()
    );

    let tally = crawl(config, config_hash, fresh).await?;

    println!(
        "Crawl finished: {} stored, {} unchanged, {} not articles, {} fetch failures",
        tally.stored, tally.skipped_duplicate, tally.extraction_failed, tally.fetch_failed
    );

    Ok(())
}

/// Handles the `search` subcommand: queries the article store and prints hits
fn handle_search(
    config: &newsraker::config::Config,
    keywords: &[String],
    limit: usize,
) -> anyhow::Result<()> {
    let storage = SqliteStorage::new(std::path::Path::new(&config.storage.database_path))?;

    let results = storage.search(keywords, limit)?;

    if results.is_empty() {
        println!("No articles matched {:?}", keywords);
        return Ok(());
    }

    for (rank, hit) in results.iter().enumerate() {
        println!(
            "{}. {} [{} keyword(s) matched]",
            rank + 1,
            hit.headline,
            hit.match_count
        );
        println!("   {}", hit.url);
        if let Some(author) = &hit.author {
            println!("   by {}", author);
        }
        if let Some(published) = &hit.published_at {
            println!("   published {}", published);
        }
        println!("   {}", hit.snippet);
        println!();
    }

    Ok(())
}
