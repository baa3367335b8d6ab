//! Integration tests for the crawler
//!
//! These tests use wiremock to stand up mock news sites and drive the full
//! fetch -> extract -> store pipeline end-to-end.

use newsraker::config::{
    Config, CrawlerConfig, ExtractionConfig, StorageConfig, UserAgentConfig,
};
use newsraker::crawler::Coordinator;
use newsraker::state::UrlState;
use newsraker::storage::{SqliteStorage, Storage};
use std::path::Path;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointed at a mock server
fn create_test_config(server_uri: &str, seeds: Vec<String>, db_path: &str) -> Config {
    let host = url::Url::parse(server_uri)
        .expect("mock server uri")
        .host_str()
        .expect("mock server host")
        .to_string();

    Config {
        crawler: CrawlerConfig {
            seed_urls: seeds,
            allowed_hosts: vec![host],
            min_delay_seconds: 0.01,
            max_concurrent_per_host: 4,
            global_concurrency: 4,
            max_retries: 3,
            backoff_base_seconds: 0.05,
            backoff_cap_seconds: 0.2,
            drain_timeout_seconds: 5,
            max_pages: 0,
        },
        extraction: ExtractionConfig {
            min_article_text_length: 100,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestRaker".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        storage: StorageConfig {
            database_path: db_path.to_string(),
        },
    }
}

fn html_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/html")
}

/// A page dense enough to extract, with a given headline and body topic
fn article_html(headline: &str, body_sentence: &str) -> String {
    let paragraph = format!("{} ", body_sentence).repeat(8);
    format!(
        r#"<html><head><title>{headline}</title>
        <meta property="article:published_time" content="2026-03-01T12:00:00+00:00">
        </head><body>
        <article><h1>{headline}</h1><p>{paragraph}</p></article>
        </body></html>"#
    )
}

async fn mount_article(server: &MockServer, route: &str, headline: &str, body_sentence: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html_response(article_html(headline, body_sentence)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_listing_page_feeds_articles_into_store() {
    let server = MockServer::start().await;
    let base = server.uri();

    // The index is link-sparse: extraction fails, links still count
    Mock::given(method("GET"))
        .and(path("/index"))
        .respond_with(html_response(format!(
            r#"<html><head><title>Index</title></head><body>
            <h1>Latest</h1>
            <a href="{base}/story/election">Election story</a>
            <a href="{base}/story/weather">Weather story</a>
            </body></html>"#
        )))
        .mount(&server)
        .await;

    mount_article(
        &server,
        "/story/election",
        "Election night surprises",
        "The election turnout broke records across every district.",
    )
    .await;
    mount_article(
        &server,
        "/story/weather",
        "Storm front arrives",
        "Heavy rain moved across the coastal plains before dawn.",
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("crawl.db");
    let config = create_test_config(
        &base,
        vec![format!("{}/index", base)],
        db_path.to_str().unwrap(),
    );

    let mut coordinator = Coordinator::new(config, "test-hash", false).expect("coordinator");
    let tally = coordinator.run().await.expect("crawl failed");

    assert_eq!(tally.stored, 2);
    assert_eq!(tally.extraction_failed, 1);
    assert_eq!(tally.fetch_failed, 0);

    let storage = SqliteStorage::new(&db_path).expect("open db");

    // All three URLs ended Visited (extraction failure is not a fetch failure)
    assert_eq!(storage.count_urls_by_state(UrlState::Visited).unwrap(), 3);
    assert_eq!(storage.count_urls_by_state(UrlState::Failed).unwrap(), 0);
    assert_eq!(storage.count_articles().unwrap(), 2);

    // Only the article whose body mentions the keyword comes back
    let hits = storage.search(&["election".to_string()], 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].headline, "Election night surprises");
    assert!(hits[0].snippet.to_lowercase().contains("election"));
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_article(
        &server,
        "/story/one",
        "A steady story",
        "Nothing about this article changes between fetches at all.",
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("crawl.db");
    let seeds = vec![format!("{}/story/one", base)];

    let config = create_test_config(&base, seeds.clone(), db_path.to_str().unwrap());
    let mut coordinator = Coordinator::new(config, "test-hash", false).expect("coordinator");
    let first = coordinator.run().await.expect("first crawl");
    assert_eq!(first.stored, 1);
    drop(coordinator);

    // Fresh re-crawl of an unchanged site: same row, Unchanged upsert
    let config = create_test_config(&base, seeds, db_path.to_str().unwrap());
    let mut coordinator = Coordinator::new(config, "test-hash", true).expect("coordinator");
    let second = coordinator.run().await.expect("second crawl");

    assert_eq!(second.stored, 0);
    assert_eq!(second.skipped_duplicate, 1);

    let storage = SqliteStorage::new(&db_path).expect("open db");
    assert_eq!(storage.count_articles().unwrap(), 1);
}

#[tokio::test]
async fn test_503_three_times_then_success() {
    let server = MockServer::start().await;
    let base = server.uri();

    // Three 503s, then the real page
    Mock::given(method("GET"))
        .and(path("/story/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(3)
        .mount(&server)
        .await;
    mount_article(
        &server,
        "/story/flaky",
        "Eventually consistent",
        "The page came back after a brief outage at the origin server.",
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("crawl.db");
    let config = create_test_config(
        &base,
        vec![format!("{}/story/flaky", base)],
        db_path.to_str().unwrap(),
    );

    let mut coordinator = Coordinator::new(config, "test-hash", false).expect("coordinator");
    let tally = coordinator.run().await.expect("crawl failed");

    assert_eq!(tally.stored, 1);
    assert_eq!(tally.fetch_failed, 3);

    let storage = SqliteStorage::new(&db_path).expect("open db");
    let record = storage
        .get_url(&format!("{}/story/flaky", base))
        .unwrap()
        .expect("ledger row");

    assert_eq!(record.state, UrlState::Visited);
    assert_eq!(record.attempt_count, 4);
    assert_eq!(storage.count_articles().unwrap(), 1);
}

#[tokio::test]
async fn test_404_is_terminal_without_retries() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("crawl.db");
    let config = create_test_config(
        &base,
        vec![format!("{}/gone", base)],
        db_path.to_str().unwrap(),
    );

    let mut coordinator = Coordinator::new(config, "test-hash", false).expect("coordinator");
    let tally = coordinator.run().await.expect("crawl failed");

    assert_eq!(tally.fetch_failed, 1);

    let storage = SqliteStorage::new(&db_path).expect("open db");
    let record = storage
        .get_url(&format!("{}/gone", base))
        .unwrap()
        .expect("ledger row");

    assert_eq!(record.state, UrlState::Failed);
    assert_eq!(record.attempt_count, 1);
    // expect(1) on the mock verifies no retry happened when the server drops
}

#[tokio::test]
async fn test_allowed_hosts_fence_external_links() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/index"))
        .respond_with(html_response(format!(
            r#"<html><head><title>Index</title></head><body>
            <a href="{base}/story/local">Local</a>
            <a href="https://elsewhere.example/away">Away</a>
            </body></html>"#
        )))
        .mount(&server)
        .await;
    mount_article(
        &server,
        "/story/local",
        "Local coverage",
        "The town council met for several hours to debate the budget.",
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("crawl.db");
    let config = create_test_config(
        &base,
        vec![format!("{}/index", base)],
        db_path.to_str().unwrap(),
    );

    let mut coordinator = Coordinator::new(config, "test-hash", false).expect("coordinator");
    coordinator.run().await.expect("crawl failed");

    let storage = SqliteStorage::new(&db_path).expect("open db");

    // The external URL never entered the ledger
    assert!(storage
        .get_url("https://elsewhere.example/away")
        .unwrap()
        .is_none());
    assert_eq!(storage.count_urls_by_state(UrlState::Visited).unwrap(), 2);
}

#[tokio::test]
async fn test_restart_requeues_in_flight_url() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_article(
        &server,
        "/story/cut-off",
        "Interrupted fetch",
        "This page was mid-fetch when the previous process died abruptly.",
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("crawl.db");
    let story_url = format!("{}/story/cut-off", base);

    // Simulate a crashed run: a ledger row stuck InFlight
    {
        let mut storage = SqliteStorage::new(&db_path).expect("open db");
        let run = storage.create_run("test-hash").unwrap();
        storage
            .insert_url(&story_url, "127.0.0.1", run)
            .unwrap();
        storage
            .update_url_state(&story_url, UrlState::InFlight, 1, None, None, None)
            .unwrap();
    }

    let config = create_test_config(&base, vec![story_url.clone()], db_path.to_str().unwrap());
    let mut coordinator = Coordinator::new(config, "test-hash", false).expect("coordinator");
    let tally = coordinator.run().await.expect("crawl failed");

    assert_eq!(tally.stored, 1);

    let storage = SqliteStorage::new(&db_path).expect("open db");
    let record = storage.get_url(&story_url).unwrap().expect("ledger row");

    assert_eq!(record.state, UrlState::Visited);
    // One attempt from the crashed run plus the successful retry
    assert_eq!(record.attempt_count, 2);
}
