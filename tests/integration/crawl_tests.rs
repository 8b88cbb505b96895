//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the upstream comment API and
//! run full collection crawls against a temporary SQLite database.

use comment_harvester::config::{
    CollectionConfig, CollectionKind, Config, CrawlerConfig, OutputConfig, UserAgentConfig,
};
use comment_harvester::crawler::{crawl, Downloader};
use comment_harvester::output::Stats;
use comment_harvester::storage::{open_storage, CollectionStore, SqliteStorage, StoredRecord};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration writing into `db_path`
fn create_test_config(db_path: &Path, collections: Vec<CollectionConfig>) -> Config {
    Config {
        crawler: CrawlerConfig {
            network_concurrency: 8,
            fan_out_limit: 32,
            max_retries: 2,
            request_timeout_secs: 5,
            report_interval_ms: 500,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestHarvester".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
        },
        output: OutputConfig {
            database_path: db_path.display().to_string(),
        },
        collections,
    }
}

fn comments(base_url: &str, max_id: i64) -> CollectionConfig {
    CollectionConfig {
        name: "story_comments".to_string(),
        kind: CollectionKind::Paginated,
        url: format!("{}/ajax/comments?item_id={{id}}&page={{page}}", base_url),
        max_id: Some(max_id),
        discovery_url: None,
        id_pattern: None,
        fan_out_limit: None,
    }
}

fn posts(base_url: &str, max_id: Option<i64>) -> CollectionConfig {
    CollectionConfig {
        name: "posts".to_string(),
        kind: CollectionKind::Body,
        url: format!("{}/posts/{{id}}", base_url),
        max_id,
        discovery_url: None,
        id_pattern: None,
        fan_out_limit: Some(4),
    }
}

struct Harness {
    _dir: TempDir,
    config: Config,
    storage: Arc<Mutex<SqliteStorage>>,
    stats: Arc<Stats>,
}

impl Harness {
    fn new(collections: Vec<CollectionConfig>) -> Self {
        let dir = TempDir::new().unwrap();
        let config = create_test_config(&dir.path().join("harvest.db"), collections);
        let storage = Arc::new(Mutex::new(
            open_storage(Path::new(&config.output.database_path)).unwrap(),
        ));
        let stats = Arc::new(Stats::new(Duration::from_millis(500)).without_console());

        Self {
            _dir: dir,
            config,
            storage,
            stats,
        }
    }

    fn store(&self, name: &str) -> CollectionStore {
        let kind = self
            .config
            .collections
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.kind)
            .unwrap();
        CollectionStore::open(self.storage.clone(), name, kind).unwrap()
    }

    /// Runs every collection; returns the number that failed
    async fn run(&self) -> usize {
        let downloader = Arc::new(Downloader::from_config(&self.config).unwrap());
        crawl(
            &self.config,
            self.storage.clone(),
            downloader,
            self.stats.clone(),
        )
        .await
        .unwrap()
    }
}

fn stored(id: i64, page: u32, text: &str, num_pages: Option<u32>) -> StoredRecord {
    let mut record = StoredRecord::new(id, page)
        .with_content_str(Some(text))
        .unwrap();
    record.num_pages = num_pages;
    record
}

fn content(store: &CollectionStore, id: i64, page: u32) -> Option<String> {
    store.lookup(id, page).unwrap()?.content_str().unwrap()
}

async fn mock_page(server: &MockServer, id: i64, page: u32, body: &str, expect: u64) {
    Mock::given(method("GET"))
        .and(path("/ajax/comments"))
        .and(query_param("item_id", id.to_string()))
        .and(query_param("page", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(expect)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_crawl_paginated_collection() {
    let mock_server = MockServer::start().await;

    mock_page(&mock_server, 1, 1, r#"{"content":"x","num_pages":"2"}"#, 1).await;
    mock_page(&mock_server, 1, 2, r#"{"content":"y"}"#, 1).await;
    mock_page(&mock_server, 2, 1, r#"{"content":"z"}"#, 1).await;
    mock_page(&mock_server, 3, 1, r#"{"content":"z","num_comments":"4"}"#, 1).await;
    // Every other id is answered with wiremock's default 404

    let harness = Harness::new(vec![comments(&mock_server.uri(), 3)]);
    assert_eq!(harness.run().await, 0);

    let store = harness.store("story_comments");
    assert_eq!(content(&store, 1, 1).as_deref(), Some("x"));
    assert_eq!(content(&store, 1, 2).as_deref(), Some("y"));
    assert_eq!(content(&store, 2, 1).as_deref(), Some("z"));
    assert_eq!(store.lookup(1, 1).unwrap().unwrap().num_pages, Some(2));
    assert_eq!(store.lookup(3, 1).unwrap().unwrap().num_comments, Some(4));

    // Ids past the fixed bound are still requested up to min id + 100
    let summary = store.summary().unwrap();
    assert_eq!(summary.completed_rows, 4);
    assert_eq!(summary.distinct_ids, 101);
    assert_eq!(summary.error_rows, 98);
    assert_eq!(summary.max_completed_id, Some(3));

    let counters = harness.stats.totals();
    assert_eq!(counters.done_ids, 101);
    assert_eq!(counters.total_ids, 101);
    assert_eq!(counters.total_pages, 102);
    assert_eq!(counters.done_pages + counters.queue, counters.total_pages);
    assert_eq!(counters.queue, 0);
}

#[tokio::test]
async fn test_resume_skips_stored_ids() {
    let mock_server = MockServer::start().await;

    mock_page(&mock_server, 1, 1, r#"{"content":"refetched"}"#, 0).await;
    mock_page(&mock_server, 2, 1, r#"{"content":"refetched"}"#, 0).await;
    mock_page(&mock_server, 3, 1, r#"{"content":"fresh"}"#, 1).await;

    let harness = Harness::new(vec![comments(&mock_server.uri(), 3)]);
    let store = harness.store("story_comments");
    for id in 1..=3 {
        store.upsert(&stored(id, 1, "old", None)).unwrap();
    }

    assert_eq!(harness.run().await, 0);

    assert_eq!(content(&store, 1, 1).as_deref(), Some("old"));
    assert_eq!(content(&store, 2, 1).as_deref(), Some("old"));
    assert_eq!(content(&store, 3, 1).as_deref(), Some("fresh"));

    let counters = harness.stats.totals();
    // Two ids counted at start, then ids 3..=103 walked forward
    assert_eq!(counters.done_ids, 2 + 101);
    assert_eq!(counters.total_ids, 103);
}

#[tokio::test]
async fn test_page_gap_is_refilled() {
    let mock_server = MockServer::start().await;

    mock_page(&mock_server, 1, 1, r#"{"content":"refetched"}"#, 0).await;
    mock_page(&mock_server, 1, 2, r#"{"content":"filled"}"#, 1).await;
    mock_page(&mock_server, 1, 3, r#"{"content":"refetched"}"#, 0).await;
    mock_page(&mock_server, 2, 1, r#"{"content":"two"}"#, 1).await;

    let harness = Harness::new(vec![comments(&mock_server.uri(), 2)]);
    let store = harness.store("story_comments");
    store.upsert(&stored(1, 1, "first", Some(3))).unwrap();
    store.upsert(&stored(1, 3, "third", Some(3))).unwrap();
    store.upsert(&stored(2, 1, "two", None)).unwrap();
    assert_eq!(store.missing_pages().unwrap(), vec![1]);

    assert_eq!(harness.run().await, 0);

    assert_eq!(content(&store, 1, 1).as_deref(), Some("first"));
    assert_eq!(content(&store, 1, 2).as_deref(), Some("filled"));
    assert_eq!(content(&store, 1, 3).as_deref(), Some("third"));
    assert!(store.missing_pages().unwrap().is_empty());

    let counters = harness.stats.totals();
    assert_eq!(counters.done_pages + counters.queue, counters.total_pages);
    assert_eq!(counters.queue, 0);
}

#[tokio::test]
async fn test_missing_id_is_backfilled() {
    let mock_server = MockServer::start().await;

    mock_page(&mock_server, 2, 1, r#"{"content":"backfilled"}"#, 1).await;
    mock_page(&mock_server, 3, 1, r#"{"content":"three"}"#, 1).await;

    let harness = Harness::new(vec![comments(&mock_server.uri(), 3)]);
    let store = harness.store("story_comments");
    store.upsert(&stored(1, 1, "one", None)).unwrap();
    store.upsert(&stored(3, 1, "three", None)).unwrap();
    assert_eq!(store.missing_ids().unwrap(), vec![2]);

    assert_eq!(harness.run().await, 0);

    assert_eq!(content(&store, 2, 1).as_deref(), Some("backfilled"));
    assert!(store.missing_ids().unwrap().is_empty());
}

#[tokio::test]
async fn test_gap_above_resume_point_is_fetched_once() {
    let mock_server = MockServer::start().await;

    mock_page(&mock_server, 1, 1, r#"{"content":"one"}"#, 1).await;
    mock_page(&mock_server, 2, 1, r#"{"content":"two"}"#, 1).await;
    mock_page(&mock_server, 3, 1, r#"{"content":"three"}"#, 1).await;

    let harness = Harness::new(vec![comments(&mock_server.uri(), 3)]);
    let store = harness.store("story_comments");
    store.upsert(&stored(1, 1, "one", None)).unwrap();
    store
        .upsert(&StoredRecord::failure(3, 1, "HTTP 500"))
        .unwrap();
    // Id 2 is absent but sits above the last stored content
    assert_eq!(store.missing_ids().unwrap(), vec![2]);

    assert_eq!(harness.run().await, 0);

    assert_eq!(content(&store, 2, 1).as_deref(), Some("two"));
    assert_eq!(content(&store, 3, 1).as_deref(), Some("three"));

    let counters = harness.stats.totals();
    assert_eq!(counters.total_ids, 101);
    assert_eq!(counters.done_ids, 101);
    assert_eq!(counters.done_pages, counters.total_pages);
}

#[tokio::test]
async fn test_body_not_found_is_stored_as_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/posts/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<article>hello</article>"))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/posts/2"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let harness = Harness::new(vec![posts(&mock_server.uri(), Some(2))]);
    assert_eq!(harness.run().await, 0);

    let store = harness.store("posts");
    assert_eq!(
        content(&store, 1, 1).as_deref(),
        Some("<article>hello</article>")
    );

    let missing = store.lookup(2, 1).unwrap().unwrap();
    assert!(missing.is_error());
    assert!(missing.error.unwrap().contains("Not found"));
    assert_eq!(missing.content, None);

    assert_eq!(harness.stats.totals().done_ids, 101);
}

#[tokio::test]
async fn test_max_id_discovered_from_listing() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/stories"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<a href="/story/12">a</a> <a href="/story/150">b</a> <a href="/story/7">c</a>"#,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut collection = posts(&mock_server.uri(), None);
    collection.discovery_url = Some(format!("{}/stories", mock_server.uri()));
    collection.id_pattern = Some(r#"href="/story/(\d+)""#.to_string());

    let harness = Harness::new(vec![collection]);
    assert_eq!(harness.run().await, 0);

    assert_eq!(harness.stats.totals().total_ids, 150);
    assert_eq!(harness.store("posts").summary().unwrap().distinct_ids, 150);
}

#[tokio::test]
async fn test_discovery_failure_only_stops_its_collection() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/posts/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("body"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut broken = comments(&mock_server.uri(), 1);
    broken.max_id = None;
    broken.discovery_url = Some(format!("{}/missing-listing", mock_server.uri()));
    broken.id_pattern = Some(r#"item_id=(\d+)"#.to_string());

    let harness = Harness::new(vec![broken, posts(&mock_server.uri(), Some(1))]);
    assert_eq!(harness.run().await, 1);

    assert_eq!(harness.store("story_comments").summary().unwrap().rows, 0);
    assert_eq!(
        content(&harness.store("posts"), 1, 1).as_deref(),
        Some("body")
    );
}
