//! Crawler module for harvesting collections
//!
//! This module contains the core crawling logic, including:
//! - Admission gates bounding fan-out and network concurrency
//! - HTTP downloading with retry and backoff
//! - Upper-bound discovery for each collection's id space
//! - The per-collection crawl state machine and gap recovery

mod collection;
mod discovery;
mod downloader;
mod gate;
mod unit;

pub use collection::{CollectionCrawler, CrawlFrontier, MAX_ID_FLOOR};
pub use discovery::{discover_max_id, scan_max_id};
pub use downloader::{build_http_client, is_retryable_status, retry_delay, Downloader};
pub use gate::{AdmissionGate, GateClosed, GatePermit};
pub use unit::{CommentPage, FetchUnit, UnitMode};

use crate::config::Config;
use crate::output::Stats;
use crate::storage::{CollectionStore, SqliteStorage};
use crate::HarvestError;
use std::sync::{Arc, Mutex};

/// Crawls every collection in `config` concurrently
///
/// Each collection runs its own [`CollectionCrawler`] against the shared
/// downloader and storage. A collection that fails (for example when its max
/// id cannot be discovered) is logged and does not affect the others.
///
/// # Arguments
///
/// * `config` - The harvester configuration
/// * `storage` - Shared database handle
/// * `downloader` - Process-wide downloader
/// * `stats` - Shared progress aggregator
///
/// # Returns
///
/// * `Ok(usize)` - Number of collections whose crawl failed
/// * `Err(HarvestError)` - A collection table could not be opened
pub async fn crawl(
    config: &Config,
    storage: Arc<Mutex<SqliteStorage>>,
    downloader: Arc<Downloader>,
    stats: Arc<Stats>,
) -> Result<usize, HarvestError> {
    let mut crawls = Vec::with_capacity(config.collections.len());

    for collection in &config.collections {
        let store = CollectionStore::open(storage.clone(), &collection.name, collection.kind)?;
        let crawler = CollectionCrawler::new(
            collection.clone(),
            collection.fan_out_limit(&config.crawler),
            store,
            downloader.clone(),
            stats.register(&collection.name),
        );
        crawls.push(crawler);
    }

    let handles: Vec<_> = crawls
        .into_iter()
        .map(|crawler| {
            tokio::spawn(async move {
                let result = crawler.start().await;
                if let Err(e) = &result {
                    tracing::error!("[{}] Crawl failed: {}", crawler.name(), e);
                }
                result.is_ok()
            })
        })
        .collect();

    let mut failed = 0;
    for handle in handles {
        match handle.await {
            Ok(true) => {}
            Ok(false) => failed += 1,
            Err(e) => {
                tracing::error!("Crawl task panicked: {}", e);
                failed += 1;
            }
        }
    }

    stats.finish(&downloader.snapshot());
    Ok(failed)
}
