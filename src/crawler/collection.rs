//! Per-collection crawl orchestration
//!
//! A [`CollectionCrawler`] walks one collection's id space:
//!
//! 1. Frontier discovery: `min_id` is the highest id with stored content,
//!    `max_id` the discovered upper bound, raised to at least
//!    `min_id + MAX_ID_FLOOR`.
//! 2. Gap recovery: below `min_id`, items whose stored pages are not `1..=n`
//!    and ids absent from the store are re-fetched.
//! 3. Forward crawl from `min_id`. Each page-1 unit schedules the next id
//!    before resolving itself, and fans out to the remaining pages once page 1
//!    reveals the page count.
//!
//! Units are fed through an explicit work queue. A dispatcher admits each
//! scheduled unit through the collection's fan-out gate and spawns it; units
//! enqueue their successors before reporting completion, so the dispatcher
//! stops exactly when the last unit finishes.

use crate::config::{CollectionConfig, CollectionKind};
use crate::crawler::discovery::discover_max_id;
use crate::crawler::unit::{CommentPage, FetchUnit};
use crate::crawler::{AdmissionGate, Downloader, GatePermit};
use crate::output::{Counter, StatsHandle};
use crate::state::UnitState;
use crate::storage::{CollectionStore, StorageError, StoredRecord};
use crate::HarvestError;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};

/// Ids walked past the highest stored id even when discovery reports less
pub const MAX_ID_FLOOR: i64 = 100;

/// Bounds of one crawl, fixed at start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlFrontier {
    pub min_id: i64,
    pub max_id: i64,
}

/// How a unit was resolved
#[derive(Debug, Clone, Copy)]
struct Resolution {
    state: UnitState,
    num_pages: Option<u32>,
}

enum WorkEvent {
    Schedule(FetchUnit),
    Finished,
}

/// Sends `Finished` when a unit task ends, however it ends
struct FinishOnDrop(UnboundedSender<WorkEvent>);

impl Drop for FinishOnDrop {
    fn drop(&mut self) {
        let _ = self.0.send(WorkEvent::Finished);
    }
}

/// Crawls one collection
pub struct CollectionCrawler {
    config: Arc<CollectionConfig>,
    store: CollectionStore,
    downloader: Arc<Downloader>,
    stats: StatsHandle,
    fan_out: AdmissionGate,
}

impl CollectionCrawler {
    pub fn new(
        config: CollectionConfig,
        fan_out_limit: usize,
        store: CollectionStore,
        downloader: Arc<Downloader>,
        stats: StatsHandle,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            downloader,
            stats,
            fan_out: AdmissionGate::new(fan_out_limit),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Runs the crawl to completion
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The id space was exhausted
    /// * `Err(HarvestError)` - Discovery or a frontier query failed; nothing
    ///   further was attempted for this collection
    pub async fn start(&self) -> Result<(), HarvestError> {
        let frontier = self.discover_frontier().await?;
        self.crawl_frontier(frontier).await
    }

    /// Computes the frontier and seeds the id counters
    pub async fn discover_frontier(&self) -> Result<CrawlFrontier, HarvestError> {
        let min_id = self.store.max_completed_id()?.unwrap_or(1);
        let discovered = discover_max_id(&self.config, &self.downloader).await?;
        let max_id = discovered.max(min_id + MAX_ID_FLOOR);

        let already_done = self.store.count_ids_below(min_id)?;
        self.stats.set(Counter::TotalIds, max_id);
        self.stats.set(Counter::DoneIds, already_done as i64);

        tracing::debug!(
            "[{}] Discovered max id {}, {} ids already stored",
            self.name(),
            discovered,
            already_done
        );

        Ok(CrawlFrontier { min_id, max_id })
    }

    /// Recovers gaps below `min_id`, then walks `min_id..=max_id`
    pub async fn crawl_frontier(&self, frontier: CrawlFrontier) -> Result<(), HarvestError> {
        tracing::info!(
            "[{}] Crawling ids {}..={}",
            self.name(),
            frontier.min_id,
            frontier.max_id
        );

        let worker = Arc::new(UnitWorker {
            config: Arc::clone(&self.config),
            store: self.store.clone(),
            downloader: Arc::clone(&self.downloader),
            stats: self.stats.clone(),
            frontier,
        });

        let store = self.store.clone();
        let recovery =
            tokio::task::spawn_blocking(move || recovery_units(&store, frontier.min_id)).await??;
        if !recovery.is_empty() {
            tracing::info!("[{}] Recovering {} items", self.name(), recovery.len());
            self.drain(&worker, recovery).await?;
        }

        self.drain(&worker, vec![FetchUnit::forward(frontier.min_id)])
            .await?;

        tracing::info!("[{}] Crawl complete", self.name());
        Ok(())
    }

    /// Runs `seeds` and everything they schedule until no unit remains
    async fn drain(
        &self,
        worker: &Arc<UnitWorker>,
        seeds: Vec<FetchUnit>,
    ) -> Result<(), HarvestError> {
        if seeds.is_empty() {
            return Ok(());
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        for unit in seeds {
            worker.schedule(&tx, unit);
        }

        let mut pending: usize = 0;
        while let Some(event) = rx.recv().await {
            match event {
                WorkEvent::Schedule(unit) => {
                    pending += 1;
                    let permit = self.fan_out.acquire().await?;
                    spawn_unit(Arc::clone(worker), tx.clone(), unit, permit);
                }
                WorkEvent::Finished => {
                    pending -= 1;
                    if pending == 0 {
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

/// Units re-fetching page gaps and missing ids below `min_id`
///
/// Ids from `min_id` up are left to the forward crawl, which fetches every
/// one of them anyway.
fn recovery_units(store: &CollectionStore, min_id: i64) -> Result<Vec<FetchUnit>, StorageError> {
    let mut units = Vec::new();

    if store.kind() == CollectionKind::Paginated {
        let gapped: Vec<i64> = store
            .missing_pages()?
            .into_iter()
            .filter(|&id| id < min_id)
            .collect();
        if !gapped.is_empty() {
            tracing::debug!("[{}] {} items with page gaps", store.name(), gapped.len());
        }
        units.extend(gapped.into_iter().map(FetchUnit::recover_pages));
    }

    let missing: Vec<i64> = store
        .missing_ids()?
        .into_iter()
        .filter(|&id| id < min_id)
        .collect();
    if !missing.is_empty() {
        tracing::debug!("[{}] {} missing ids", store.name(), missing.len());
    }
    units.extend(missing.into_iter().map(FetchUnit::recover_id));

    Ok(units)
}

fn spawn_unit(
    worker: Arc<UnitWorker>,
    tx: UnboundedSender<WorkEvent>,
    unit: FetchUnit,
    permit: GatePermit,
) {
    tokio::spawn(async move {
        let _permit = permit;
        let _finished = FinishOnDrop(tx.clone());
        worker.run(unit, &tx).await;
    });
}

/// State shared by every unit task of one crawl
struct UnitWorker {
    config: Arc<CollectionConfig>,
    store: CollectionStore,
    downloader: Arc<Downloader>,
    stats: StatsHandle,
    frontier: CrawlFrontier,
}

impl UnitWorker {
    fn schedule(&self, tx: &UnboundedSender<WorkEvent>, unit: FetchUnit) {
        self.stats.set(Counter::TotalPages, 1);
        self.stats.set(Counter::Queue, 1);

        if tx.send(WorkEvent::Schedule(unit)).is_err() {
            self.stats.set(Counter::Queue, -1);
            self.stats.set(Counter::TotalPages, -1);
        }
    }

    async fn run(&self, unit: FetchUnit, tx: &UnboundedSender<WorkEvent>) {
        if !unit.is_recovery() && unit.page == 1 && unit.id < self.frontier.max_id {
            self.schedule(tx, FetchUnit::forward(unit.id + 1));
        }

        match self.resolve(&unit).await {
            Ok(resolution) => {
                if resolution.state.is_error() {
                    tracing::debug!(
                        "[{}] {}/{} {}",
                        self.config.name,
                        unit.id,
                        unit.page,
                        resolution.state
                    );
                } else {
                    tracing::trace!(
                        "[{}] {}/{} {}",
                        self.config.name,
                        unit.id,
                        unit.page,
                        resolution.state
                    );
                }
                for next in unit.follow_ups(resolution.num_pages) {
                    self.schedule(tx, next);
                }

                self.stats.set(Counter::DonePages, 1);
                self.stats.set(Counter::Queue, -1);
                if unit.completes_item(resolution.num_pages) && unit.counts_toward_ids() {
                    self.stats.set(Counter::DoneIds, 1);
                }
            }
            Err(e) => {
                tracing::error!(
                    "[{}] Abandoning {}/{}: {}",
                    self.config.name,
                    unit.id,
                    unit.page,
                    e
                );
                self.stats.set(Counter::Queue, -1);
                self.stats.set(Counter::TotalPages, -1);
            }
        }

        self.stats.refresh(&self.downloader.snapshot());
    }

    /// Resolves one unit from the store or the network
    async fn resolve(&self, unit: &FetchUnit) -> Result<Resolution, HarvestError> {
        let mut state = UnitState::Unseen;

        if unit.id < self.frontier.min_id {
            if let Some(record) = self.store.lookup(unit.id, unit.page)? {
                return Ok(Resolution {
                    state: state.transition(UnitState::StoreHit)?,
                    num_pages: record.num_pages,
                });
            }
        }

        state = state.transition(UnitState::InFlight)?;
        let record = self.fetch(unit).await?;
        self.store.upsert(&record)?;

        let stored = if record.is_error() {
            UnitState::StoredError
        } else {
            UnitState::StoredSuccess
        };
        Ok(Resolution {
            state: state.transition(stored)?,
            num_pages: record.num_pages,
        })
    }

    /// Downloads a unit; transport failures become error records
    async fn fetch(&self, unit: &FetchUnit) -> Result<StoredRecord, HarvestError> {
        let url = self.config.url_for(unit.id, unit.page);

        let fetched = match self.config.kind {
            CollectionKind::Paginated => self
                .downloader
                .download_json::<CommentPage>(&url)
                .await
                .map(|page| page.into_record(unit.id, unit.page)),
            CollectionKind::Body => self
                .downloader
                .download_body(&url)
                .await
                .map(|body| StoredRecord::new(unit.id, 1).with_content_str(Some(&body))),
        };

        match fetched {
            Ok(record) => Ok(record?),
            Err(e) => {
                tracing::warn!("[{}] {}", self.config.name, e);
                Ok(StoredRecord::failure(unit.id, unit.page, e.to_string()))
            }
        }
    }
}
