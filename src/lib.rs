//! Comment-Harvester: a resumable comment archiver
//!
//! This crate implements a mass downloader that walks the id space of a
//! site's paginated comment endpoints (and unpaginated body endpoints),
//! persisting every page into per-collection SQLite tables. Interrupted runs
//! resume from the last confirmed id and backfill any gaps they left behind.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Comment-Harvester operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Max id discovery failed for {collection}: {message}")]
    Discovery { collection: String, message: String },

    #[error("Invalid unit state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::UnitState,
        to: state::UnitState,
    },

    #[error("Work queue error: {0}")]
    Gate(#[from] crawler::GateClosed),

    #[error("Crawl task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid id pattern: {0}")]
    InvalidPattern(String),
}

/// Errors produced while talking to the upstream site
///
/// Every variant is terminal for the request that produced it: transient
/// failures are retried inside the downloader and only surface here once the
/// retry budget is spent.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Not found: {url}")]
    NotFound { url: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Gave up on {url} after {attempts} attempts: {last}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last: String,
    },

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Malformed response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("Network gate closed")]
    Gate(#[from] crawler::GateClosed),
}

/// Result type alias for Comment-Harvester operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for fetch operations
pub type FetchResult<T> = std::result::Result<T, FetchError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{AdmissionGate, CollectionCrawler, Downloader, FetchUnit};
pub use output::Stats;
pub use state::UnitState;
pub use storage::{CollectionKind, CollectionStore, SqliteStorage, StoredRecord};
