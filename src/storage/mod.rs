//! Storage module for persisting harvested records
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and per-collection schema management
//! - Keyed record lookup and upsert
//! - Frontier queries (highest completed id, ids below a bound)
//! - Gap recovery queries (missing pages, missing ids)

mod codec;
mod collection;
mod schema;
mod sqlite;
mod traits;

pub use codec::{compress, decompress};
pub use collection::CollectionStore;
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

pub use crate::config::CollectionKind;

use crate::HarvestError;
use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(HarvestError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, HarvestError> {
    Ok(SqliteStorage::new(path)?)
}

/// Name and shape of one collection's table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionTable {
    name: String,
    kind: CollectionKind,
}

impl CollectionTable {
    pub fn new(name: impl Into<String>, kind: CollectionKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }
}

/// One stored fetch result
///
/// `content` holds compressed bytes; use [`StoredRecord::content_str`] to read
/// the text. A record carries either content or an error, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub id: i64,
    /// Always 1 for body collections
    pub page: u32,
    pub content: Option<Vec<u8>>,
    pub num_comments: Option<i64>,
    pub start_index: Option<i64>,
    pub end_index: Option<i64>,
    /// Authoritative on page 1; `None` means unknown / single page
    pub num_pages: Option<u32>,
    pub error: Option<String>,
}

impl StoredRecord {
    /// Empty successful record for `(id, page)`
    pub fn new(id: i64, page: u32) -> Self {
        Self {
            id,
            page,
            content: None,
            num_comments: None,
            start_index: None,
            end_index: None,
            num_pages: None,
            error: None,
        }
    }

    /// Record holding a fetch failure instead of content
    pub fn failure(id: i64, page: u32, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(id, page)
        }
    }

    /// Compresses and attaches content text
    pub fn with_content_str(mut self, text: Option<&str>) -> StorageResult<Self> {
        self.content = compress(text)?;
        Ok(self)
    }

    /// Decompressed content, if any
    pub fn content_str(&self) -> StorageResult<Option<String>> {
        self.content.as_deref().map(decompress).transpose()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Row counts for one collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionSummary {
    pub rows: u64,
    pub distinct_ids: u64,
    pub completed_rows: u64,
    pub error_rows: u64,
    pub max_completed_id: Option<i64>,
}
