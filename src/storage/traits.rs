//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::storage::{CollectionSummary, CollectionTable, StoredRecord};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Compression error: {0}")]
    Codec(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Every collection lives in its own table; `table` carries both the table
/// name and whether rows are keyed by `(id, page)` or by `id` alone.
pub trait Storage {
    // ===== Schema =====

    /// Creates the collection's table if it does not exist yet
    fn ensure_collection(&mut self, table: &CollectionTable) -> StorageResult<()>;

    // ===== Records =====

    /// Point lookup by key; `page` is ignored for body tables
    fn find_record(
        &self,
        table: &CollectionTable,
        id: i64,
        page: u32,
    ) -> StorageResult<Option<StoredRecord>>;

    /// Inserts or fully replaces the row for the record's key
    fn upsert_record(&mut self, table: &CollectionTable, record: &StoredRecord)
        -> StorageResult<()>;

    // ===== Frontier =====

    /// Highest id that has non-null content
    fn max_completed_id(&self, table: &CollectionTable) -> StorageResult<Option<i64>>;

    /// Number of distinct ids strictly below `id`
    fn count_ids_below(&self, table: &CollectionTable, id: i64) -> StorageResult<u64>;

    // ===== Gap Recovery =====

    /// Ids whose stored page numbers are not contiguous from 1
    ///
    /// Always empty for body tables.
    fn missing_pages(&self, table: &CollectionTable) -> StorageResult<Vec<i64>>;

    /// Integers in `1..=MAX(id)` with no row at all
    fn missing_ids(&self, table: &CollectionTable) -> StorageResult<Vec<i64>>;

    // ===== Statistics =====

    /// Row counts used by the `--stats` report
    fn collection_summary(&self, table: &CollectionTable) -> StorageResult<CollectionSummary>;
}
