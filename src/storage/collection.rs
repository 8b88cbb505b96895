//! Shared per-collection view of the storage backend
//!
//! Crawl tasks run concurrently on the tokio runtime while the SQLite
//! connection is single-writer, so every operation takes the storage mutex for
//! exactly one statement and never holds it across an await point.

use crate::storage::{
    CollectionKind, CollectionSummary, CollectionTable, SqliteStorage, Storage, StorageError,
    StorageResult, StoredRecord,
};
use std::sync::{Arc, Mutex, MutexGuard};

/// Cheaply cloneable handle onto one collection's table
#[derive(Clone)]
pub struct CollectionStore {
    storage: Arc<Mutex<SqliteStorage>>,
    table: CollectionTable,
}

impl CollectionStore {
    /// Opens the collection, creating its table if needed
    pub fn open(
        storage: Arc<Mutex<SqliteStorage>>,
        name: &str,
        kind: CollectionKind,
    ) -> StorageResult<Self> {
        let store = Self {
            storage,
            table: CollectionTable::new(name, kind),
        };
        store.lock()?.ensure_collection(&store.table)?;
        Ok(store)
    }

    pub fn name(&self) -> &str {
        self.table.name()
    }

    pub fn kind(&self) -> CollectionKind {
        self.table.kind()
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, SqliteStorage>> {
        self.storage
            .lock()
            .map_err(|_| StorageError::Database("storage mutex poisoned".to_string()))
    }

    pub fn lookup(&self, id: i64, page: u32) -> StorageResult<Option<StoredRecord>> {
        self.lock()?.find_record(&self.table, id, page)
    }

    pub fn upsert(&self, record: &StoredRecord) -> StorageResult<()> {
        self.lock()?.upsert_record(&self.table, record)
    }

    pub fn max_completed_id(&self) -> StorageResult<Option<i64>> {
        self.lock()?.max_completed_id(&self.table)
    }

    pub fn count_ids_below(&self, id: i64) -> StorageResult<u64> {
        self.lock()?.count_ids_below(&self.table, id)
    }

    pub fn missing_pages(&self) -> StorageResult<Vec<i64>> {
        self.lock()?.missing_pages(&self.table)
    }

    pub fn missing_ids(&self) -> StorageResult<Vec<i64>> {
        self.lock()?.missing_ids(&self.table)
    }

    pub fn summary(&self) -> StorageResult<CollectionSummary> {
        self.lock()?.collection_summary(&self.table)
    }
}
