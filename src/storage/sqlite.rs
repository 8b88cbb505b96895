//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::storage::schema::{initialize_schema, PRAGMAS_SQL};
use crate::storage::traits::{Storage, StorageResult};
use crate::storage::{CollectionKind, CollectionSummary, CollectionTable, StoredRecord};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(PRAGMAS_SQL)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }
}

fn paginated_from_row(row: &Row<'_>) -> rusqlite::Result<StoredRecord> {
    Ok(StoredRecord {
        id: row.get(0)?,
        page: row.get(1)?,
        content: row.get(2)?,
        num_comments: row.get(3)?,
        start_index: row.get(4)?,
        end_index: row.get(5)?,
        num_pages: row.get(6)?,
        error: row.get(7)?,
    })
}

fn body_from_row(row: &Row<'_>) -> rusqlite::Result<StoredRecord> {
    Ok(StoredRecord {
        content: row.get(1)?,
        error: row.get(2)?,
        ..StoredRecord::new(row.get(0)?, 1)
    })
}

impl Storage for SqliteStorage {
    // ===== Schema =====

    fn ensure_collection(&mut self, table: &CollectionTable) -> StorageResult<()> {
        initialize_schema(&self.conn, table)?;
        Ok(())
    }

    // ===== Records =====

    fn find_record(
        &self,
        table: &CollectionTable,
        id: i64,
        page: u32,
    ) -> StorageResult<Option<StoredRecord>> {
        let name = table.name();
        let record = match table.kind() {
            CollectionKind::Paginated => self
                .conn
                .query_row(
                    &format!(
                        r#"SELECT id, page, content, num_comments, start_index, end_index,
                           num_pages, error FROM "{name}" WHERE id = ?1 AND page = ?2"#
                    ),
                    params![id, page],
                    paginated_from_row,
                )
                .optional()?,
            CollectionKind::Body => self
                .conn
                .query_row(
                    &format!(r#"SELECT id, body, error FROM "{name}" WHERE id = ?1"#),
                    params![id],
                    body_from_row,
                )
                .optional()?,
        };

        Ok(record)
    }

    fn upsert_record(
        &mut self,
        table: &CollectionTable,
        record: &StoredRecord,
    ) -> StorageResult<()> {
        let name = table.name();
        match table.kind() {
            CollectionKind::Paginated => {
                self.conn.execute(
                    &format!(
                        r#"INSERT INTO "{name}"
                           (id, page, content, num_comments, start_index, end_index, num_pages, error)
                           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                           ON CONFLICT(id, page) DO UPDATE SET
                               content = excluded.content,
                               num_comments = excluded.num_comments,
                               start_index = excluded.start_index,
                               end_index = excluded.end_index,
                               num_pages = excluded.num_pages,
                               error = excluded.error"#
                    ),
                    params![
                        record.id,
                        record.page,
                        record.content,
                        record.num_comments,
                        record.start_index,
                        record.end_index,
                        record.num_pages,
                        record.error
                    ],
                )?;
            }
            CollectionKind::Body => {
                self.conn.execute(
                    &format!(
                        r#"INSERT INTO "{name}" (id, body, error) VALUES (?1, ?2, ?3)
                           ON CONFLICT(id) DO UPDATE SET
                               body = excluded.body,
                               error = excluded.error"#
                    ),
                    params![record.id, record.content, record.error],
                )?;
            }
        }
        Ok(())
    }

    // ===== Frontier =====

    fn max_completed_id(&self, table: &CollectionTable) -> StorageResult<Option<i64>> {
        let name = table.name();
        let column = match table.kind() {
            CollectionKind::Paginated => "content",
            CollectionKind::Body => "body",
        };

        let max_id: Option<i64> = self.conn.query_row(
            &format!(r#"SELECT MAX(id) FROM "{name}" WHERE {column} IS NOT NULL"#),
            [],
            |row| row.get(0),
        )?;

        Ok(max_id)
    }

    fn count_ids_below(&self, table: &CollectionTable, id: i64) -> StorageResult<u64> {
        let name = table.name();
        let count: i64 = self.conn.query_row(
            &format!(r#"SELECT COUNT(DISTINCT id) FROM "{name}" WHERE id < ?1"#),
            params![id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Gap Recovery =====

    fn missing_pages(&self, table: &CollectionTable) -> StorageResult<Vec<i64>> {
        if table.kind() == CollectionKind::Body {
            return Ok(Vec::new());
        }

        // Each page must equal the previous stored page + 1, with page 0
        // standing in before the first row so a missing page 1 is caught too.
        let name = table.name();
        let query = format!(
            r#"
            WITH ordered_pages AS (
                SELECT id, page,
                       LAG(page, 1, 0) OVER (PARTITION BY id ORDER BY page) + 1 AS expected_page
                FROM "{name}"
            )
            SELECT DISTINCT id
            FROM ordered_pages
            WHERE page != expected_page
            ORDER BY id
            "#
        );

        let mut stmt = self.conn.prepare(&query)?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;

        Ok(ids)
    }

    fn missing_ids(&self, table: &CollectionTable) -> StorageResult<Vec<i64>> {
        let name = table.name();
        let query = format!(
            r#"
            WITH RECURSIVE
            sequence (id) AS (
                SELECT 1
                UNION ALL
                SELECT id + 1
                FROM sequence
                WHERE id < (SELECT MAX(id) FROM "{name}")
            )
            SELECT sequence.id
            FROM sequence
            LEFT JOIN (SELECT DISTINCT id FROM "{name}") AS stored
                ON sequence.id = stored.id
            WHERE stored.id IS NULL
              AND (SELECT MAX(id) FROM "{name}") IS NOT NULL
            ORDER BY sequence.id
            "#
        );

        let mut stmt = self.conn.prepare(&query)?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;

        Ok(ids)
    }

    // ===== Statistics =====

    fn collection_summary(&self, table: &CollectionTable) -> StorageResult<CollectionSummary> {
        let name = table.name();
        let column = match table.kind() {
            CollectionKind::Paginated => "content",
            CollectionKind::Body => "body",
        };

        let (rows, distinct_ids, completed_rows, error_rows): (i64, i64, i64, i64) =
            self.conn.query_row(
                &format!(
                    r#"SELECT COUNT(*),
                              COUNT(DISTINCT id),
                              COUNT({column}),
                              COUNT(error)
                       FROM "{name}""#
                ),
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

        Ok(CollectionSummary {
            rows: rows as u64,
            distinct_ids: distinct_ids as u64,
            completed_rows: completed_rows as u64,
            error_rows: error_rows as u64,
            max_completed_id: self.max_completed_id(table)?,
        })
    }
}
