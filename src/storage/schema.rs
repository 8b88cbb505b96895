//! Database schema definitions
//!
//! Tables are created per collection, so the schema is generated from the
//! collection's name and kind rather than kept as one static script.

use crate::storage::{CollectionKind, CollectionTable};

/// Connection pragmas applied to file-backed databases
pub const PRAGMAS_SQL: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA temp_store = MEMORY;
    PRAGMA mmap_size = 268435456;
";

/// Returns the `CREATE TABLE` script for a collection
pub fn collection_schema(table: &CollectionTable) -> String {
    let name = table.name();
    match table.kind() {
        CollectionKind::Paginated => format!(
            r#"
CREATE TABLE IF NOT EXISTS "{name}" (
    id INTEGER NOT NULL,
    page INTEGER NOT NULL,
    content BLOB,
    num_comments INTEGER,
    start_index INTEGER,
    end_index INTEGER,
    num_pages INTEGER,
    error TEXT,
    PRIMARY KEY (id, page)
);
"#
        ),
        CollectionKind::Body => format!(
            r#"
CREATE TABLE IF NOT EXISTS "{name}" (
    id INTEGER PRIMARY KEY,
    body BLOB,
    error TEXT
);
"#
        ),
    }
}

/// Initializes the schema for one collection
pub fn initialize_schema(
    conn: &rusqlite::Connection,
    table: &CollectionTable,
) -> Result<(), rusqlite::Error> {
    conn.execute_batch(&collection_schema(table))?;
    Ok(())
}
