//! Statistics generation from the harvest database
//!
//! This module provides functionality for extracting and displaying
//! per-collection statistics from the storage layer.

use crate::config::{CollectionConfig, CollectionKind};
use crate::storage::{CollectionSummary, CollectionTable, Storage};
use crate::HarvestError;

/// Stored totals for one collection
#[derive(Debug, Clone)]
pub struct CollectionStatistics {
    pub name: String,
    pub kind: CollectionKind,
    pub summary: CollectionSummary,
}

/// Loads statistics for every configured collection
///
/// Collections that were never crawled get an empty table and report zeros.
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `collections` - Collections to report on, in display order
///
/// # Returns
///
/// * `Ok(Vec<CollectionStatistics>)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to query statistics
pub fn load_statistics(
    storage: &mut dyn Storage,
    collections: &[CollectionConfig],
) -> Result<Vec<CollectionStatistics>, HarvestError> {
    let mut statistics = Vec::with_capacity(collections.len());

    for collection in collections {
        let table = CollectionTable::new(&collection.name, collection.kind);
        storage.ensure_collection(&table)?;
        let summary = storage.collection_summary(&table)?;

        statistics.push(CollectionStatistics {
            name: collection.name.clone(),
            kind: collection.kind,
            summary,
        });
    }

    Ok(statistics)
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(statistics: &[CollectionStatistics]) {
    println!("=== Harvest Statistics ===\n");

    for entry in statistics {
        let summary = &entry.summary;
        println!("{} ({:?}):", entry.name, entry.kind);
        println!("  Rows: {}", summary.rows);
        println!("  Distinct ids: {}", summary.distinct_ids);
        println!(
            "  Completed rows: {} ({:.1}%)",
            summary.completed_rows,
            percentage(summary.completed_rows, summary.rows)
        );
        println!(
            "  Error rows: {} ({:.1}%)",
            summary.error_rows,
            percentage(summary.error_rows, summary.rows)
        );
        match summary.max_completed_id {
            Some(id) => println!("  Highest completed id: {}", id),
            None => println!("  Highest completed id: none"),
        }
        println!();
    }

    let rows: u64 = statistics.iter().map(|s| s.summary.rows).sum();
    let errors: u64 = statistics.iter().map(|s| s.summary.error_rows).sum();
    println!(
        "Total: {} rows across {} collections, {} errors",
        rows,
        statistics.len(),
        errors
    );
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole > 0 {
        (part as f64 / whole as f64) * 100.0
    } else {
        0.0
    }
}
