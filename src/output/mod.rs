//! Output module for progress reporting and harvest statistics
//!
//! This module handles:
//! - Live per-collection progress counters and the in-place console report
//! - Windowed throughput rates
//! - Statistics over stored data for `--stats`

pub mod rate;
pub mod stats;
mod summary;

pub use rate::WindowedRate;
pub use stats::{Counter, NetworkSnapshot, ProgressCounters, Stats, StatsHandle};
pub use summary::{load_statistics, print_statistics, CollectionStatistics};
