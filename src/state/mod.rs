//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `UnitState`: lifecycle of a single fetch unit (unseen, store hit, in flight, stored)

mod unit_state;

// Re-export main types
pub use unit_state::UnitState;
