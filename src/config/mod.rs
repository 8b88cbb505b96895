//! Configuration module for Comment-Harvester
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use comment_harvester::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Network concurrency: {}", config.crawler.network_concurrency);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CollectionConfig, CollectionKind, Config, CrawlerConfig, OutputConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
