//! Comment-Harvester main entry point
//!
//! This is the command-line interface for the Comment-Harvester archiver.

use anyhow::Context;
use clap::Parser;
use comment_harvester::config::{load_config_with_hash, Config};
use comment_harvester::crawler::{crawl, Downloader};
use comment_harvester::output::{load_statistics, print_statistics, Stats};
use comment_harvester::storage::open_storage;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Comment-Harvester: a resumable comment archiver
///
/// Comment-Harvester walks the id space of every configured collection,
/// storing each comment page in SQLite. Interrupted runs pick up where they
/// left off and backfill any gaps.
#[derive(Parser, Debug)]
#[command(name = "comment-harvester")]
#[command(version = "1.0.0")]
#[command(about = "A resumable comment archiver", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,

    /// Restrict the run to the named collection (repeatable)
    #[arg(long, value_name = "NAME")]
    only: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    select_collections(&mut config, &cli.only)?;

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// Logs go to stderr; stdout carries the progress report.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("comment_harvester=info,warn"),
            1 => EnvFilter::new("comment_harvester=debug,info"),
            2 => EnvFilter::new("comment_harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Applies `--only`, rejecting names that are not configured
fn select_collections(config: &mut Config, only: &[String]) -> anyhow::Result<()> {
    if only.is_empty() {
        return Ok(());
    }

    for name in only {
        if !config.collections.iter().any(|c| &c.name == name) {
            anyhow::bail!("Unknown collection: {}", name);
        }
    }

    config.collections.retain(|c| only.contains(&c.name));
    Ok(())
}

/// Handles the --dry-run mode: shows what would be crawled
fn handle_dry_run(config: &Config) {
    println!("=== Comment-Harvester Dry Run ===\n");

    println!("Crawler Configuration:");
    println!(
        "  Network concurrency: {}",
        config.crawler.network_concurrency
    );
    println!("  Fan-out limit: {}", config.crawler.fan_out_limit);
    println!("  Max retries: {}", config.crawler.max_retries);
    println!(
        "  Request timeout: {}s",
        config.crawler.request_timeout_secs
    );
    println!("  Report interval: {}ms", config.crawler.report_interval_ms);

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\nCollections ({}):", config.collections.len());
    for collection in &config.collections {
        println!("  - {} ({:?})", collection.name, collection.kind);
        println!("    URL: {}", collection.url);
        match (&collection.max_id, &collection.discovery_url) {
            (Some(max_id), _) => println!("    Max id: {}", max_id),
            (None, Some(url)) => println!("    Max id discovered from: {}", url),
            (None, None) => {}
        }
        println!(
            "    Fan-out limit: {}",
            collection.fan_out_limit(&config.crawler)
        );
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let mut storage = open_storage(Path::new(&config.output.database_path))?;
    let statistics = load_statistics(&mut storage, &config.collections)?;
    print_statistics(&statistics);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        "Harvesting {} collections into {}",
        config.collections.len(),
        config.output.database_path
    );

    let storage = Arc::new(Mutex::new(open_storage(Path::new(
        &config.output.database_path,
    ))?));
    let downloader = Arc::new(Downloader::from_config(&config)?);
    let stats = Arc::new(Stats::new(Duration::from_millis(
        config.crawler.report_interval_ms,
    )));

    let failed = crawl(&config, storage, downloader, stats).await?;
    if failed > 0 {
        anyhow::bail!("{} of {} collections failed", failed, config.collections.len());
    }

    tracing::info!("Harvest completed successfully");
    Ok(())
}
