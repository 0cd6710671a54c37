//! Paperhound main entry point
//!
//! This is the command-line interface for the Paperhound paper crawler.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use paperhound::config::{load_config_with_hash, validate_software_name, Config};
use paperhound::crawler::Coordinator;
use paperhound::report::{load_statistics, print_report, print_statistics};
use paperhound::storage::{open_storage, SqliteStorage};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

/// Paperhound: finds the papers that use a piece of software
///
/// Paperhound searches the archive for each software name, resolves every
/// hit to its last valid revision, and records which software names each
/// paper is associated with.
#[derive(Parser, Debug)]
#[command(name = "paperhound")]
#[command(version)]
#[command(about = "Discovers archive papers that mention a piece of software", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl the archive for each software name (defaults to the config list)
    Crawl {
        #[arg(value_name = "NAME")]
        names: Vec<String>,
    },

    /// Ingest a single paper without running a search
    Paper {
        /// Archive identifier, e.g. 2101.00001 or arXiv:2101.00001v2
        #[arg(value_name = "ID")]
        identifier: String,

        /// Software name to associate with the paper
        #[arg(short, long)]
        software: String,
    },

    /// Show statistics from the database and exit
    Stats {
        /// Number of recent runs to list
        #[arg(long, default_value_t = 10)]
        runs: u32,
    },

    /// Validate config and show what would be crawled without crawling
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::debug!("Configuration hash: {}", config_hash);

    match cli.command {
        Command::Crawl { names } => handle_crawl(config, config_hash, names).await,
        Command::Paper {
            identifier,
            software,
        } => handle_paper(config, config_hash, &identifier, &software).await,
        Command::Stats { runs } => handle_stats(&config, runs),
        Command::Check => handle_check(&config),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("paperhound=info,warn"),
            1 => EnvFilter::new("paperhound=debug,info"),
            2 => EnvFilter::new("paperhound=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn open_shared_storage(config: &Config) -> anyhow::Result<Arc<Mutex<SqliteStorage>>> {
    let storage = open_storage(Path::new(&config.output.database_path))
        .with_context(|| format!("failed to open {}", config.output.database_path))?;
    Ok(Arc::new(Mutex::new(storage)))
}

/// Picks the names given on the command line, or the configured list
fn crawl_targets(config: &Config, names: Vec<String>) -> anyhow::Result<Vec<String>> {
    let targets = if names.is_empty() {
        config.software.clone()
    } else {
        names.into_iter().map(|name| name.trim().to_string()).collect()
    };

    if targets.is_empty() {
        bail!("no software names given and none configured under `software`");
    }
    for name in &targets {
        validate_software_name(name).with_context(|| format!("bad software name '{}'", name))?;
    }
    Ok(targets)
}

/// Handles the crawl command: runs one crawl per software name
async fn handle_crawl(
    config: Config,
    config_hash: String,
    names: Vec<String>,
) -> anyhow::Result<()> {
    let targets = crawl_targets(&config, names)?;
    tracing::info!("Crawling {} software names", targets.len());

    let storage = open_shared_storage(&config)?;
    let coordinator = Coordinator::new(config, config_hash, storage)?;
    let reports = coordinator.run_all(&targets).await;

    for report in &reports {
        print_report(report);
    }

    if reports.len() < targets.len() {
        tracing::error!(
            "{} of {} crawls could not run",
            targets.len() - reports.len(),
            targets.len()
        );
        bail!("some crawls failed");
    }

    Ok(())
}

/// Handles the paper command: ingests one identifier directly
async fn handle_paper(
    config: Config,
    config_hash: String,
    identifier: &str,
    software: &str,
) -> anyhow::Result<()> {
    let software = software.trim();
    validate_software_name(software)?;

    let storage = open_shared_storage(&config)?;
    let coordinator = Coordinator::new(config, config_hash, storage)?;

    let outcome = coordinator
        .ingest_one(identifier, software)
        .await
        .with_context(|| format!("failed to ingest {}", identifier))?;

    println!("{}: {:?}", identifier, outcome);
    Ok(())
}

/// Handles the stats command: shows statistics from the database
fn handle_stats(config: &Config, runs: u32) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage, runs)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the check command: validates config and shows what would be crawled
fn handle_check(config: &Config) -> anyhow::Result<()> {
    println!("=== Paperhound Check ===\n");

    println!("Crawler Configuration:");
    println!("  Page size: {}", config.crawler.page_size);
    println!("  Request delay: {}ms", config.crawler.request_delay_ms);
    println!(
        "  Attempts per URL: {} ({}ms apart)",
        config.crawler.max_attempts, config.crawler.retry_delay_ms
    );
    println!("  Request timeout: {}s", config.crawler.request_timeout_secs);
    println!(
        "  Concurrent detail fetches: {}",
        config.crawler.max_concurrent_details
    );

    println!("\nSource:");
    println!("  Base URL: {}", config.source.base_url);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\nSoftware ({}):", config.software.len());
    for name in &config.software {
        println!("  - {}", name);
    }

    println!("\n✓ Configuration is valid");
    if config.software.is_empty() {
        println!("✓ Nothing configured; pass names to `crawl` explicitly");
    } else {
        println!("✓ Would crawl {} software names", config.software.len());
    }

    Ok(())
}
