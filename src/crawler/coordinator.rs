//! Crawler coordinator - main crawl orchestration logic
//!
//! This module ties the pipeline together for one software name:
//! - Recording the run in the store
//! - Discovering identifiers page by page
//! - Resolving and ingesting each identifier on a bounded worker pool
//! - Tallying outcomes and finishing the run

use crate::config::Config;
use crate::crawler::fetcher::Fetcher;
use crate::crawler::identifier::normalize_identifier;
use crate::crawler::pagination::discover_all;
use crate::crawler::source::ArchiveSource;
use crate::crawler::withdrawal::fetch_paper;
use crate::ingest::{IngestOutcome, Merger};
use crate::report::CrawlReport;
use crate::storage::{PaperStore, RunStatus, SqliteStorage};
use crate::HoundError;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

/// Main crawler coordinator structure
///
/// One coordinator can run any number of crawls; they share the fetcher
/// (and so its throttle) and the per-identifier locks.
pub struct Coordinator<S = SqliteStorage> {
    config: Arc<Config>,
    config_hash: String,
    fetcher: Arc<Fetcher>,
    source: Arc<ArchiveSource>,
    merger: Arc<Merger<S>>,
}

impl<S> Coordinator<S>
where
    S: PaperStore + Send + 'static,
{
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The validated configuration
    /// * `config_hash` - Hash of the config file, recorded with each run
    /// * `storage` - Store handle owned by the caller
    pub fn new(
        config: Config,
        config_hash: String,
        storage: Arc<Mutex<S>>,
    ) -> Result<Self, HoundError> {
        let fetcher = Fetcher::from_config(&config.crawler, &config.user_agent)?;
        let source = ArchiveSource::from_config(&config.source)?;

        Ok(Self {
            config: Arc::new(config),
            config_hash,
            fetcher: Arc::new(fetcher),
            source: Arc::new(source),
            merger: Arc::new(Merger::new(storage)),
        })
    }

    /// Runs one crawl for `software_name`
    ///
    /// Discovery errors end the listing early but the identifiers found so
    /// far are still ingested and the run is marked partial. Per-identifier
    /// failures are logged and counted; they never abort the crawl.
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - Tallies for the run
    /// * `Err(HoundError)` - The run could not be recorded in the store
    pub async fn run_crawl(&self, software_name: &str) -> Result<CrawlReport, HoundError> {
        let start_time = Instant::now();
        let run_id = self
            .merger
            .with_store(|store| store.create_run(software_name, &self.config_hash))?;
        let mut report = CrawlReport::new(software_name, run_id);

        tracing::info!("Starting crawl run {} for '{}'", run_id, software_name);

        let discovery = discover_all(
            &self.fetcher,
            &self.source,
            software_name,
            self.config.crawler.page_size,
        )
        .await;
        report.total_reported = discovery.total;
        report.pages_fetched = discovery.pages_fetched;
        report.tally.discovered = discovery.ids.len() as u64;
        report.error = discovery.error.as_ref().map(|e| e.to_string());
        report.status = if discovery.is_partial() {
            RunStatus::Partial
        } else {
            RunStatus::Completed
        };

        let semaphore = Arc::new(Semaphore::new(
            self.config.crawler.max_concurrent_details as usize,
        ));
        let mut workers = JoinSet::new();

        for identifier in discovery.ids {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| HoundError::Worker(e.to_string()))?;
            let fetcher = Arc::clone(&self.fetcher);
            let source = Arc::clone(&self.source);
            let merger = Arc::clone(&self.merger);
            let software = software_name.to_string();

            workers.spawn(async move {
                let _permit = permit;
                let outcome = merger
                    .ingest(&identifier, &software, || {
                        fetch_paper(&fetcher, &source, &identifier)
                    })
                    .await;
                (identifier, outcome)
            });

            // Collect finished workers as we go so results do not pile up
            while let Some(joined) = workers.try_join_next() {
                record_joined(&mut report, joined);
            }
        }

        while let Some(joined) = workers.join_next().await {
            record_joined(&mut report, joined);
        }

        self.merger.with_store(|store| {
            store.finish_run(
                run_id,
                report.status,
                &report.tally,
                report.error.as_deref(),
            )
        })?;
        report.elapsed = start_time.elapsed();

        tracing::info!(
            "Crawl run {} for '{}' {}: {} inserted, {} merged, {} unchanged, {} skipped, {} failed in {:?}",
            run_id,
            software_name,
            report.status.to_db_string(),
            report.tally.inserted,
            report.tally.merged,
            report.tally.unchanged,
            report.tally.skipped,
            report.tally.failed,
            report.elapsed
        );

        Ok(report)
    }

    /// Crawls each name in turn
    ///
    /// A name whose run cannot be recorded is logged and skipped.
    pub async fn run_all(&self, software_names: &[String]) -> Vec<CrawlReport> {
        let mut reports = Vec::with_capacity(software_names.len());
        for name in software_names {
            match self.run_crawl(name).await {
                Ok(report) => reports.push(report),
                Err(e) => tracing::error!("Crawl for '{}' failed: {}", name, e),
            }
        }
        reports
    }

    /// Ingests a single identifier without running discovery
    ///
    /// `arXiv:` prefixes and version suffixes are accepted and stripped.
    pub async fn ingest_one(
        &self,
        identifier: &str,
        software_name: &str,
    ) -> Result<IngestOutcome, HoundError> {
        let identifier = normalize_identifier(identifier)
            .ok_or_else(|| HoundError::InvalidIdentifier(identifier.to_string()))?;

        self.merger
            .ingest(&identifier, software_name, || {
                fetch_paper(&self.fetcher, &self.source, &identifier)
            })
            .await
    }
}

type WorkerResult = (String, Result<IngestOutcome, HoundError>);

fn record_joined(report: &mut CrawlReport, joined: Result<WorkerResult, JoinError>) {
    match joined {
        Ok((identifier, Ok(outcome))) => {
            if let IngestOutcome::Skipped(reason) = &outcome {
                tracing::warn!("Skipping {}: {}", identifier, reason);
            }
            report.record(&outcome);
        }
        Ok((identifier, Err(e))) => {
            tracing::warn!("Failed to ingest {}: {}", identifier, e);
            report.record_failure();
        }
        Err(e) => {
            tracing::error!("Ingest worker panicked: {}", e);
            report.record_failure();
        }
    }

    if report.processed() % 25 == 0 {
        tracing::info!(
            "Progress for '{}': {}/{} identifiers",
            report.software_name,
            report.processed(),
            report.tally.discovered
        );
    }
}

/// Runs one crawl against the configured database
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `config_hash` - Hash of the config file
/// * `software_name` - Name to search the archive for
///
/// # Example
///
/// ```no_run
/// use paperhound::config::load_config_with_hash;
/// use paperhound::crawler::run_crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("config.toml"))?;
/// let report = run_crawl(config, hash, "lammps").await?;
/// println!("{} new papers", report.tally.inserted);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(
    config: Config,
    config_hash: String,
    software_name: &str,
) -> Result<CrawlReport, HoundError> {
    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let coordinator = Coordinator::new(config, config_hash, Arc::new(Mutex::new(storage)))?;
    coordinator.run_crawl(software_name).await
}
