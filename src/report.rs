//! Crawl reports and store statistics
//!
//! This module turns per-record outcomes into run tallies and prints
//! summaries of single crawls and of the whole store.

use crate::ingest::IngestOutcome;
use crate::storage::{PaperStore, RunRecord, RunStatus, RunTally};
use crate::HoundError;
use std::time::Duration;

/// Summary of one crawl for one software name
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub software_name: String,
    pub run_id: i64,
    /// Total hits reported by the first listing page
    pub total_reported: u64,
    pub pages_fetched: u32,
    pub tally: RunTally,
    pub status: RunStatus,
    /// Error that ended discovery early, if any
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl CrawlReport {
    pub fn new(software_name: &str, run_id: i64) -> Self {
        Self {
            software_name: software_name.to_string(),
            run_id,
            total_reported: 0,
            pages_fetched: 0,
            tally: RunTally::default(),
            status: RunStatus::Running,
            error: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Counts one ingest outcome
    pub fn record(&mut self, outcome: &IngestOutcome) {
        match outcome {
            IngestOutcome::Inserted => self.tally.inserted += 1,
            IngestOutcome::Merged => self.tally.merged += 1,
            IngestOutcome::Unchanged => self.tally.unchanged += 1,
            IngestOutcome::Skipped(_) => self.tally.skipped += 1,
        }
    }

    /// Counts one identifier that could not be ingested
    pub fn record_failure(&mut self) {
        self.tally.failed += 1;
    }

    /// Identifiers that reached an outcome, failed ones included
    pub fn processed(&self) -> u64 {
        let t = &self.tally;
        t.inserted + t.merged + t.unchanged + t.skipped + t.failed
    }
}

/// Prints a crawl report to stdout
pub fn print_report(report: &CrawlReport) {
    let t = &report.tally;

    println!("=== Crawl: {} (run {}) ===", report.software_name, report.run_id);
    println!("  Status: {}", report.status.to_db_string());
    println!(
        "  Discovered: {} of {} reported ({} pages)",
        t.discovered, report.total_reported, report.pages_fetched
    );
    println!("  Inserted: {}", t.inserted);
    println!("  Merged: {}", t.merged);
    println!("  Unchanged: {}", t.unchanged);
    println!("  Skipped: {}", t.skipped);
    println!("  Failed: {}", t.failed);
    if let Some(error) = &report.error {
        println!("  Stopped early: {}", error);
    }
    println!("  Elapsed: {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

/// Snapshot of what the store holds
#[derive(Debug, Clone)]
pub struct StoreStatistics {
    pub total_papers: u64,
    /// Papers per software name, most papers first
    pub papers_by_software: Vec<(String, u64)>,
    /// Newest runs first
    pub recent_runs: Vec<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The store to query
/// * `run_limit` - How many recent runs to include
pub fn load_statistics<S: PaperStore + ?Sized>(
    storage: &S,
    run_limit: u32,
) -> Result<StoreStatistics, HoundError> {
    Ok(StoreStatistics {
        total_papers: storage.count_papers()?,
        papers_by_software: storage.count_by_software()?,
        recent_runs: storage.latest_runs(run_limit)?,
    })
}

/// Prints store statistics to stdout
pub fn print_statistics(stats: &StoreStatistics) {
    println!("=== Store Statistics ===\n");
    println!("Total papers: {}", stats.total_papers);
    println!();

    if !stats.papers_by_software.is_empty() {
        println!("Papers by Software:");
        for (name, count) in &stats.papers_by_software {
            let percentage = if stats.total_papers > 0 {
                (*count as f64 / stats.total_papers as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", name, count, percentage);
        }
        println!();
    }

    if !stats.recent_runs.is_empty() {
        println!("Recent Runs:");
        for run in &stats.recent_runs {
            let t = &run.tally;
            println!(
                "  #{} {} [{}] started {}: +{} new, {} merged, {} skipped, {} failed",
                run.id,
                run.software_name,
                run.status.to_db_string(),
                run.started_at,
                t.inserted,
                t.merged,
                t.skipped,
                t.failed
            );
            if let Some(error) = &run.error_message {
                println!("      {}", error);
            }
        }
        println!();
    }
}
