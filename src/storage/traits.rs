//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::storage::{PaperRecord, RunRecord, RunStatus, RunTally};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Paper not found: {0}")]
    PaperNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Corrupt row for {identifier}: {message}")]
    CorruptRow { identifier: String, message: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for paper store implementations
///
/// The crawl pipeline uses lookup, insert and the software-name writes.
/// The remaining methods back run bookkeeping and the `stats` command.
pub trait PaperStore {
    // ===== Paper Records =====

    /// Looks up a paper by its external identifier
    fn find_by_identifier(&self, identifier: &str) -> StorageResult<Option<PaperRecord>>;

    /// Inserts a new paper with its authors and software names
    ///
    /// Returns `false` without writing anything if a paper with the same
    /// identifier already exists.
    fn insert(&mut self, record: &PaperRecord) -> StorageResult<bool>;

    /// Replaces the software-name list of an existing paper
    ///
    /// The list is stored in the given order.
    fn update_software_names(&mut self, identifier: &str, names: &[String]) -> StorageResult<()>;

    /// Appends one software name to an existing paper's list
    ///
    /// The check and the write happen atomically against the stored list,
    /// so concurrent appends from other handles are never lost. Returns
    /// `false` if the name was already present.
    fn append_software_name(&mut self, identifier: &str, name: &str) -> StorageResult<bool>;

    // ===== Run Management =====

    /// Records the start of a crawl for one software name
    fn create_run(&mut self, software_name: &str, config_hash: &str) -> StorageResult<i64>;

    /// Stores the final status and counters of a run
    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        tally: &RunTally,
        error_message: Option<&str>,
    ) -> StorageResult<()>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent runs, newest first
    fn latest_runs(&self, limit: u32) -> StorageResult<Vec<RunRecord>>;

    // ===== Statistics =====

    /// Gets total paper count
    fn count_papers(&self) -> StorageResult<u64>;

    /// Counts papers per associated software name, most papers first
    fn count_by_software(&self) -> StorageResult<Vec<(String, u64)>>;
}
