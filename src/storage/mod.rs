//! Storage module for persisting discovered papers
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Paper records with their ordered author and software-name lists
//! - Crawl run tracking

mod schema;
mod sqlite;
mod traits;

#[cfg(test)]
pub(crate) mod test_support;

pub use sqlite::SqliteStorage;
pub use traits::{PaperStore, StorageError, StorageResult};

use crate::HoundError;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(HoundError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, HoundError> {
    SqliteStorage::new(path)
}

/// A stored publication and the software names it is associated with
///
/// Identifier, title, abstract and authors are written once at creation;
/// later crawls only ever extend `software_names`.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperRecord {
    pub identifier: String,
    pub title: String,
    pub abstract_text: String,
    pub authors: Vec<String>,
    /// Detail page the metadata was taken from
    pub url: String,
    pub pdf_url: String,
    /// Submission time of the resolved revision
    pub published_at: Option<DateTime<Utc>>,
    /// Distinct names in first-association order
    pub software_names: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Represents a crawl run for one software name
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub software_name: String,
    pub config_hash: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: RunStatus,
    pub tally: RunTally,
    pub error_message: Option<String>,
}

/// Per-run outcome counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTally {
    pub discovered: u64,
    pub inserted: u64,
    pub merged: u64,
    pub unchanged: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    /// Every listing page was read
    Completed,
    /// Discovery stopped early; the next scheduled crawl picks up the rest
    Partial,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Partial => "partial",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "partial" => Some(Self::Partial),
            _ => None,
        }
    }
}
