//! Paperhound: software-citation paper discovery
//!
//! This crate discovers every archive publication that mentions a piece of
//! software, resolves the authoritative metadata for each one (walking back
//! past withdrawn revisions), and merges the result into a store that tracks
//! which software names each paper is associated with.

pub mod config;
pub mod crawler;
pub mod ingest;
pub mod report;
pub mod storage;

use thiserror::Error;

/// Main error type for Paperhound operations
#[derive(Debug, Error)]
pub enum HoundError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP status {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Giving up on {url} after {attempts} attempts: {last_error}")]
    FetchExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Paperhound operations
pub type Result<T> = std::result::Result<T, HoundError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{run_crawl, Coordinator};
pub use ingest::{IngestOutcome, SkipReason};
pub use storage::{PaperRecord, PaperStore, SqliteStorage};
