//! Crawler module for paper discovery and resolution
//!
//! This module contains the archive-facing half of the pipeline:
//! - HTTP fetching with bounded retry and a shared request throttle
//! - Search listing extraction and pagination
//! - Detail page extraction and withdrawal resolution
//! - Overall crawl coordination

mod coordinator;
mod detail;
mod fetcher;
mod identifier;
mod listing;
mod pagination;
mod source;
mod withdrawal;

pub use coordinator::{run_crawl, Coordinator};
pub use detail::{
    extract_detail, parse_submission_time, PaperDetail, RevisionEntry, WITHDRAWAL_NOTICE,
};
pub use fetcher::{build_http_client, FetchPolicy, Fetcher, Throttle};
pub use identifier::{first_embedded_identifier, normalize_identifier, IdentifierSet};
pub use listing::{extract_listing, ListingPage};
pub use pagination::{discover_all, CrawlCursor, Discovery, StopReason};
pub use source::ArchiveSource;
pub use withdrawal::{fetch_paper, last_valid_revision, resolve_paper, Resolution};
