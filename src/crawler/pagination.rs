//! Pagination driver
//!
//! Walks the search listing for one query term page by page, accumulating a
//! deduplicated identifier set until the source has nothing more to give.

use crate::crawler::fetcher::Fetcher;
use crate::crawler::identifier::IdentifierSet;
use crate::crawler::listing::{extract_listing, ListingPage};
use crate::crawler::source::ArchiveSource;
use crate::HoundError;

/// Why a discovery run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The first page reported no results (or no parsable count)
    NoResults,
    /// A page came back without any result blocks
    EmptyPage,
    /// The next offset would be past the reported total
    Exhausted,
    /// A page could not be fetched
    FetchFailed,
}

/// Position of one pagination run
///
/// Created per crawl and discarded afterwards; never persisted.
#[derive(Debug, Clone)]
pub struct CrawlCursor {
    /// Offset of the next page to request
    pub offset: u64,
    pub page_size: u64,
    /// Total fixed from the first page
    pub total: Option<u64>,
    pub ids: IdentifierSet,
    pub pages_fetched: u32,
}

impl CrawlCursor {
    pub fn new(page_size: u32) -> Self {
        Self {
            offset: 0,
            page_size: u64::from(page_size.max(1)),
            total: None,
            ids: IdentifierSet::new(),
            pages_fetched: 0,
        }
    }

    /// Folds a fetched page into the cursor
    ///
    /// Returns `None` if another page should be requested (the cursor's
    /// `offset` already points at it), or the reason the run is over.
    pub fn absorb(&mut self, page: ListingPage) -> Option<StopReason> {
        self.pages_fetched += 1;

        let total = *self.total.get_or_insert(page.total_count);
        if total == 0 {
            return Some(StopReason::NoResults);
        }

        let page_was_empty = page.ids.is_empty();
        self.ids.extend(page.ids);

        if page_was_empty {
            return Some(StopReason::EmptyPage);
        }
        if self.offset + self.page_size >= total {
            return Some(StopReason::Exhausted);
        }

        self.offset += self.page_size;
        None
    }
}

/// Result of one discovery run
///
/// A failed page ends the run early; whatever was collected before the
/// failure is still returned alongside the error.
#[derive(Debug)]
pub struct Discovery {
    pub ids: IdentifierSet,
    /// Total reported by the first page, 0 if no page was read
    pub total: u64,
    pub pages_fetched: u32,
    pub stop_reason: StopReason,
    pub error: Option<HoundError>,
}

impl Discovery {
    pub fn is_partial(&self) -> bool {
        self.error.is_some()
    }
}

/// Collects every identifier the source lists for `term`
///
/// Requests are paced by the fetcher's throttle. Offsets only grow and never
/// reach the total reported by the first page, so the loop always ends.
pub async fn discover_all(
    fetcher: &Fetcher,
    source: &ArchiveSource,
    term: &str,
    page_size: u32,
) -> Discovery {
    let mut cursor = CrawlCursor::new(page_size);

    let (stop_reason, error) = loop {
        let url = match source.search_url(term, cursor.offset, page_size) {
            Ok(url) => url,
            Err(e) => break (StopReason::FetchFailed, Some(e)),
        };

        tracing::debug!("Fetching listing for '{}' at offset {}", term, cursor.offset);
        let body = match fetcher.fetch(url.as_str()).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(
                    "Listing for '{}' failed at offset {}: {}",
                    term,
                    cursor.offset,
                    e
                );
                break (StopReason::FetchFailed, Some(e));
            }
        };

        let page = extract_listing(&body);
        let found = page.ids.len();
        if let Some(reason) = cursor.absorb(page) {
            break (reason, None);
        }

        tracing::debug!(
            "Page {} for '{}': {} ids, {} collected of {}",
            cursor.pages_fetched,
            term,
            found,
            cursor.ids.len(),
            cursor.total.unwrap_or(0)
        );
    };

    tracing::info!(
        "Discovery for '{}' finished ({:?}): {} ids from {} pages",
        term,
        stop_reason,
        cursor.ids.len(),
        cursor.pages_fetched
    );

    Discovery {
        ids: cursor.ids,
        total: cursor.total.unwrap_or(0),
        pages_fetched: cursor.pages_fetched,
        stop_reason,
        error,
    }
}
