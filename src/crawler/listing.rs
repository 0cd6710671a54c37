//! Search listing extraction
//!
//! A search results page carries one `<li class="arxiv-result">` block per
//! hit and a "Showing 1–50 of 1,234 results" banner. Anything else on the
//! page is ignored.

use crate::crawler::identifier::{first_embedded_identifier, IdentifierSet};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

static RESULT_ITEM: Lazy<Selector> =
    Lazy::new(|| Selector::parse("li.arxiv-result").expect("result selector parses"));

static TOTAL_RESULTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bof\s+([\d,]+)\s+results\b").expect("result count pattern compiles")
});

/// Identifiers and reported total of one listing page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    /// Distinct identifiers in page order
    pub ids: IdentifierSet,
    /// Total hits reported by the source; 0 when the banner is missing
    pub total_count: u64,
}

/// Parses a search results page
///
/// An empty or unrecognisable page yields no identifiers and a zero total,
/// which callers treat as the end of the listing.
pub fn extract_listing(html: &str) -> ListingPage {
    ListingPage {
        ids: extract_result_ids(html),
        total_count: extract_total_count(html),
    }
}

/// Pulls the first identifier out of each result block
fn extract_result_ids(html: &str) -> IdentifierSet {
    let document = Html::parse_document(html);
    let mut ids = IdentifierSet::new();

    for item in document.select(&RESULT_ITEM) {
        match first_embedded_identifier(&item.html()) {
            Some(id) => {
                ids.insert(id);
            }
            None => tracing::debug!("Result block without an identifier"),
        }
    }

    ids
}

/// Reads the "of N results" banner, ignoring grouping separators
fn extract_total_count(html: &str) -> u64 {
    TOTAL_RESULTS
        .captures(html)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
        .unwrap_or(0)
}
