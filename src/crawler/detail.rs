//! Record detail page extraction
//!
//! Each field has its own extractor so a markup change on the archive side
//! breaks one field rather than the whole record. A field that cannot be
//! found comes back empty; deciding whether that is fatal is left to the
//! caller.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

/// Phrase the archive puts on the page of a withdrawn revision
pub const WITHDRAWAL_NOTICE: &str = "This paper has been withdrawn by";

struct DetailSelectors {
    title: Selector,
    description: Selector,
    authors: Selector,
    descriptor: Selector,
    pdf_link: Selector,
    submission_history: Selector,
}

static SELECTORS: Lazy<DetailSelectors> = Lazy::new(|| DetailSelectors {
    title: Selector::parse(r#"meta[property="og:title"]"#).expect("title selector parses"),
    description: Selector::parse(r#"meta[property="og:description"]"#)
        .expect("description selector parses"),
    authors: Selector::parse("div.authors").expect("authors selector parses"),
    descriptor: Selector::parse("span.descriptor").expect("descriptor selector parses"),
    pdf_link: Selector::parse("a.download-pdf[href]").expect("pdf selector parses"),
    submission_history: Selector::parse("div.submission-history")
        .expect("history selector parses"),
});

static REVISION_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[v(\d+)\]").expect("revision label pattern compiles"));

static SUBMITTED_AT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Z][a-z]{2},\s+\d{1,2}\s+[A-Z][a-z]{2}\s+\d{4}\s+\d{2}:\d{2}:\d{2}\s+UTC")
        .expect("submission time pattern compiles")
});

/// Metadata extracted from one detail page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaperDetail {
    pub title: String,
    pub authors: Vec<String>,
    pub abstract_text: String,
    /// Absolute PDF link, empty if the page had none
    pub pdf_url: String,
    pub is_withdrawn: bool,
    pub revisions: Vec<RevisionEntry>,
}

impl PaperDetail {
    /// Submission time of the newest revision carrying a timestamp
    pub fn latest_submission(&self) -> Option<&str> {
        self.revisions
            .iter()
            .rev()
            .find_map(|revision| revision.submitted.as_deref())
    }
}

/// One line of a record's submission history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionEntry {
    pub version: u32,
    /// Whether the entry links to its own revision page
    pub linked: bool,
    /// Raw `Fri, 1 Jan 2021 00:00:00 UTC` timestamp
    pub submitted: Option<String>,
}

/// Parses a detail page
///
/// # Arguments
///
/// * `html` - The page body
/// * `page_url` - The URL the page was fetched from, used to resolve the PDF link
pub fn extract_detail(html: &str, page_url: &Url) -> PaperDetail {
    let document = Html::parse_document(html);

    PaperDetail {
        title: extract_title(&document),
        authors: extract_authors(&document),
        abstract_text: extract_abstract(&document),
        pdf_url: extract_pdf_url(&document, page_url),
        is_withdrawn: is_withdrawn(html),
        revisions: extract_revisions(&document),
    }
}

fn meta_content(document: &Html, selector: &Selector) -> String {
    document
        .select(selector)
        .next()
        .and_then(|element| element.value().attr("content"))
        .map(collapse_whitespace)
        .unwrap_or_default()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Title from the Open Graph metadata
pub fn extract_title(document: &Html) -> String {
    meta_content(document, &SELECTORS.title)
}

/// Abstract from the Open Graph description
pub fn extract_abstract(document: &Html) -> String {
    meta_content(document, &SELECTORS.description)
}

/// Ordered author names from the comma-delimited author block
pub fn extract_authors(document: &Html) -> Vec<String> {
    let Some(block) = document.select(&SELECTORS.authors).next() else {
        return Vec::new();
    };

    let mut text = block.text().collect::<String>();
    if let Some(descriptor) = block.select(&SELECTORS.descriptor).next() {
        let label = descriptor.text().collect::<String>();
        text = text.replacen(&label, "", 1);
    }

    text.split(',')
        .map(collapse_whitespace)
        .filter(|name| !name.is_empty())
        .collect()
}

/// Absolute URL of the "View PDF" link
pub fn extract_pdf_url(document: &Html, page_url: &Url) -> String {
    document
        .select(&SELECTORS.pdf_link)
        .next()
        .and_then(|element| element.value().attr("href"))
        .and_then(|href| page_url.join(href.trim()).ok())
        .map(|url| url.to_string())
        .unwrap_or_default()
}

/// Whether the page carries the withdrawal notice
pub fn is_withdrawn(html: &str) -> bool {
    html.contains(WITHDRAWAL_NOTICE)
}

/// Parses the submission history into revision entries
///
/// Each entry is a `<strong>[vN]</strong>` label (wrapped in a link for
/// revisions other than the one being viewed) followed by a timestamp up to
/// the next line break. Entries whose label cannot be read are dropped.
pub fn extract_revisions(document: &Html) -> Vec<RevisionEntry> {
    let Some(history) = document.select(&SELECTORS.submission_history).next() else {
        return Vec::new();
    };

    history
        .inner_html()
        .split("<strong>")
        .skip(1)
        .filter_map(|chunk| {
            let (label, rest) = chunk.split_once("</strong>")?;
            let version = REVISION_LABEL
                .captures(label)?
                .get(1)?
                .as_str()
                .parse()
                .ok()?;
            let line = rest.split("<br").next().unwrap_or(rest);
            let submitted = SUBMITTED_AT
                .find(line)
                .map(|m| collapse_whitespace(m.as_str()));

            Some(RevisionEntry {
                version,
                linked: label.contains("<a "),
                submitted,
            })
        })
        .collect()
}

/// Parses a `Fri, 1 Jan 2021 00:00:00 UTC` timestamp
pub fn parse_submission_time(raw: &str) -> Option<DateTime<Utc>> {
    match NaiveDateTime::parse_from_str(raw.trim(), "%a, %d %b %Y %H:%M:%S UTC") {
        Ok(naive) => Some(Utc.from_utc_datetime(&naive)),
        Err(e) => {
            tracing::debug!("Unparsable submission time '{}': {}", raw, e);
            None
        }
    }
}
