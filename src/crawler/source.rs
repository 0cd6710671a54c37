//! URL layout of the archive
//!
//! Search results live under `/search/` and are paged with `start`/`size`
//! query parameters; record pages live under `/abs/<id>` with an optional
//! `v<N>` revision suffix.

use crate::config::SourceConfig;
use crate::HoundError;
use url::Url;

/// Builds every URL the crawler requests from the archive
#[derive(Debug, Clone)]
pub struct ArchiveSource {
    base: Url,
}

impl ArchiveSource {
    /// Creates a source rooted at `base_url`
    pub fn new(base_url: &str) -> Result<Self, HoundError> {
        let mut base = Url::parse(base_url)?;
        // Url::join treats the last path segment as a file unless it ends in '/'
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { base })
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self, HoundError> {
        Self::new(&config.base_url)
    }

    /// Full-text search listing for `term`, starting at result `offset`
    pub fn search_url(&self, term: &str, offset: u64, page_size: u32) -> Result<Url, HoundError> {
        let mut url = self.base.join("search/")?;
        url.query_pairs_mut()
            .append_pair("query", term)
            .append_pair("searchtype", "all")
            .append_pair("abstracts", "show")
            .append_pair("order", "-announced_date_first")
            .append_pair("size", &page_size.to_string())
            .append_pair("start", &offset.to_string());
        Ok(url)
    }

    /// Detail page of the current revision
    pub fn detail_url(&self, identifier: &str) -> Result<Url, HoundError> {
        Ok(self.base.join(&format!("abs/{}", identifier))?)
    }

    /// Detail page pinned to revision `version`
    pub fn revision_url(&self, identifier: &str, version: u32) -> Result<Url, HoundError> {
        Ok(self
            .base
            .join(&format!("abs/{}v{}", identifier, version))?)
    }
}
