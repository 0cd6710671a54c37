//! Ingestion merger
//!
//! Decides, for one discovered identifier and the software name driving the
//! crawl, whether to insert a new paper or append the name to an existing
//! paper's association list. Running the same `(identifier, name)` pair twice
//! never changes the stored paper the second time.

use crate::storage::{PaperRecord, PaperStore, StorageError, StorageResult};
use crate::HoundError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Metadata resolved for a paper that is not yet stored
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaperMetadata {
    pub title: String,
    pub authors: Vec<String>,
    pub abstract_text: String,
    pub url: String,
    pub pdf_url: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// Why a paper was not written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The detail page yielded no title
    EmptyTitle,
    /// The paper is withdrawn and no earlier revision could be used
    Unresolvable(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "empty title"),
            Self::Unresolvable(reason) => write!(f, "unresolvable withdrawal: {}", reason),
        }
    }
}

/// What a detail lookup produced for a new identifier
#[derive(Debug, Clone, PartialEq)]
pub enum DetailOutcome {
    Found(PaperMetadata),
    Skip(SkipReason),
}

/// Result of ingesting one identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new paper was stored with the software name as its only association
    Inserted,
    /// The software name was appended to an existing paper
    Merged,
    /// The paper already carried the software name; nothing was written
    Unchanged,
    Skipped(SkipReason),
}

/// Appends `name` to `existing` unless it is already present
///
/// Returns `None` when the list would not change. Comparison is exact, so
/// `"LAMMPS"` and `"lammps"` are distinct names.
pub fn merge_software_names(existing: &[String], name: &str) -> Option<Vec<String>> {
    if existing.iter().any(|current| current == name) {
        return None;
    }

    let mut merged = Vec::with_capacity(existing.len() + 1);
    merged.extend_from_slice(existing);
    merged.push(name.to_string());
    Some(merged)
}

/// Per-identifier async locks
///
/// Serializes the read-then-write of each identifier so two crawls that
/// discover the same paper at the same time cannot lose an update. Entries
/// are dropped once nobody holds or waits on them.
#[derive(Debug, Default)]
pub struct IdentifierLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl IdentifierLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `identifier`
    pub async fn lock(&self, identifier: &str) -> Result<IdentifierGuard<'_>, HoundError> {
        let entry = {
            let mut map = self
                .inner
                .lock()
                .map_err(|_| HoundError::Worker("identifier lock table poisoned".to_string()))?;
            Arc::clone(map.entry(identifier.to_string()).or_default())
        };

        let guard = entry.lock_owned().await;
        Ok(IdentifierGuard {
            locks: self,
            identifier: identifier.to_string(),
            guard: Some(guard),
        })
    }

    /// Number of identifiers currently locked or awaited
    pub fn len(&self) -> usize {
        self.inner.lock().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Held while one identifier is being ingested
pub struct IdentifierGuard<'a> {
    locks: &'a IdentifierLocks,
    identifier: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IdentifierGuard<'_> {
    fn drop(&mut self) {
        // Release before checking so our own Arc is not counted
        self.guard.take();

        if let Ok(mut map) = self.locks.inner.lock() {
            let idle = map
                .get(&self.identifier)
                .is_some_and(|entry| Arc::strong_count(entry) == 1);
            if idle {
                map.remove(&self.identifier);
            }
        }
    }
}

/// Merges discovered identifiers into a paper store
pub struct Merger<S> {
    store: Arc<Mutex<S>>,
    locks: IdentifierLocks,
}

impl<S: PaperStore> Merger<S> {
    pub fn new(store: Arc<Mutex<S>>) -> Self {
        Self {
            store,
            locks: IdentifierLocks::new(),
        }
    }

    pub fn store(&self) -> &Arc<Mutex<S>> {
        &self.store
    }

    /// Runs one store operation under the store mutex
    ///
    /// The guard never outlives the closure, so it is never held across an
    /// await point.
    pub(crate) fn with_store<T>(
        &self,
        op: impl FnOnce(&mut S) -> StorageResult<T>,
    ) -> Result<T, HoundError> {
        let mut store = self
            .store
            .lock()
            .map_err(|_| HoundError::Worker("store mutex poisoned".to_string()))?;
        Ok(op(&mut *store)?)
    }

    /// Ingests `identifier` on behalf of `software_name`
    ///
    /// `fetch_detail` is only invoked when the identifier is not stored yet.
    /// A fetch error or a store error is returned to the caller; skips are
    /// reported through [`IngestOutcome::Skipped`] and write nothing.
    pub async fn ingest<F, Fut>(
        &self,
        identifier: &str,
        software_name: &str,
        fetch_detail: F,
    ) -> Result<IngestOutcome, HoundError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<DetailOutcome, HoundError>>,
    {
        let _guard = self.locks.lock(identifier).await?;

        if let Some(existing) = self.with_store(|store| store.find_by_identifier(identifier))? {
            return self.merge_into(&existing, software_name);
        }

        let metadata = match fetch_detail().await? {
            DetailOutcome::Found(metadata) => metadata,
            DetailOutcome::Skip(reason) => return Ok(IngestOutcome::Skipped(reason)),
        };
        if metadata.title.trim().is_empty() {
            return Ok(IngestOutcome::Skipped(SkipReason::EmptyTitle));
        }

        let record = PaperRecord {
            identifier: identifier.to_string(),
            title: metadata.title,
            abstract_text: metadata.abstract_text,
            authors: metadata.authors,
            url: metadata.url,
            pdf_url: metadata.pdf_url,
            published_at: metadata.published_at,
            software_names: vec![software_name.to_string()],
            created_at: Utc::now(),
        };

        if self.with_store(|store| store.insert(&record))? {
            tracing::debug!("Inserted {} for '{}'", identifier, software_name);
            return Ok(IngestOutcome::Inserted);
        }

        // Another writer on the same database got there first
        tracing::debug!("{} appeared during fetch, merging instead", identifier);
        let existing = self
            .with_store(|store| store.find_by_identifier(identifier))?
            .ok_or_else(|| StorageError::PaperNotFound(identifier.to_string()))?;
        self.merge_into(&existing, software_name)
    }

    fn merge_into(
        &self,
        existing: &PaperRecord,
        software_name: &str,
    ) -> Result<IngestOutcome, HoundError> {
        if merge_software_names(&existing.software_names, software_name).is_none() {
            return Ok(IngestOutcome::Unchanged);
        }

        // The snapshot may be stale if another process wrote since it was
        // read, so the append re-checks against the stored list
        let appended = self.with_store(|store| {
            store.append_software_name(&existing.identifier, software_name)
        })?;
        if !appended {
            return Ok(IngestOutcome::Unchanged);
        }

        tracing::debug!("Merged '{}' into {}", software_name, existing.identifier);
        Ok(IngestOutcome::Merged)
    }
}
