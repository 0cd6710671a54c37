//! Store doubles for exercising failure paths

use crate::storage::traits::{PaperStore, StorageError, StorageResult};
use crate::storage::{PaperRecord, RunRecord, RunStatus, RunTally, SqliteStorage};

/// In-memory store whose `insert` fails for one identifier
pub(crate) struct FailingInsertStore {
    inner: SqliteStorage,
    failing_identifier: String,
}

impl FailingInsertStore {
    pub(crate) fn new(failing_identifier: &str) -> Self {
        Self {
            inner: SqliteStorage::new_in_memory().unwrap(),
            failing_identifier: failing_identifier.to_string(),
        }
    }
}

impl PaperStore for FailingInsertStore {
    fn find_by_identifier(&self, identifier: &str) -> StorageResult<Option<PaperRecord>> {
        self.inner.find_by_identifier(identifier)
    }

    fn insert(&mut self, record: &PaperRecord) -> StorageResult<bool> {
        if record.identifier == self.failing_identifier {
            return Err(StorageError::CorruptRow {
                identifier: record.identifier.clone(),
                message: "disk I/O error".to_string(),
            });
        }
        self.inner.insert(record)
    }

    fn update_software_names(&mut self, identifier: &str, names: &[String]) -> StorageResult<()> {
        self.inner.update_software_names(identifier, names)
    }

    fn append_software_name(&mut self, identifier: &str, name: &str) -> StorageResult<bool> {
        self.inner.append_software_name(identifier, name)
    }

    fn create_run(&mut self, software_name: &str, config_hash: &str) -> StorageResult<i64> {
        self.inner.create_run(software_name, config_hash)
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        tally: &RunTally,
        error_message: Option<&str>,
    ) -> StorageResult<()> {
        self.inner.finish_run(run_id, status, tally, error_message)
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.inner.get_run(run_id)
    }

    fn latest_runs(&self, limit: u32) -> StorageResult<Vec<RunRecord>> {
        self.inner.latest_runs(limit)
    }

    fn count_papers(&self) -> StorageResult<u64> {
        self.inner.count_papers()
    }

    fn count_by_software(&self) -> StorageResult<Vec<(String, u64)>> {
        self.inner.count_by_software()
    }
}
