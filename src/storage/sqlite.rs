//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the PaperStore trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{PaperStore, StorageError, StorageResult};
use crate::storage::{PaperRecord, RunRecord, RunStatus, RunTally};
use crate::HoundError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

/// How long a writer waits for another connection's write lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(HoundError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, HoundError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, HoundError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn load_names(&self, sql: &str, identifier: &str) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare(sql)?;
        let names = stmt
            .query_map(params![identifier], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn ensure_paper_exists(conn: &Connection, identifier: &str) -> StorageResult<()> {
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM papers WHERE identifier = ?1",
                params![identifier],
                |row| row.get(0),
            )
            .optional()?;
        match exists {
            Some(_) => Ok(()),
            None => Err(StorageError::PaperNotFound(identifier.to_string())),
        }
    }
}

fn parse_timestamp(identifier: &str, raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::CorruptRow {
            identifier: identifier.to_string(),
            message: format!("bad timestamp '{}': {}", raw, e),
        })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let status: String = row.get(5)?;
    Ok(RunRecord {
        id: row.get(0)?,
        software_name: row.get(1)?,
        config_hash: row.get(2)?,
        started_at: row.get(3)?,
        finished_at: row.get(4)?,
        status: RunStatus::from_db_string(&status).unwrap_or(RunStatus::Running),
        tally: RunTally {
            discovered: row.get::<_, i64>(6)? as u64,
            inserted: row.get::<_, i64>(7)? as u64,
            merged: row.get::<_, i64>(8)? as u64,
            unchanged: row.get::<_, i64>(9)? as u64,
            skipped: row.get::<_, i64>(10)? as u64,
            failed: row.get::<_, i64>(11)? as u64,
        },
        error_message: row.get(12)?,
    })
}

const RUN_COLUMNS: &str = "id, software_name, config_hash, started_at, finished_at, status,
     discovered, inserted, merged, unchanged, skipped, failed, error_message";

impl PaperStore for SqliteStorage {
    // ===== Paper Records =====

    fn find_by_identifier(&self, identifier: &str) -> StorageResult<Option<PaperRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT title, abstract, url, pdf_url, published_at, created_at
                 FROM papers WHERE identifier = ?1",
                params![identifier],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((title, abstract_text, url, pdf_url, published_at, created_at)) = row else {
            return Ok(None);
        };

        let published_at = published_at
            .map(|raw| parse_timestamp(identifier, &raw))
            .transpose()?;
        let created_at = parse_timestamp(identifier, &created_at)?;

        let authors = self.load_names(
            "SELECT name FROM paper_authors WHERE paper_id = ?1 ORDER BY position",
            identifier,
        )?;
        let software_names = self.load_names(
            "SELECT name FROM paper_software WHERE paper_id = ?1 ORDER BY position",
            identifier,
        )?;

        Ok(Some(PaperRecord {
            identifier: identifier.to_string(),
            title,
            abstract_text,
            authors,
            url,
            pdf_url,
            published_at,
            software_names,
            created_at,
        }))
    }

    fn insert(&mut self, record: &PaperRecord) -> StorageResult<bool> {
        let tx = self.conn.transaction()?;

        let written = tx.execute(
            "INSERT OR IGNORE INTO papers
             (identifier, title, abstract, url, pdf_url, published_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.identifier,
                record.title,
                record.abstract_text,
                record.url,
                record.pdf_url,
                record.published_at.map(|dt| dt.to_rfc3339()),
                record.created_at.to_rfc3339(),
            ],
        )?;

        if written == 0 {
            return Ok(false);
        }

        {
            let mut author_stmt = tx.prepare(
                "INSERT INTO paper_authors (paper_id, position, name) VALUES (?1, ?2, ?3)",
            )?;
            for (position, name) in record.authors.iter().enumerate() {
                author_stmt.execute(params![record.identifier, position as i64, name])?;
            }

            let mut software_stmt = tx.prepare(
                "INSERT INTO paper_software (paper_id, position, name) VALUES (?1, ?2, ?3)",
            )?;
            for (position, name) in record.software_names.iter().enumerate() {
                software_stmt.execute(params![record.identifier, position as i64, name])?;
            }
        }

        tx.commit()?;
        Ok(true)
    }

    fn update_software_names(&mut self, identifier: &str, names: &[String]) -> StorageResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Self::ensure_paper_exists(&tx, identifier)?;

        tx.execute(
            "DELETE FROM paper_software WHERE paper_id = ?1",
            params![identifier],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO paper_software (paper_id, position, name) VALUES (?1, ?2, ?3)",
            )?;
            for (position, name) in names.iter().enumerate() {
                stmt.execute(params![identifier, position as i64, name])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn append_software_name(&mut self, identifier: &str, name: &str) -> StorageResult<bool> {
        // IMMEDIATE takes the write lock up front so the position read and
        // the insert see the same list
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Self::ensure_paper_exists(&tx, identifier)?;

        let written = tx.execute(
            "INSERT OR IGNORE INTO paper_software (paper_id, position, name)
             SELECT ?1, COALESCE(MAX(position) + 1, 0), ?2
             FROM paper_software WHERE paper_id = ?1",
            params![identifier, name],
        )?;

        tx.commit()?;
        Ok(written == 1)
    }

    // ===== Run Management =====

    fn create_run(&mut self, software_name: &str, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO crawl_runs (software_name, config_hash, started_at, status)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                software_name,
                config_hash,
                now,
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        tally: &RunTally,
        error_message: Option<&str>,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE crawl_runs SET status = ?1, finished_at = ?2, discovered = ?3, inserted = ?4,
             merged = ?5, unchanged = ?6, skipped = ?7, failed = ?8, error_message = ?9
             WHERE id = ?10",
            params![
                status.to_db_string(),
                now,
                tally.discovered as i64,
                tally.inserted as i64,
                tally.merged as i64,
                tally.unchanged as i64,
                tally.skipped as i64,
                tally.failed as i64,
                error_message,
                run_id
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let sql = format!("SELECT {} FROM crawl_runs WHERE id = ?1", RUN_COLUMNS);
        self.conn
            .query_row(&sql, params![run_id], run_from_row)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn latest_runs(&self, limit: u32) -> StorageResult<Vec<RunRecord>> {
        let sql = format!(
            "SELECT {} FROM crawl_runs ORDER BY id DESC LIMIT ?1",
            RUN_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let runs = stmt
            .query_map(params![limit], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    // ===== Statistics =====

    fn count_papers(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM papers", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_by_software(&self) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, COUNT(*) AS papers
             FROM paper_software
             GROUP BY name
             ORDER BY papers DESC, name",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}
