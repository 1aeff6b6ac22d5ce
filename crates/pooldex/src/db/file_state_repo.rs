//! File state repository — operations on the `file_state` table.
//!
//! One row per remote file the coordinator has attempted. `done` rows are
//! the idempotency markers and are terminal; `retry` rows accumulate
//! failure attempts until they flip to `quarantined`.

use rusqlite::params;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ValueRef};

use super::{Database, DatabaseError};

/// Processing status of one remote file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// Successfully processed. Terminal.
    Done,
    /// Failed at least once; eligible for another attempt.
    Retry,
    /// Failed `max_attempts` times; skipped until an operator intervenes.
    Quarantined,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Done => "done",
            FileStatus::Retry => "retry",
            FileStatus::Quarantined => "quarantined",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "done" => Some(FileStatus::Done),
            "retry" => Some(FileStatus::Retry),
            "quarantined" => Some(FileStatus::Quarantined),
            _ => None,
        }
    }
}

impl FromSql for FileStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        FileStatus::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown file status '{}'", s).into()))
    }
}

/// A raw file state row from the database.
#[derive(Debug, Clone)]
pub struct FileStateRow {
    pub file_id: String,
    pub name: String,
    pub status: FileStatus,
    pub attempts: u32,
    pub detail: Option<String>,
    pub updated_at: String,
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileStateRow> {
    Ok(FileStateRow {
        file_id: row.get(0)?,
        name: row.get(1)?,
        status: row.get(2)?,
        attempts: row.get(3)?,
        detail: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

const SELECT_COLUMNS: &str = "file_id, name, status, attempts, detail, updated_at";

/// Finds the state row for a single file.
pub fn find(db: &Database, file_id: &str) -> Result<Option<FileStateRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM file_state WHERE file_id = ?1",
            SELECT_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![file_id], map_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Returns the state rows for all of `file_ids` that have one.
pub fn find_many(db: &Database, file_ids: &[String]) -> Result<Vec<FileStateRow>, DatabaseError> {
    if file_ids.is_empty() {
        return Ok(Vec::new());
    }

    db.with_conn(|conn| {
        // Build IN clause with positional params.
        let placeholders: Vec<String> =
            (0..file_ids.len()).map(|i| format!("?{}", i + 1)).collect();
        let sql = format!(
            "SELECT {} FROM file_state WHERE file_id IN ({})",
            SELECT_COLUMNS,
            placeholders.join(", ")
        );

        let param_values: Vec<&dyn rusqlite::types::ToSql> =
            file_ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
        let mut stmt = conn.prepare(&sql)?;
        let result: Vec<FileStateRow> = stmt
            .query_map(param_values.as_slice(), map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(result)
    })
}

/// Marks a file as successfully processed. Terminal: later failures never
/// demote a `done` row.
pub fn mark_done(
    db: &Database,
    file_id: &str,
    name: &str,
    now: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO file_state (file_id, name, status, attempts, detail, updated_at)
             VALUES (?1, ?2, 'done', 0, NULL, ?3)
             ON CONFLICT(file_id) DO UPDATE SET
               name = ?2,
               status = 'done',
               detail = NULL,
               updated_at = ?3",
            params![file_id, name, now],
        )?;
        Ok(())
    })
}

/// Records a failed attempt and returns the resulting status.
///
/// Attempts accumulate across passes; once they reach `max_attempts` the
/// row flips to `quarantined`. A `done` row is left untouched.
pub fn record_failure(
    db: &Database,
    file_id: &str,
    name: &str,
    detail: &str,
    max_attempts: u32,
    now: &str,
) -> Result<FileStatus, DatabaseError> {
    db.with_conn(|conn| {
        let existing: Option<(FileStatus, u32)> = {
            let mut stmt = conn
                .prepare("SELECT status, attempts FROM file_state WHERE file_id = ?1")?;
            let mut rows =
                stmt.query_map(params![file_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
            match rows.next() {
                Some(Ok(pair)) => Some(pair),
                Some(Err(e)) => return Err(DatabaseError::Sqlite(e)),
                None => None,
            }
        };

        if let Some((FileStatus::Done, _)) = existing {
            return Ok(FileStatus::Done);
        }

        let attempts = existing.map(|(_, a)| a).unwrap_or(0) + 1;
        let status = if attempts >= max_attempts {
            FileStatus::Quarantined
        } else {
            FileStatus::Retry
        };

        conn.execute(
            "INSERT INTO file_state (file_id, name, status, attempts, detail, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(file_id) DO UPDATE SET
               name = ?2,
               status = ?3,
               attempts = ?4,
               detail = ?5,
               updated_at = ?6",
            params![file_id, name, status.as_str(), attempts, detail, now],
        )?;

        Ok(status)
    })
}

/// Per-status row counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCounts {
    pub done: u64,
    pub retry: u64,
    pub quarantined: u64,
}

/// Counts rows by status.
pub fn counts(db: &Database) -> Result<StateCounts, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM file_state GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, FileStatus>(0)?, row.get::<_, u64>(1)?))
        })?;

        let mut result = StateCounts::default();
        for row in rows {
            let (status, count) = row?;
            match status {
                FileStatus::Done => result.done = count,
                FileStatus::Retry => result.retry = count,
                FileStatus::Quarantined => result.quarantined = count,
            }
        }
        Ok(result)
    })
}
