//! Record cache repository — operations on the `records` table.
//!
//! Stores the serialized `Record` for every successfully processed file so
//! aggregates can cover full history without re-running extraction.

use rusqlite::params;

use crate::record::Record;

use super::{Database, DatabaseError};

/// Inserts or replaces the cached record for a file.
pub fn upsert(db: &Database, record: &Record, now: &str) -> Result<(), DatabaseError> {
    let json = serde_json::to_string(record).map_err(|e| DatabaseError::CorruptRow {
        key: record.source_id.clone(),
        reason: e.to_string(),
    })?;

    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO records (file_id, source_name, record_json, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(file_id) DO UPDATE SET
               source_name = ?2,
               record_json = ?3",
            params![record.source_id, record.source_name, json, now],
        )?;
        Ok(())
    })
}

/// Finds the cached record for a file.
pub fn find(db: &Database, file_id: &str) -> Result<Option<Record>, DatabaseError> {
    let json: Option<String> = db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT record_json FROM records WHERE file_id = ?1")?;
        let mut rows = stmt.query_map(params![file_id], |row| row.get::<_, String>(0))?;
        match rows.next() {
            Some(Ok(json)) => Ok(Some(json)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })?;

    match json {
        Some(json) => {
            let record =
                serde_json::from_str(&json).map_err(|e| DatabaseError::CorruptRow {
                    key: file_id.to_string(),
                    reason: e.to_string(),
                })?;
            Ok(Some(record))
        }
        None => Ok(None),
    }
}

/// Loads every cached record, ordered by file id for stable iteration.
pub fn load_all(db: &Database) -> Result<Vec<Record>, DatabaseError> {
    let rows: Vec<(String, String)> = db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT file_id, record_json FROM records ORDER BY file_id")?;
        let result = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(result)
    })?;

    let mut records = Vec::with_capacity(rows.len());
    for (file_id, json) in rows {
        let record = serde_json::from_str(&json).map_err(|e| DatabaseError::CorruptRow {
            key: file_id,
            reason: e.to_string(),
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Counts cached records.
pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM records", [], |r| r.get(0))?;
        Ok(count)
    })
}
