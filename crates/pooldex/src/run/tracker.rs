//! Durable per-file processing state.
//!
//! Wraps the `file_state` table with the operations a pass needs:
//! partitioning a folder listing into remaining work, and recording
//! outcomes so later passes skip settled files.

use std::collections::HashMap;

use chrono::Utc;
use log::{debug, warn};

use crate::db::{file_state_repo, Database, DatabaseError, FileStatus};
use crate::drive::CandidateFile;
use crate::sanitize;

/// A folder listing split by what previous passes already settled.
#[derive(Debug)]
pub struct Partitioned {
    /// Files that still need an attempt (unseen or `retry`).
    pub pending: Vec<CandidateFile>,
    /// Files skipped because they are already `done`.
    pub skipped_done: u32,
    /// Files skipped because they are `quarantined`.
    pub skipped_quarantined: u32,
}

/// Tracks which remote files have been processed across passes.
pub struct FileTracker {
    db: Database,
    max_attempts: u32,
}

impl FileTracker {
    /// Creates a tracker that quarantines a file after `max_attempts`
    /// failed attempts.
    pub fn new(db: Database, max_attempts: u32) -> Self {
        Self { db, max_attempts }
    }

    /// Splits a folder listing into pending work and skip counts.
    ///
    /// Pending files keep their listing order.
    pub fn partition(
        &self,
        candidates: Vec<CandidateFile>,
    ) -> Result<Partitioned, DatabaseError> {
        let ids: Vec<String> = candidates.iter().map(|c| c.id.clone()).collect();
        let rows = file_state_repo::find_many(&self.db, &ids)?;
        let by_id: HashMap<String, FileStatus> = rows
            .into_iter()
            .map(|row| (row.file_id, row.status))
            .collect();

        let mut partitioned = Partitioned {
            pending: Vec::new(),
            skipped_done: 0,
            skipped_quarantined: 0,
        };
        for candidate in candidates {
            match by_id.get(&candidate.id) {
                Some(FileStatus::Done) => partitioned.skipped_done += 1,
                Some(FileStatus::Quarantined) => partitioned.skipped_quarantined += 1,
                Some(FileStatus::Retry) | None => partitioned.pending.push(candidate),
            }
        }

        debug!(
            "Partitioned listing: {} pending, {} done, {} quarantined",
            partitioned.pending.len(),
            partitioned.skipped_done,
            partitioned.skipped_quarantined
        );

        Ok(partitioned)
    }

    /// Marks a file as successfully processed. Terminal.
    pub fn mark_done(&self, candidate: &CandidateFile) -> Result<(), DatabaseError> {
        file_state_repo::mark_done(
            &self.db,
            &candidate.id,
            &candidate.name,
            &Utc::now().to_rfc3339(),
        )?;
        debug!("Marked {} as done", sanitize::redact_name(&candidate.name));
        Ok(())
    }

    /// Records a failed attempt and returns the resulting status.
    pub fn record_failure(
        &self,
        candidate: &CandidateFile,
        detail: &str,
    ) -> Result<FileStatus, DatabaseError> {
        let status = file_state_repo::record_failure(
            &self.db,
            &candidate.id,
            &candidate.name,
            detail,
            self.max_attempts,
            &Utc::now().to_rfc3339(),
        )?;

        if status == FileStatus::Quarantined {
            warn!(
                "Quarantining {} after {} failed attempts: {}",
                sanitize::redact_name(&candidate.name),
                self.max_attempts,
                detail
            );
        }

        Ok(status)
    }
}
