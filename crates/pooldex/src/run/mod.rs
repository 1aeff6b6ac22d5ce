//! Pass coordination.
//!
//! A pass lists the incoming folder, runs every new bundle through the
//! pipeline, publishes the per-bundle outputs, then rebuilds index and
//! summary from the full record history. Loop mode repeats passes
//! sequentially with a sleep in between; passes never overlap.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::config::JobSpec;
use crate::db::{record_repo, Database, FileStatus};
use crate::drive::{CandidateFile, DriveError, FolderStore};
use crate::error::RunError;
use crate::pipeline::{Pipeline, ProcessOutcome};
use crate::record::{RecordStatus, RunReport};
use crate::report::{INDEX_NAME, SUMMARY_NAME};
use crate::sanitize;

pub mod tracker;

pub use tracker::FileTracker;

const PDF_MIME: &str = "application/pdf";
const TEXT_MIME: &str = "text/plain";
const CSV_MIME: &str = "text/csv";

/// Drives complete passes over the incoming folder.
pub struct RunCoordinator {
    spec: JobSpec,
    db: Database,
    store: Arc<dyn FolderStore>,
    pipeline: Pipeline,
    tracker: FileTracker,
}

impl RunCoordinator {
    pub fn new(
        spec: JobSpec,
        db: Database,
        store: Arc<dyn FolderStore>,
        pipeline: Pipeline,
    ) -> Self {
        let tracker = FileTracker::new(db.clone(), spec.max_attempts);
        Self {
            spec,
            db,
            store,
            pipeline,
            tracker,
        }
    }

    /// Runs a single pass over the incoming folder.
    ///
    /// Every bundle without a terminal state is attempted. Outputs are
    /// published before the file is marked done, so an interrupted pass
    /// re-attempts the file instead of losing its outputs. The aggregates
    /// are rebuilt from the full record history at the end of the pass,
    /// which also restores them if they were deleted remotely.
    pub async fn run_once(&self) -> Result<RunReport, RunError> {
        let mut report = RunReport::default();

        let candidates = self
            .store
            .list_folder(&self.spec.incoming_folder_id)
            .await
            .map_err(|e| RunError::ListFolder {
                folder: self.spec.incoming_folder_id.clone(),
                source: e,
            })?;
        report.listed = candidates.len() as u32;

        let partitioned = self.tracker.partition(candidates)?;
        report.skipped_done = partitioned.skipped_done;
        report.skipped_quarantined = partitioned.skipped_quarantined;

        if partitioned.pending.is_empty() {
            info!(
                "No new bundles ({} listed, {} already done, {} quarantined)",
                report.listed, report.skipped_done, report.skipped_quarantined
            );
        } else {
            info!(
                "Processing {} of {} listed bundles",
                partitioned.pending.len(),
                report.listed
            );
        }

        for candidate in &partitioned.pending {
            self.process_candidate(candidate, &mut report).await?;
        }

        report.aggregates_uploaded = self.publish_aggregates().await?;

        info!(
            "Pass complete: {} attempted ({} success, {} partial, {} failed), {} newly quarantined",
            report.attempted(),
            report.succeeded,
            report.partial,
            report.failed,
            report.quarantined
        );

        Ok(report)
    }

    /// Repeats passes until a shutdown signal arrives.
    ///
    /// A failed pass is logged and the loop continues at the next
    /// interval. A signal received mid-pass takes effect once the pass
    /// finishes.
    pub async fn run_loop(&self, mut shutdown: broadcast::Receiver<()>) {
        let sleep = Duration::from_secs(self.spec.loop_sleep_seconds);
        let mut pass: u64 = 0;

        loop {
            pass += 1;
            info!("Starting pass {}", pass);
            if let Err(e) = self.run_once().await {
                error!("Pass {} failed: {}", pass, e);
            }

            match shutdown.try_recv() {
                Ok(()) | Err(broadcast::error::TryRecvError::Lagged(_)) => {
                    info!("Shutdown requested, stopping after pass {}", pass);
                    return;
                }
                Err(_) => {}
            }

            debug!("Sleeping {}s until next pass", sleep.as_secs());
            tokio::select! {
                _ = tokio::time::sleep(sleep) => {}
                result = shutdown.recv() => {
                    if result.is_ok() {
                        info!("Shutdown requested, stopping after pass {}", pass);
                        return;
                    }
                }
            }
        }
    }

    /// Processes one bundle and settles its state.
    async fn process_candidate(
        &self,
        candidate: &CandidateFile,
        report: &mut RunReport,
    ) -> Result<(), RunError> {
        let outcome = self.pipeline.process(candidate).await;

        if !outcome.record.status.is_usable() {
            let detail = outcome
                .record
                .detail
                .clone()
                .unwrap_or_else(|| "processing failed".to_string());
            self.note_failure(candidate, &detail, report)?;
            return Ok(());
        }

        // Outputs first, state second. A crash in between leaves the file
        // unmarked and the next pass re-publishes the same bytes.
        if let Err(e) = self.publish_outcome(&outcome).await {
            warn!(
                "Publishing outputs for {} failed: {}",
                sanitize::redact_name(&candidate.name),
                e
            );
            self.note_failure(candidate, &format!("publish failed: {}", e), report)?;
            return Ok(());
        }

        record_repo::upsert(&self.db, &outcome.record, &Utc::now().to_rfc3339())?;
        self.tracker.mark_done(candidate)?;

        match outcome.record.status {
            RecordStatus::Success => report.succeeded += 1,
            RecordStatus::Partial => report.partial += 1,
            RecordStatus::Failed => {}
        }
        Ok(())
    }

    /// Records a per-file failure and updates the pass counts.
    fn note_failure(
        &self,
        candidate: &CandidateFile,
        detail: &str,
        report: &mut RunReport,
    ) -> Result<(), RunError> {
        report.failed += 1;
        let status = self.tracker.record_failure(candidate, detail)?;
        if status == FileStatus::Quarantined {
            report.quarantined += 1;
        }
        Ok(())
    }

    /// Uploads the anonymised copy and recognized text for one bundle.
    async fn publish_outcome(&self, outcome: &ProcessOutcome) -> Result<(), DriveError> {
        let record = &outcome.record;

        // A usable record always carries the downloaded bytes.
        if let Some(pdf) = &outcome.pdf_bytes {
            self.store
                .upsert_by_name(
                    &self.spec.processed_folder_id,
                    &record.document_name,
                    PDF_MIME,
                    pdf,
                )
                .await?;
        }
        self.store
            .upsert_by_name(
                &self.spec.processed_folder_id,
                &record.text_name,
                TEXT_MIME,
                outcome.text.as_bytes(),
            )
            .await?;
        Ok(())
    }

    /// Rebuilds index and summary from the full record history and
    /// replaces both in the output folder. Returns whether an upload
    /// happened.
    async fn publish_aggregates(&self) -> Result<bool, RunError> {
        let records = record_repo::load_all(&self.db)?;
        if records.is_empty() {
            debug!("No records yet, skipping aggregates");
            return Ok(false);
        }

        let outputs = crate::report::build(&records)?;

        self.store
            .upsert_by_name(
                &self.spec.processed_folder_id,
                INDEX_NAME,
                PDF_MIME,
                &outputs.index_pdf,
            )
            .await
            .map_err(|e| RunError::AggregateUpload {
                name: INDEX_NAME.to_string(),
                source: e,
            })?;
        self.store
            .upsert_by_name(
                &self.spec.processed_folder_id,
                SUMMARY_NAME,
                CSV_MIME,
                &outputs.summary_csv,
            )
            .await
            .map_err(|e| RunError::AggregateUpload {
                name: SUMMARY_NAME.to_string(),
                source: e,
            })?;

        info!(
            "Replaced {} and {} covering {} bundles",
            INDEX_NAME,
            SUMMARY_NAME,
            records.len()
        );
        Ok(true)
    }
}
