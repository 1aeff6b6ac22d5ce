//! Test harness wiring the fakes into a full coordinator.
//!
//! Each harness owns an in-memory drive and a state store in a fresh
//! temp directory, so passes within one test share history while tests
//! stay isolated from each other.

#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;

use pooldex::config::{ExtractionSpec, JobSpec, OcrSpec};
use pooldex::db::{Database, DB_FILE_NAME};
use pooldex::drive::FolderStore;
use pooldex::extract::EntryExtractor;
use pooldex::pipeline::Pipeline;
use pooldex::record::RunReport;
use pooldex::run::RunCoordinator;

use super::fakes::{FakeRecognizer, FakeRenderer, MemStore};

/// Folder id the harness spec watches.
pub const INCOMING: &str = "folder-incoming";
/// Folder id the harness spec publishes into.
pub const PROCESSED: &str = "folder-processed";

pub struct TestHarness {
    /// Keeps the state store directory alive for the test's duration.
    _store_dir: TempDir,
    pub db: Database,
    pub drive: Arc<MemStore>,
    pub spec: JobSpec,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_spec(test_spec())
    }

    pub fn with_spec(spec: JobSpec) -> Self {
        let store_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(&store_dir.path().join(DB_FILE_NAME))
            .expect("Failed to open state store");

        Self {
            _store_dir: store_dir,
            db,
            drive: Arc::new(MemStore::new()),
            spec,
        }
    }

    /// Adds a bundle fixture to the incoming folder and returns its id.
    pub fn seed_incoming(&self, name: &str, fixture: &str) -> String {
        self.drive.seed(INCOMING, name, fixture.as_bytes())
    }

    /// Builds a coordinator over the shared drive and state store.
    pub fn coordinator(&self) -> RunCoordinator {
        let store: Arc<dyn FolderStore> = self.drive.clone();
        let pipeline = Pipeline::new(
            Arc::clone(&store),
            Arc::new(FakeRenderer),
            Arc::new(FakeRecognizer),
            EntryExtractor::new(self.spec.extraction.min_id_matches),
        );
        RunCoordinator::new(self.spec.clone(), self.db.clone(), store, pipeline)
    }

    /// Runs one pass, panicking on pass-level failure.
    pub async fn run_once(&self) -> RunReport {
        self.coordinator().run_once().await.expect("pass failed")
    }

    /// Content of a named file in the output folder.
    pub fn processed_file(&self, name: &str) -> Option<Vec<u8>> {
        self.drive.content(PROCESSED, name)
    }

    /// Content of a named file in the output folder as text.
    pub fn processed_text(&self, name: &str) -> Option<String> {
        self.processed_file(name)
            .map(|bytes| String::from_utf8(bytes).expect("artifact is not UTF-8"))
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// A spec pointing at the in-memory folders.
pub fn test_spec() -> JobSpec {
    JobSpec {
        incoming_folder_id: INCOMING.to_string(),
        processed_folder_id: PROCESSED.to_string(),
        credentials_path: "client_secrets.json".into(),
        store_path: None,
        loop_mode: false,
        loop_sleep_seconds: 600,
        max_attempts: 5,
        ocr: OcrSpec::default(),
        extraction: ExtractionSpec::default(),
    }
}
