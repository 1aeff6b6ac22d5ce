//! In-memory fakes for the pipeline's trait seams.
//!
//! `MemStore` mimics the remote drive, including the full-replace
//! semantics of `upsert_by_name`, and records every write so tests can
//! assert how often an artifact was published. The renderer and
//! recognizer fakes treat the "PDF" bytes as plain text fixtures with
//! pages separated by form feeds.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;

use pooldex::drive::{CandidateFile, DriveError, FolderStore};
use pooldex::error::ProcessError;
use pooldex::ocr::{TextFragment, TextRecognizer};
use pooldex::pdf::{PageRaster, PageRenderer};
use pooldex::record::BoundingBox;

/// Marker page content that makes the fake renderer fail that page.
pub const FAIL_PAGE: &str = "!fail";

/// A file held by the in-memory drive.
#[derive(Debug, Clone)]
pub struct MemFile {
    pub folder_id: String,
    pub name: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Upload,
    Replace,
}

/// One write against the drive, kept for at-most-once assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteEvent {
    pub kind: WriteKind,
    pub name: String,
}

/// In-memory drive.
///
/// `list_folder` returns files in seeding order, not sorted, so tests
/// can exercise order-independence of everything downstream.
#[derive(Default)]
pub struct MemStore {
    files: Mutex<HashMap<String, MemFile>>,
    /// File ids in insertion order.
    order: Mutex<Vec<String>>,
    writes: Mutex<Vec<WriteEvent>>,
    /// Remaining forced download failures per file id.
    download_failures: Mutex<HashMap<String, u32>>,
    /// Remaining forced upload failures per file name.
    upload_failures: Mutex<HashMap<String, u32>>,
    next_upload_id: AtomicU64,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file and returns its id. The id is derived from the name
    /// so the same bundle gets the same id in every harness.
    pub fn seed(&self, folder_id: &str, name: &str, content: &[u8]) -> String {
        let id = format!("seed-{}", name);
        self.insert(
            MemFile {
                folder_id: folder_id.to_string(),
                name: name.to_string(),
                mime_type: "application/pdf".to_string(),
                content: content.to_vec(),
            },
            id.clone(),
        );
        id
    }

    /// Makes the next `count` downloads of `file_id` fail.
    pub fn fail_downloads(&self, file_id: &str, count: u32) {
        self.download_failures
            .lock()
            .unwrap()
            .insert(file_id.to_string(), count);
    }

    /// Makes the next `count` uploads of `name` fail.
    pub fn fail_uploads(&self, name: &str, count: u32) {
        self.upload_failures
            .lock()
            .unwrap()
            .insert(name.to_string(), count);
    }

    /// Content of a named file within a folder.
    pub fn content(&self, folder_id: &str, name: &str) -> Option<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .values()
            .find(|f| f.folder_id == folder_id && f.name == name)
            .map(|f| f.content.clone())
    }

    /// MIME type of a named file within a folder.
    pub fn mime_type(&self, folder_id: &str, name: &str) -> Option<String> {
        self.files
            .lock()
            .unwrap()
            .values()
            .find(|f| f.folder_id == folder_id && f.name == name)
            .map(|f| f.mime_type.clone())
    }

    /// Sorted names of all files within a folder.
    pub fn names(&self, folder_id: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .files
            .lock()
            .unwrap()
            .values()
            .filter(|f| f.folder_id == folder_id)
            .map(|f| f.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Number of writes (uploads plus replaces) recorded for a name.
    pub fn writes_for(&self, name: &str) -> usize {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.name == name)
            .count()
    }

    fn insert(&self, file: MemFile, id: String) {
        self.files.lock().unwrap().insert(id.clone(), file);
        self.order.lock().unwrap().push(id);
    }

    fn record_write(&self, kind: WriteKind, name: &str) {
        self.writes.lock().unwrap().push(WriteEvent {
            kind,
            name: name.to_string(),
        });
    }

    /// Decrements a failure budget, returning whether to fail this call.
    fn take_failure(map: &Mutex<HashMap<String, u32>>, key: &str) -> bool {
        let mut map = map.lock().unwrap();
        match map.get_mut(key) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    fn injected(operation: &'static str) -> DriveError {
        DriveError::Api {
            operation,
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: "injected failure".to_string(),
        }
    }
}

#[async_trait]
impl FolderStore for MemStore {
    async fn list_folder(&self, folder_id: &str) -> pooldex::drive::Result<Vec<CandidateFile>> {
        let files = self.files.lock().unwrap();
        let order = self.order.lock().unwrap();
        Ok(order
            .iter()
            .filter_map(|id| files.get(id).map(|f| (id, f)))
            .filter(|(_, f)| f.folder_id == folder_id)
            .map(|(id, f)| CandidateFile {
                id: id.clone(),
                name: f.name.clone(),
                md5: None,
                modified_at: None,
                discovered_at: Utc::now(),
            })
            .collect())
    }

    async fn download(&self, file_id: &str) -> pooldex::drive::Result<Vec<u8>> {
        if Self::take_failure(&self.download_failures, file_id) {
            return Err(Self::injected("drive.download"));
        }
        self.files
            .lock()
            .unwrap()
            .get(file_id)
            .map(|f| f.content.clone())
            .ok_or_else(|| DriveError::Api {
                operation: "drive.download",
                status: StatusCode::NOT_FOUND,
                body: "no such file".to_string(),
            })
    }

    async fn upload(
        &self,
        folder_id: &str,
        name: &str,
        mime_type: &str,
        content: &[u8],
    ) -> pooldex::drive::Result<String> {
        if Self::take_failure(&self.upload_failures, name) {
            return Err(Self::injected("drive.upload"));
        }
        let id = format!("up-{}", self.next_upload_id.fetch_add(1, Ordering::SeqCst));
        self.insert(
            MemFile {
                folder_id: folder_id.to_string(),
                name: name.to_string(),
                mime_type: mime_type.to_string(),
                content: content.to_vec(),
            },
            id.clone(),
        );
        self.record_write(WriteKind::Upload, name);
        Ok(id)
    }

    async fn find_by_name(
        &self,
        folder_id: &str,
        name: &str,
    ) -> pooldex::drive::Result<Option<String>> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .find(|(_, f)| f.folder_id == folder_id && f.name == name)
            .map(|(id, _)| id.clone()))
    }

    async fn replace(
        &self,
        file_id: &str,
        mime_type: &str,
        content: &[u8],
    ) -> pooldex::drive::Result<()> {
        let mut files = self.files.lock().unwrap();
        let file = files.get_mut(file_id).ok_or_else(|| DriveError::Api {
            operation: "drive.replace",
            status: StatusCode::NOT_FOUND,
            body: "no such file".to_string(),
        })?;
        file.mime_type = mime_type.to_string();
        file.content = content.to_vec();
        let name = file.name.clone();
        drop(files);
        self.record_write(WriteKind::Replace, &name);
        Ok(())
    }
}

/// Treats the "pdf" as fixture text: pages separated by form feeds.
pub struct FakeRenderer;

impl FakeRenderer {
    fn pages(pdf: &[u8]) -> Result<Vec<String>, ProcessError> {
        let text = String::from_utf8(pdf.to_vec())
            .map_err(|_| ProcessError::PdfLoad("not a fixture".to_string()))?;
        if text == "corrupt" {
            return Err(ProcessError::PdfLoad("corrupt fixture".to_string()));
        }
        Ok(text.split('\x0c').map(|s| s.to_string()).collect())
    }
}

impl PageRenderer for FakeRenderer {
    fn page_count(&self, pdf: &[u8]) -> Result<u32, ProcessError> {
        Ok(Self::pages(pdf)?.len() as u32)
    }

    fn render_page(&self, pdf: &[u8], page: u32) -> Result<PageRaster, ProcessError> {
        let pages = Self::pages(pdf)?;
        let content = &pages[(page - 1) as usize];
        if content == FAIL_PAGE {
            return Err(ProcessError::PageRender {
                page,
                reason: "fixture says fail".to_string(),
            });
        }
        Ok(PageRaster {
            page,
            png: content.clone().into_bytes(),
        })
    }
}

/// Turns each fixture line into one recognized fragment.
pub struct FakeRecognizer;

impl TextRecognizer for FakeRecognizer {
    fn recognize(&self, png: &[u8]) -> Result<Vec<TextFragment>, ProcessError> {
        let text = String::from_utf8_lossy(png);
        Ok(text
            .lines()
            .enumerate()
            .map(|(i, line)| TextFragment {
                text: line.to_string(),
                bbox: BoundingBox {
                    x: 50,
                    y: 40 + (i as u32) * 12,
                    width: 500,
                    height: 10,
                },
            })
            .collect())
    }
}
