//! Per-file processing: fetch, rasterize, recognize, extract.

use std::sync::Arc;

use tracing::{debug, info_span, warn};

use crate::drive::{CandidateFile, FolderStore};
use crate::extract::{EntryExtractor, PageFragments};
use crate::ocr::{fragments_to_text, TextRecognizer};
use crate::pdf::PageRenderer;
use crate::record::{Record, RecordStatus};
use crate::sanitize;

/// What processing one candidate produced.
///
/// The record is always present; the source bytes only when the download
/// succeeded, which is what the coordinator needs for publication.
pub struct ProcessOutcome {
    pub record: Record,

    /// The downloaded source document.
    pub pdf_bytes: Option<Vec<u8>>,

    /// Recognized text of all decodable pages, pages separated by blank
    /// lines. Empty when nothing was recognized.
    pub text: String,
}

/// Runs one candidate through download, rasterization, recognition and
/// the extraction grammar.
///
/// Never fails outright: every way a document can be broken degrades the
/// record instead (`partial` or `failed` with a human-readable detail).
pub struct Pipeline {
    store: Arc<dyn FolderStore>,
    renderer: Arc<dyn PageRenderer>,
    recognizer: Arc<dyn TextRecognizer>,
    extractor: EntryExtractor,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn FolderStore>,
        renderer: Arc<dyn PageRenderer>,
        recognizer: Arc<dyn TextRecognizer>,
        extractor: EntryExtractor,
    ) -> Self {
        Self {
            store,
            renderer,
            recognizer,
            extractor,
        }
    }

    pub async fn process(&self, candidate: &CandidateFile) -> ProcessOutcome {
        let display = sanitize::redact_name(&candidate.name);

        let pdf = match self.store.download(&candidate.id).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Download of {} failed: {}", display, e);
                return self.outcome(candidate, None, String::new(), 0, 0, vec![]);
            }
        };

        // Everything past the download is CPU-bound and synchronous.
        let span = info_span!("pipeline.process", file_id = %candidate.id, name = %display);
        let _guard = span.enter();

        let pages_total = {
            let _step = info_span!("decode").entered();
            match self.renderer.page_count(&pdf) {
                Ok(count) => count,
                Err(e) => {
                    warn!("Could not decode {}: {}", display, e);
                    return self.outcome(candidate, Some(pdf), String::new(), 0, 0, vec![]);
                }
            }
        };

        let mut pages = Vec::new();
        let mut page_texts = Vec::new();
        let mut pages_failed = 0u32;

        {
            let _step = info_span!("recognize", pages = pages_total).entered();
            for page in 1..=pages_total {
                match self.recognize_page(&pdf, page) {
                    Ok(fragments) => {
                        page_texts.push(fragments_to_text(&fragments));
                        pages.push(PageFragments { page, fragments });
                    }
                    Err(e) => {
                        warn!("Page {} of {} failed: {}", page, display, e);
                        pages_failed += 1;
                    }
                }
            }
        }

        let entries = {
            let _step = info_span!("extract").entered();
            self.extractor.extract(&pages)
        };

        for entry in &entries {
            debug!(
                "Consistent id {} ({} of {} matches)",
                sanitize::mask_id(&entry.applicant_id),
                entry.consistent_matches,
                entry.total_matches
            );
        }

        drop(_guard);
        self.outcome(
            candidate,
            Some(pdf),
            page_texts.join("\n"),
            pages_total,
            pages_failed,
            entries,
        )
    }

    fn recognize_page(
        &self,
        pdf: &[u8],
        page: u32,
    ) -> Result<Vec<crate::ocr::TextFragment>, crate::error::ProcessError> {
        let raster = self.renderer.render_page(pdf, page)?;
        self.recognizer.recognize(&raster.png)
    }

    fn outcome(
        &self,
        candidate: &CandidateFile,
        pdf_bytes: Option<Vec<u8>>,
        text: String,
        pages_total: u32,
        pages_failed: u32,
        entries: Vec<crate::record::PoolEntry>,
    ) -> ProcessOutcome {
        let (status, detail) =
            classify(pdf_bytes.is_some(), pages_total, pages_failed, entries.len());

        let stem = sanitize::opaque_stem(&candidate.id);
        let record = Record {
            source_id: candidate.id.clone(),
            source_name: candidate.name.clone(),
            status,
            entries,
            pages_total,
            pages_failed,
            detail,
            document_name: format!("{}.pdf", stem),
            text_name: format!("{}.txt", stem),
        };

        ProcessOutcome {
            record,
            pdf_bytes,
            text,
        }
    }
}

/// Maps what happened to a record status and its failure detail.
fn classify(
    downloaded: bool,
    pages_total: u32,
    pages_failed: u32,
    entry_count: usize,
) -> (RecordStatus, Option<String>) {
    if !downloaded {
        return (
            RecordStatus::Failed,
            Some("download failed".to_string()),
        );
    }
    if pages_total == 0 {
        return (
            RecordStatus::Failed,
            Some("unreadable document".to_string()),
        );
    }
    if pages_failed == pages_total {
        return (
            RecordStatus::Failed,
            Some(format!("all {} pages failed to decode", pages_total)),
        );
    }
    if entry_count == 0 {
        let detail = if pages_failed > 0 {
            format!(
                "no consistent applicant id found ({} of {} pages failed)",
                pages_failed, pages_total
            )
        } else {
            "no consistent applicant id found".to_string()
        };
        return (RecordStatus::Failed, Some(detail));
    }
    if pages_failed > 0 {
        return (
            RecordStatus::Partial,
            Some(format!("{} of {} pages failed", pages_failed, pages_total)),
        );
    }
    (RecordStatus::Success, None)
}
