//! Result model for processed bundles.

use serde::{Deserialize, Serialize};

/// Outcome of processing one input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Every page decoded and recognized, at least one entry found.
    Success,
    /// At least one entry found, but some pages failed.
    Partial,
    /// No entry could be recovered.
    Failed,
}

impl RecordStatus {
    /// Whether the record carries entries worth publishing.
    pub fn is_usable(&self) -> bool {
        matches!(self, RecordStatus::Success | RecordStatus::Partial)
    }
}

/// One applicant identity recovered from a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolEntry {
    /// The UCAS personal id printed in the page headers.
    pub applicant_id: String,
    /// Most frequent name seen alongside the id, or `Unknown`.
    pub name: String,
    /// Header matches seen across the whole bundle, all ids included.
    pub total_matches: u32,
    /// Header matches carrying this entry's id.
    pub consistent_matches: u32,
    /// Pages (1-based) where the id matched, sorted.
    pub pages: Vec<u32>,
    /// Where on the first matching page the id was found.
    pub first_seen: Option<BoundingBox>,
}

/// Pixel-space rectangle on a rasterized page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// The structured result of processing one input file.
///
/// Immutable once produced; the aggregate builder consumes these by value
/// and the coordinator caches them verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Remote identifier of the source file.
    pub source_id: String,
    /// Display name of the source file.
    pub source_name: String,
    pub status: RecordStatus,
    pub entries: Vec<PoolEntry>,
    pub pages_total: u32,
    pub pages_failed: u32,
    /// Human-readable failure detail when status is not `success`.
    pub detail: Option<String>,
    /// Name of the anonymised copy published to the output folder.
    pub document_name: String,
    /// Name of the recognized-text artifact.
    pub text_name: String,
}

/// Counters describing one coordinator pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Candidates returned by the folder listing.
    pub listed: u32,
    /// Skipped because already successfully processed.
    pub skipped_done: u32,
    /// Skipped because quarantined.
    pub skipped_quarantined: u32,
    pub succeeded: u32,
    pub partial: u32,
    pub failed: u32,
    /// Files newly quarantined by this pass.
    pub quarantined: u32,
    /// Whether index and summary were (re-)uploaded.
    pub aggregates_uploaded: bool,
}

impl RunReport {
    /// Files this pass attempted to process.
    pub fn attempted(&self) -> u32 {
        self.succeeded + self.partial + self.failed
    }
}
