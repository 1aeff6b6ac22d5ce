//! Aggregate outputs: the summary table and the index document.
//!
//! Both artifacts are rebuilt from the full record history and uploaded
//! as whole files, so they must come out byte-identical for an identical
//! record set no matter what order processing happened in. Rows are
//! sorted before rendering and nothing time-dependent is written.

use crate::error::ProcessError;
use crate::record::Record;

pub mod index;
pub mod summary;

/// Name of the index document in the output folder.
pub const INDEX_NAME: &str = "index.pdf";

/// Name of the summary table in the output folder.
pub const SUMMARY_NAME: &str = "summary.csv";

/// One entry flattened with its source attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub applicant_id: String,
    pub name: String,
    pub consistent_matches: u32,
    pub total_matches: u32,
    pub pages: Vec<u32>,
    /// Display name of the bundle the entry came from.
    pub source_file: String,
    /// Opaque name of the published copy.
    pub document: String,
}

/// The pair of rendered aggregate artifacts.
#[derive(Debug, Clone)]
pub struct AggregateOutputs {
    pub index_pdf: Vec<u8>,
    pub summary_csv: Vec<u8>,
}

/// Renders both aggregates from the given record set.
///
/// Failed records contribute nothing; success and partial records
/// contribute one row per entry.
pub fn build(records: &[Record]) -> Result<AggregateOutputs, ProcessError> {
    let rows = collect_rows(records);
    Ok(AggregateOutputs {
        index_pdf: index::render_index(&rows)?,
        summary_csv: summary::render_summary(&rows)?,
    })
}

fn collect_rows(records: &[Record]) -> Vec<ReportRow> {
    let mut rows = Vec::new();
    for record in records {
        if !record.status.is_usable() {
            continue;
        }
        for entry in &record.entries {
            rows.push(ReportRow {
                applicant_id: entry.applicant_id.clone(),
                name: entry.name.clone(),
                consistent_matches: entry.consistent_matches,
                total_matches: entry.total_matches,
                pages: entry.pages.clone(),
                source_file: record.source_name.clone(),
                document: record.document_name.clone(),
            });
        }
    }
    rows
}
