//! The machine-readable summary table.

use crate::error::ProcessError;

use super::ReportRow;

/// Fixed column order of `summary.csv`.
const HEADER: &[&str] = &[
    "ucas_personal_id",
    "name",
    "consistent_matches",
    "total_matches",
    "pages",
    "source_file",
    "document",
];

/// Renders the summary CSV: one row per entry, sorted by
/// (applicant id, source file) so the bytes are stable.
pub fn render_summary(rows: &[ReportRow]) -> Result<Vec<u8>, ProcessError> {
    let mut sorted: Vec<&ReportRow> = rows.iter().collect();
    sorted.sort_by(|a, b| {
        (&a.applicant_id, &a.source_file).cmp(&(&b.applicant_id, &b.source_file))
    });

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(HEADER)
        .map_err(|e| ProcessError::Render(e.to_string()))?;

    for row in sorted {
        let pages = row
            .pages
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        writer
            .write_record([
                row.applicant_id.as_str(),
                row.name.as_str(),
                &row.consistent_matches.to_string(),
                &row.total_matches.to_string(),
                &pages,
                row.source_file.as_str(),
                row.document.as_str(),
            ])
            .map_err(|e| ProcessError::Render(e.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|e| ProcessError::Render(e.to_string()))
}
