//! The human-readable index document.
//!
//! A plain Courier listing, one line per entry, sorted for shelf lookup
//! by surname. Typeset directly with lopdf so the bytes depend on the
//! entry set alone.

use lopdf::{dictionary, Document, Object, Stream};

use crate::error::ProcessError;

use super::ReportRow;

// US Letter in points
const PAGE_WIDTH: i64 = 612;
const PAGE_HEIGHT: i64 = 792;

const LINES_PER_PAGE: usize = 54;

const NAME_WIDTH: usize = 28;
const ID_WIDTH: usize = 12;
const SOURCE_WIDTH: usize = 24;

/// Renders the index PDF from the given rows.
pub fn render_index(rows: &[ReportRow]) -> Result<Vec<u8>, ProcessError> {
    let mut sorted: Vec<&ReportRow> = rows.iter().collect();
    sorted.sort_by(|a, b| {
        (surname_key(&a.name), &a.applicant_id, &a.source_file)
            .cmp(&(surname_key(&b.name), &b.applicant_id, &b.source_file))
    });

    let mut lines = Vec::with_capacity(sorted.len() + 3);
    lines.push("Winter Pool Index".to_string());
    lines.push(format!("{} entries", sorted.len()));
    lines.push(String::new());
    for row in sorted {
        lines.push(format_line(row));
    }

    build_pdf(&lines)
}

/// Sort key for the listing: last whitespace-separated word of the
/// name, case-folded.
fn surname_key(name: &str) -> String {
    name.split_whitespace()
        .last()
        .unwrap_or("")
        .to_lowercase()
}

fn format_line(row: &ReportRow) -> String {
    format!(
        "{} {} {} {}",
        clamp_pad(&row.name, NAME_WIDTH),
        clamp_pad(&row.applicant_id, ID_WIDTH),
        clamp_pad(&row.source_file, SOURCE_WIDTH),
        row.document
    )
}

/// Truncates to `width` characters, then right-pads with spaces.
fn clamp_pad(s: &str, width: usize) -> String {
    let truncated: String = s.chars().take(width).collect();
    format!("{:<width$}", truncated, width = width)
}

fn build_pdf(lines: &[String]) -> Result<Vec<u8>, ProcessError> {
    let mut doc = Document::with_version("1.5");

    let pages_id = doc.new_object_id();
    let font_id = doc.new_object_id();
    let resources_id = doc.new_object_id();

    doc.objects.insert(
        font_id,
        Object::Dictionary(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        }),
    );

    doc.objects.insert(
        resources_id,
        Object::Dictionary(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        }),
    );

    // An empty listing still gets one (blank) page so the document is
    // well formed.
    let empty: &[String] = &[];
    let chunks: Vec<&[String]> = if lines.is_empty() {
        vec![empty]
    } else {
        lines.chunks(LINES_PER_PAGE).collect()
    };

    let mut kids: Vec<Object> = Vec::new();
    for chunk in &chunks {
        let content = format_page_content(chunk);
        let content_id =
            doc.add_object(Object::Stream(Stream::new(dictionary! {}, content.into_bytes())));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                0.into(),
                0.into(),
                PAGE_WIDTH.into(),
                PAGE_HEIGHT.into(),
            ],
            "Resources" => resources_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| ProcessError::Render(e.to_string()))?;

    Ok(buffer)
}

fn format_page_content(lines: &[String]) -> String {
    let mut content = String::new();
    content.push_str("BT\n");
    content.push_str("/F1 10 Tf\n");
    content.push_str("50 742 Td\n");
    content.push_str("12 TL\n");

    for line in lines {
        let escaped = escape_pdf_string(line);
        content.push_str(&format!("({}) Tj T*\n", escaped));
    }

    content.push_str("ET\n");
    content
}

fn escape_pdf_string(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '(' => "\\(".to_string(),
            ')' => "\\)".to_string(),
            '\\' => "\\\\".to_string(),
            c if c.is_ascii() && !c.is_control() => c.to_string(),
            _ => " ".to_string(),
        })
        .collect()
}
