//! PDF page rasterization.
//!
//! Scanned bundles carry no usable text layer, so every page goes through
//! raster rendering before recognition. Rendering shells out to
//! poppler-utils (`pdftoppm`, `pdfinfo`), which handles far more PDF
//! variants than pure-Rust parsers.

use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, warn};

use crate::error::ProcessError;

/// A single page rendered to a PNG raster.
#[derive(Debug, Clone)]
pub struct PageRaster {
    /// 1-based page number within the source document.
    pub page: u32,

    /// PNG-encoded image data.
    pub png: Vec<u8>,
}

/// Renders document pages to raster images for recognition.
///
/// Page numbers are 1-based. Implementations must let a single bad page
/// fail without poisoning the rest of the document.
pub trait PageRenderer: Send + Sync {
    /// Returns the number of pages in the document.
    fn page_count(&self, pdf: &[u8]) -> Result<u32, ProcessError>;

    /// Renders one page to a PNG raster.
    fn render_page(&self, pdf: &[u8], page: u32) -> Result<PageRaster, ProcessError>;
}

/// Renderer backed by poppler-utils.
pub struct PopplerRenderer {
    dpi: u32,
}

impl PopplerRenderer {
    pub fn new(dpi: u32) -> Self {
        Self { dpi }
    }

    /// Writes the document to a uniquely named temp file for the poppler
    /// tools, which only read from paths.
    fn write_temp_pdf(&self, pdf: &[u8], tag: &str) -> Result<PathBuf, ProcessError> {
        let path = std::env::temp_dir().join(format!("pooldex_{}_{}.pdf", tag, uuid::Uuid::new_v4()));
        std::fs::write(&path, pdf)
            .map_err(|e| ProcessError::PdfLoad(format!("Failed to write temp PDF: {}", e)))?;
        Ok(path)
    }

    /// Page count via pdfinfo, for documents lopdf cannot parse.
    fn page_count_fallback(&self, pdf: &[u8]) -> Result<u32, ProcessError> {
        let pdf_path = self.write_temp_pdf(pdf, "pagecount")?;

        let output = Command::new("pdfinfo").arg(&pdf_path).output().map_err(|e| {
            let _ = std::fs::remove_file(&pdf_path);
            ProcessError::PdfLoad(format!(
                "Failed to run pdfinfo: {}. Make sure poppler-utils is installed.",
                e
            ))
        })?;

        let _ = std::fs::remove_file(&pdf_path);

        if !output.status.success() {
            return Err(ProcessError::PdfLoad(format!(
                "pdfinfo failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_pdfinfo_page_count(&stdout).unwrap_or(1))
    }
}

impl PageRenderer for PopplerRenderer {
    fn page_count(&self, pdf: &[u8]) -> Result<u32, ProcessError> {
        match lopdf::Document::load_mem(pdf) {
            Ok(doc) => Ok(doc.get_pages().len() as u32),
            Err(e) => {
                // Scanner output regularly trips lopdf (bad xref tables).
                // pdfinfo copes with those.
                warn!("lopdf failed to parse document: {}. Falling back to pdfinfo.", e);
                self.page_count_fallback(pdf)
            }
        }
    }

    fn render_page(&self, pdf: &[u8], page: u32) -> Result<PageRaster, ProcessError> {
        let pdf_path = self.write_temp_pdf(pdf, "render").map_err(|e| {
            ProcessError::PageRender {
                page,
                reason: e.to_string(),
            }
        })?;
        let output_prefix =
            std::env::temp_dir().join(format!("pooldex_page_{}", uuid::Uuid::new_v4()));

        let output = Command::new("pdftoppm")
            .args(["-png", "-r", &self.dpi.to_string()])
            .args(["-f", &page.to_string(), "-l", &page.to_string()])
            .arg(&pdf_path)
            .arg(&output_prefix)
            .output();

        let _ = std::fs::remove_file(&pdf_path);

        let output = output.map_err(|e| ProcessError::PageRender {
            page,
            reason: format!(
                "Failed to run pdftoppm: {}. Make sure poppler-utils is installed.",
                e
            ),
        })?;

        if !output.status.success() {
            return Err(ProcessError::PageRender {
                page,
                reason: format!("pdftoppm failed: {}", String::from_utf8_lossy(&output.stderr)),
            });
        }

        // pdftoppm pads the page suffix to the width of the document's
        // last page number.
        let candidates = [
            format!("{}-{}.png", output_prefix.display(), page),
            format!("{}-{:02}.png", output_prefix.display(), page),
            format!("{}-{:03}.png", output_prefix.display(), page),
            format!("{}-{:04}.png", output_prefix.display(), page),
        ];
        let image_path = candidates
            .iter()
            .find(|p| Path::new(p).exists())
            .ok_or_else(|| ProcessError::PageRender {
                page,
                reason: "Rendered page image not found".to_string(),
            })?;

        let png = std::fs::read(image_path).map_err(|e| ProcessError::PageRender {
            page,
            reason: format!("Failed to read rendered image: {}", e),
        })?;
        let _ = std::fs::remove_file(image_path);

        debug!("Rendered page {} at {} dpi ({} bytes)", page, self.dpi, png.len());
        Ok(PageRaster { page, png })
    }
}

/// Pulls the `Pages:` line out of pdfinfo output.
fn parse_pdfinfo_page_count(stdout: &str) -> Option<u32> {
    stdout.lines().find_map(|line| {
        line.strip_prefix("Pages:")
            .and_then(|rest| rest.trim().parse::<u32>().ok())
    })
}
