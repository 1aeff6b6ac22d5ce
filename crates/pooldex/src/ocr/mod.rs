//! Text recognition for rasterized pages.

use std::io::Cursor;
use std::sync::Arc;

use crate::error::ProcessError;
use crate::record::BoundingBox;

pub mod hocr;

/// One recognized line of text with its position on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFragment {
    pub text: String,
    pub bbox: BoundingBox,
}

/// Turns a page raster into positioned text fragments.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, png: &[u8]) -> Result<Vec<TextFragment>, ProcessError>;
}

/// Recognizer backed by Tesseract through leptess.
///
/// Requests hOCR output instead of plain text so line geometry survives
/// into the fragments.
#[derive(Clone)]
pub struct TesseractRecognizer {
    inner: Arc<TesseractInner>,
}

struct TesseractInner {
    languages: String,
}

impl TesseractRecognizer {
    pub fn new(languages: &[String]) -> Self {
        let lang_str = if languages.is_empty() {
            "eng".to_string()
        } else {
            languages.join("+")
        };

        Self {
            inner: Arc::new(TesseractInner {
                languages: lang_str,
            }),
        }
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(&self, png: &[u8]) -> Result<Vec<TextFragment>, ProcessError> {
        let _span = tracing::info_span!("ocr.recognize").entered();

        let img = image::load_from_memory(png)
            .map_err(|e| ProcessError::ImageDecode(format!("Failed to load image: {}", e)))?;

        // Re-encode to PNG in memory; normalizes whatever the renderer
        // produced into a form leptess always accepts.
        let mut png_data = Vec::new();
        let mut cursor = Cursor::new(&mut png_data);
        img.write_to(&mut cursor, image::ImageFormat::Png)
            .map_err(|e| ProcessError::ImageDecode(format!("Failed to convert image: {}", e)))?;

        let mut lt = leptess::LepTess::new(None, &self.inner.languages).map_err(|e| {
            ProcessError::OcrFailed(format!("Failed to initialize Tesseract: {}", e))
        })?;

        lt.set_image_from_mem(&png_data)
            .map_err(|e| ProcessError::OcrFailed(format!("Failed to set image for OCR: {}", e)))?;

        let hocr = lt
            .get_hocr_text(0)
            .map_err(|e| ProcessError::OcrFailed(format!("OCR failed: {}", e)))?;

        hocr::parse_hocr(&hocr)
    }
}

/// Joins fragments back into plain text, one line per fragment.
///
/// This is the content of the published `.txt` artifact, so the output
/// depends only on the fragments themselves.
pub fn fragments_to_text(fragments: &[TextFragment]) -> String {
    let mut text = String::new();
    for fragment in fragments {
        text.push_str(&fragment.text);
        text.push('\n');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognizer_language_joining() {
        let recognizer = TesseractRecognizer::new(&["eng".to_string(), "deu".to_string()]);
        assert_eq!(recognizer.inner.languages, "eng+deu");
    }

    #[test]
    fn test_recognizer_default_language() {
        let recognizer = TesseractRecognizer::new(&[]);
        assert_eq!(recognizer.inner.languages, "eng");
    }

    #[test]
    fn test_invalid_image_data_error() {
        let recognizer = TesseractRecognizer::new(&["eng".to_string()]);
        let result = recognizer.recognize(b"not valid image data");

        assert!(matches!(result, Err(ProcessError::ImageDecode(_))));
    }

    #[test]
    fn test_fragments_to_text() {
        let zero = BoundingBox {
            x: 0,
            y: 0,
            width: 0,
            height: 0,
        };
        let fragments = vec![
            TextFragment {
                text: "UCAS Personal ID: 123".to_string(),
                bbox: zero,
            },
            TextFragment {
                text: "Jane Bloggs".to_string(),
                bbox: zero,
            },
        ];

        assert_eq!(
            fragments_to_text(&fragments),
            "UCAS Personal ID: 123\nJane Bloggs\n"
        );
        assert_eq!(fragments_to_text(&[]), "");
    }
}
