//! Parser for Tesseract's hOCR output.
//!
//! hOCR is XHTML with layout classes; recognized text sits in nested
//! `<span>` elements and geometry lives in `title` attributes
//! (`title="bbox x0 y0 x1 y1; ..."`). The recognizer works line by line,
//! so only line-level elements become fragments here.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::ProcessError;
use crate::record::BoundingBox;

use super::TextFragment;

/// hOCR classes that represent a single line of text.
const LINE_CLASSES: &[&str] = &["ocr_line", "ocr_header", "ocr_caption", "ocr_textfloat"];

struct LineBuilder {
    bbox: BoundingBox,
    words: Vec<String>,
}

/// Parses hOCR markup into line fragments, in document order.
pub fn parse_hocr(hocr: &str) -> Result<Vec<TextFragment>, ProcessError> {
    let mut reader = Reader::from_str(hocr);
    reader.config_mut().trim_text(true);

    let mut fragments = Vec::new();
    let mut line: Option<LineBuilder> = None;
    let mut depth_in_line = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                if line.is_some() {
                    depth_in_line += 1;
                } else if is_line_element(e)? {
                    line = Some(LineBuilder {
                        bbox: element_bbox(e)?.unwrap_or(BoundingBox {
                            x: 0,
                            y: 0,
                            width: 0,
                            height: 0,
                        }),
                        words: Vec::new(),
                    });
                    depth_in_line = 0;
                }
            }
            Ok(Event::End(_)) => {
                if depth_in_line > 0 {
                    depth_in_line -= 1;
                } else if let Some(builder) = line.take() {
                    let text = builder.words.join(" ");
                    if !text.is_empty() {
                        fragments.push(TextFragment {
                            text,
                            bbox: builder.bbox,
                        });
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(ref mut builder) = line {
                    let decoded = e.unescape().map_err(|err| {
                        ProcessError::RecognitionParse(format!("bad text node: {}", err))
                    })?;
                    let word = decoded.trim();
                    if !word.is_empty() {
                        builder.words.push(word.to_string());
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ProcessError::RecognitionParse(format!(
                    "XML parsing error: {}",
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(fragments)
}

fn is_line_element(e: &BytesStart) -> Result<bool, ProcessError> {
    let Some(class) = attribute_value(e, "class")? else {
        return Ok(false);
    };
    Ok(class
        .split_whitespace()
        .any(|c| LINE_CLASSES.contains(&c)))
}

/// Reads the `bbox x0 y0 x1 y1` clause from an element's title attribute.
fn element_bbox(e: &BytesStart) -> Result<Option<BoundingBox>, ProcessError> {
    let Some(title) = attribute_value(e, "title")? else {
        return Ok(None);
    };
    Ok(parse_bbox_title(&title))
}

fn attribute_value(e: &BytesStart, name: &str) -> Result<Option<String>, ProcessError> {
    let attribute = e.try_get_attribute(name).map_err(|err| {
        ProcessError::RecognitionParse(format!("bad attribute '{}': {}", name, err))
    })?;
    match attribute {
        Some(attr) => {
            let value = attr.unescape_value().map_err(|err| {
                ProcessError::RecognitionParse(format!("bad attribute value '{}': {}", name, err))
            })?;
            Ok(Some(value.into_owned()))
        }
        None => Ok(None),
    }
}

fn parse_bbox_title(title: &str) -> Option<BoundingBox> {
    let coords = title
        .split(';')
        .find_map(|clause| clause.trim().strip_prefix("bbox "))?;

    let mut nums = coords.split_whitespace().map(str::parse::<u32>);
    let x0 = nums.next()?.ok()?;
    let y0 = nums.next()?.ok()?;
    let x1 = nums.next()?.ok()?;
    let y1 = nums.next()?.ok()?;

    Some(BoundingBox {
        x: x0,
        y: y0,
        width: x1.saturating_sub(x0),
        height: y1.saturating_sub(y0),
    })
}
