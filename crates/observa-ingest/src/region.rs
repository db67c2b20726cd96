//! Region-to-text extraction.
//!
//! The PDF backend is abstracted behind [`PageTextSource`]; this module owns
//! the coordinate rescaling from canvas pixels to PDF points and the
//! multi-page scan that tolerates individual page failures.

use observa_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Axis-aligned rectangle `(x0, y0)`–`(x1, y1)`, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BoundingBox {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }
}

/// Width and height of a coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
}

/// Box covering a rectangle drawn on the canvas.
pub fn canvas_rect_to_bbox(left: f64, top: f64, width: f64, height: f64) -> BoundingBox {
    BoundingBox::new(left, top, left + width, top + height)
}

/// Rescale a box from canvas pixels into PDF points.
pub fn scale_bbox_to_pdf(
    bbox: BoundingBox,
    canvas: Dimensions,
    pdf: Dimensions,
) -> Result<BoundingBox> {
    if canvas.width <= 0.0 || canvas.height <= 0.0 {
        return Err(Error::Extraction(format!(
            "Invalid canvas dimensions {}x{}",
            canvas.width, canvas.height
        )));
    }
    let sx = pdf.width / canvas.width;
    let sy = pdf.height / canvas.height;
    Ok(BoundingBox::new(
        bbox.x0 * sx,
        bbox.y0 * sy,
        bbox.x1 * sx,
        bbox.y1 * sy,
    ))
}

/// Which pages to read the region from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractMode {
    /// Only the given zero-based page.
    CurrentPage(usize),
    /// The same region on every page.
    AllPages,
}

/// A paged document able to return the text inside a region of a page.
pub trait PageTextSource {
    fn page_count(&self) -> usize;

    /// Text within `bbox` (PDF points) on a zero-based page. Empty when the
    /// region holds no text.
    fn extract_page_region(&self, page: usize, bbox: BoundingBox) -> Result<String>;
}

/// Extract the region's text, joining non-blank pages with a blank line.
///
/// A page that fails to extract is logged and skipped; the scan carries on.
pub fn extract_region_text(
    doc: &dyn PageTextSource,
    bbox: BoundingBox,
    mode: ExtractMode,
) -> String {
    let pages: Vec<usize> = match mode {
        ExtractMode::CurrentPage(page) => vec![page],
        ExtractMode::AllPages => (0..doc.page_count()).collect(),
    };

    let mut texts = Vec::new();
    for page in pages {
        match doc.extract_page_region(page, bbox) {
            Ok(text) if !text.trim().is_empty() => texts.push(text),
            Ok(_) => {}
            Err(e) => warn!("Error extracting text from page {}: {}", page + 1, e),
        }
    }

    debug!("Extracted text from {} pages", texts.len());
    texts.join("\n\n")
}

/// Pre-extracted text split into pages on form feeds, as `pdftotext` emits.
///
/// Text has no geometry here, so the region always covers the whole page.
#[derive(Debug, Clone, Default)]
pub struct PlainTextDocument {
    pages: Vec<String>,
}

impl PlainTextDocument {
    pub fn new(text: &str) -> Self {
        let mut pages: Vec<String> = text.split('\x0c').map(str::to_string).collect();
        // pdftotext terminates the last page with a form feed too.
        if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
            pages.pop();
        }
        Self { pages }
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::new(&text))
    }
}

impl PageTextSource for PlainTextDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn extract_page_region(&self, page: usize, _bbox: BoundingBox) -> Result<String> {
        self.pages
            .get(page)
            .cloned()
            .ok_or_else(|| Error::Extraction(format!("Page {} out of range", page + 1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlakyDoc;

    impl PageTextSource for FlakyDoc {
        fn page_count(&self) -> usize {
            4
        }

        fn extract_page_region(&self, page: usize, _bbox: BoundingBox) -> Result<String> {
            match page {
                0 => Ok("1.1. OBSERVACIÓN uno".into()),
                1 => Err(Error::Extraction("corrupt content stream".into())),
                2 => Ok("   \n".into()),
                _ => Ok("1.2. OBSERVACIÓN dos".into()),
            }
        }
    }

    fn full_page() -> BoundingBox {
        BoundingBox::new(0.0, 0.0, 612.0, 792.0)
    }

    #[test]
    fn test_canvas_rect_then_scale() {
        let bbox = canvas_rect_to_bbox(100.0, 50.0, 200.0, 100.0);
        assert_eq!(bbox, BoundingBox::new(100.0, 50.0, 300.0, 150.0));
        let scaled = scale_bbox_to_pdf(
            bbox,
            Dimensions { width: 800.0, height: 1000.0 },
            Dimensions { width: 400.0, height: 500.0 },
        )
        .unwrap();
        assert_eq!(scaled, BoundingBox::new(50.0, 25.0, 150.0, 75.0));
        assert_eq!(scaled.width(), 100.0);
        assert_eq!(scaled.height(), 50.0);
    }

    #[test]
    fn test_scale_bbox_rejects_empty_canvas() {
        let result = scale_bbox_to_pdf(
            full_page(),
            Dimensions { width: 0.0, height: 10.0 },
            Dimensions { width: 400.0, height: 500.0 },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_all_pages_skips_failures_and_blanks() {
        let text = extract_region_text(&FlakyDoc, full_page(), ExtractMode::AllPages);
        assert_eq!(text, "1.1. OBSERVACIÓN uno\n\n1.2. OBSERVACIÓN dos");
    }

    #[test]
    fn test_current_page_only() {
        let text = extract_region_text(&FlakyDoc, full_page(), ExtractMode::CurrentPage(3));
        assert_eq!(text, "1.2. OBSERVACIÓN dos");

        let failed = extract_region_text(&FlakyDoc, full_page(), ExtractMode::CurrentPage(1));
        assert!(failed.is_empty());
    }

    #[test]
    fn test_plain_text_document_pages() {
        let doc = PlainTextDocument::new("página uno\x0cpágina dos\x0c");
        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.extract_page_region(1, full_page()).unwrap(), "página dos");
        assert!(doc.extract_page_region(2, full_page()).is_err());
    }
}
