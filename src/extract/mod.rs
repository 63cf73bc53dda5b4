//! Line-oriented text extraction from PDF statements and benchmark workbooks.
//!
//! Extraction never fails the caller: an unreadable document becomes an
//! empty [`ExtractedDocument`] whose `diagnostics` explain what happened.

pub mod pdf;
pub mod xlsx;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::schema::DocumentKind;
use log::{debug, warn};
use serde::Serialize;

pub use pdf::PdfExtractSource;
pub use xlsx::{CellValue, SheetGrid};

/// Text of one PDF page, or the reason it could not be read.
pub type PageText = std::result::Result<String, String>;

/// Backend that turns PDF bytes into per-page text.
pub trait PdfTextSource: Send + Sync {
    /// Pages in document order. `Err` means the document could not be opened at all.
    fn page_texts(&self, bytes: &[u8]) -> Result<Vec<PageText>>;
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractedDocument {
    pub kind: DocumentKind,
    pub lines: Vec<String>,
    /// Present for spreadsheets only
    pub grid: Option<SheetGrid>,
    pub diagnostics: Vec<String>,
}

impl ExtractedDocument {
    fn empty(kind: DocumentKind) -> Self {
        Self {
            kind,
            lines: Vec::new(),
            grid: None,
            diagnostics: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.grid.as_ref().map_or(true, |g| g.rows.is_empty())
    }

    pub fn full_text(&self) -> String {
        self.lines.join("\n")
    }
}

pub fn split_lines(text: &str) -> impl Iterator<Item = String> + '_ {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
}

pub struct DocumentTextExtractor {
    pdf_source: Box<dyn PdfTextSource>,
    sheet_keywords: Vec<String>,
}

impl DocumentTextExtractor {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            pdf_source: Box::new(PdfExtractSource),
            sheet_keywords: config.sheet_name_keywords.clone(),
        }
    }

    pub fn with_pdf_source(mut self, source: Box<dyn PdfTextSource>) -> Self {
        self.pdf_source = source;
        self
    }

    pub fn extract(&self, bytes: &[u8], kind: DocumentKind) -> ExtractedDocument {
        match kind {
            DocumentKind::Pdf => self.extract_pdf(bytes),
            DocumentKind::Xlsx => self.extract_workbook(bytes),
        }
    }

    /// The selected sheet as a grid, or `None` when the workbook cannot be read.
    pub fn extract_grid(&self, bytes: &[u8]) -> Option<SheetGrid> {
        match xlsx::read_sheet(bytes, &self.sheet_keywords) {
            Ok(grid) => Some(grid),
            Err(e) => {
                warn!("Failed to open workbook: {}", e);
                None
            }
        }
    }

    fn extract_pdf(&self, bytes: &[u8]) -> ExtractedDocument {
        let mut doc = ExtractedDocument::empty(DocumentKind::Pdf);

        let pages = match self.pdf_source.page_texts(bytes) {
            Ok(pages) => pages,
            Err(e) => {
                warn!("Failed to open PDF for financial parsing: {}", e);
                doc.diagnostics.push(e.to_string());
                return doc;
            }
        };

        for (idx, page) in pages.into_iter().enumerate() {
            match page {
                Ok(text) => doc.lines.extend(split_lines(&text)),
                Err(reason) => {
                    warn!("Skipping PDF page {}: {}", idx + 1, reason);
                    doc.diagnostics
                        .push(format!("page {} skipped: {}", idx + 1, reason));
                }
            }
        }

        debug!("Extracted {} lines from PDF", doc.lines.len());
        doc
    }

    fn extract_workbook(&self, bytes: &[u8]) -> ExtractedDocument {
        let mut doc = ExtractedDocument::empty(DocumentKind::Xlsx);

        match xlsx::read_sheet(bytes, &self.sheet_keywords) {
            Ok(grid) => {
                debug!(
                    "Read sheet '{}' with {} rows",
                    grid.name,
                    grid.rows.len()
                );
                doc.lines = grid.to_lines();
                doc.grid = Some(grid);
            }
            Err(e) => {
                warn!("Failed to open workbook: {}", e);
                doc.diagnostics.push(e.to_string());
            }
        }

        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BenchmarkError;

    struct StubPdf(Vec<PageText>);

    impl PdfTextSource for StubPdf {
        fn page_texts(&self, _bytes: &[u8]) -> Result<Vec<PageText>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenPdf;

    impl PdfTextSource for BrokenPdf {
        fn page_texts(&self, _bytes: &[u8]) -> Result<Vec<PageText>> {
            Err(BenchmarkError::ExtractionFailed("not a PDF".to_string()))
        }
    }

    #[test]
    fn test_pages_in_order_and_failed_page_skipped() {
        let extractor = DocumentTextExtractor::new(&EngineConfig::default()).with_pdf_source(
            Box::new(StubPdf(vec![
                Ok("損益計算書\n売上高 100\n".to_string()),
                Err("bad font".to_string()),
                Ok("  \n営業利益 10".to_string()),
            ])),
        );

        let doc = extractor.extract(b"%PDF", DocumentKind::Pdf);
        assert_eq!(doc.lines, vec!["損益計算書", "売上高 100", "営業利益 10"]);
        assert_eq!(doc.diagnostics.len(), 1);
        assert!(doc.diagnostics[0].contains("page 2"));
    }

    #[test]
    fn test_unopenable_pdf_is_empty_not_error() {
        let extractor =
            DocumentTextExtractor::new(&EngineConfig::default()).with_pdf_source(Box::new(BrokenPdf));

        let doc = extractor.extract(b"garbage", DocumentKind::Pdf);
        assert!(doc.is_empty());
        assert_eq!(doc.diagnostics.len(), 1);
    }

    #[test]
    fn test_corrupt_workbook_is_empty_not_error() {
        let extractor = DocumentTextExtractor::new(&EngineConfig::default());
        let doc = extractor.extract(b"definitely not a zip", DocumentKind::Xlsx);
        assert!(doc.is_empty());
        assert!(!doc.diagnostics.is_empty());
        assert!(extractor.extract_grid(b"nope").is_none());
    }
}
