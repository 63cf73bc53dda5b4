use super::{PageText, PdfTextSource};
use crate::error::{BenchmarkError, Result};
use log::warn;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Text layer extraction through `pdf-extract`. Scanned PDFs yield no text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfExtractSource;

impl PdfTextSource for PdfExtractSource {
    fn page_texts(&self, bytes: &[u8]) -> Result<Vec<PageText>> {
        // pdf-extract panics on some malformed inputs
        let by_pages = catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(bytes)
        }));

        match by_pages {
            Ok(Ok(pages)) => return Ok(pages.into_iter().map(Ok).collect()),
            Ok(Err(e)) => warn!("Per-page PDF extraction failed, retrying whole document: {:?}", e),
            Err(_) => warn!("Per-page PDF extraction panicked, retrying whole document"),
        }

        let whole = catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes)));

        match whole {
            Ok(Ok(text)) => Ok(vec![Ok(text)]),
            Ok(Err(e)) => Err(BenchmarkError::ExtractionFailed(format!(
                "PDF text extraction failed: {:?}",
                e
            ))),
            Err(_) => Err(BenchmarkError::ExtractionFailed(
                "PDF parser aborted on malformed input".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_bytes_are_an_error_not_a_panic() {
        let result = PdfExtractSource.page_texts(b"this is not a pdf");
        assert!(result.is_err());
    }
}
