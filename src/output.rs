//! Result types: per-page results, document statistics, conversion output.

use crate::config::OutputFormat;
use crate::error::PageError;
use crate::pipeline::scan::ScanStatus;
use crate::pipeline::source::DocumentInfo;
use serde::{Deserialize, Serialize};

/// A table as extracted from a page: rows of cells, every row the same width.
pub type Table = Vec<Vec<String>>;

/// An embedded image after decode and re-encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedImage {
    /// Encoded bytes (JPEG).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub mime_type: &'static str,
}

/// Everything extracted from one page.
///
/// Produced exactly once per selected page, whatever happened while
/// extracting it, and never mutated after the processor hands it over.
#[derive(Debug, Clone, Default)]
pub struct PageResult {
    /// 0-indexed page.
    pub index: usize,
    /// Native text, followed by OCR text when OCR is enabled.
    pub text: String,
    pub tables: Vec<Table>,
    pub images: Vec<ExtractedImage>,
    /// Images successfully decoded and re-encoded; equals `images.len()`.
    pub images_converted: usize,
    /// Image objects found on the page, converted or not.
    pub images_attempted: usize,
    /// Set when the page as a whole could not be extracted; the payload is empty.
    pub error: Option<PageError>,
    /// Item-level failures that did not stop the page.
    pub warnings: Vec<PageError>,
}

impl PageResult {
    /// An empty result for a page that failed as a whole.
    pub fn failed(index: usize, error: PageError) -> Self {
        Self {
            index,
            error: Some(error),
            ..Default::default()
        }
    }

    /// 1-indexed page number.
    pub fn page_num(&self) -> usize {
        self.index + 1
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }

    /// Number of content blocks this page contributes to the output document.
    pub fn block_count(&self) -> usize {
        usize::from(self.has_text()) + self.tables.len() + self.images.len()
    }
}

/// Counters accumulated while assembling the output document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Pages merged into the output, one per selected page.
    pub pages: usize,
    /// Image blocks emitted.
    pub images: usize,
    /// Table blocks emitted.
    pub tables: usize,
    /// Paragraph blocks emitted (one per page with non-blank text).
    pub text_blocks: usize,
    /// Pages whose result carries a page-level error.
    pub failed_pages: usize,
    /// Item-level failures across all pages.
    pub warnings: usize,
    /// Wall-clock time of the page-processing stage.
    pub processing_duration_ms: u64,
    /// Wall-clock time of the whole conversion.
    pub total_duration_ms: u64,
}

/// A serialisable digest of one [`PageResult`], without the image bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSummary {
    /// 1-indexed page number.
    pub page_num: usize,
    pub text_chars: usize,
    pub tables: usize,
    pub images_converted: usize,
    pub images_attempted: usize,
    pub error: Option<PageError>,
    pub warnings: Vec<PageError>,
}

impl From<&PageResult> for PageSummary {
    fn from(page: &PageResult) -> Self {
        Self {
            page_num: page.page_num(),
            text_chars: page.text.chars().count(),
            tables: page.tables.len(),
            images_converted: page.images_converted,
            images_attempted: page.images_attempted,
            error: page.error.clone(),
            warnings: page.warnings.clone(),
        }
    }
}

/// The result of converting one document.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutput {
    /// The serialized output document.
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    pub stats: ConversionStats,
    /// Per-page digests in ascending page order.
    pub pages: Vec<PageSummary>,
    pub metadata: DocumentInfo,
    /// Outcome of the malware gate; `Skipped` means reduced-security mode.
    pub scan: ScanStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_result_is_empty() {
        let r = PageResult::failed(
            3,
            PageError::PageUnreadable {
                page: 4,
                detail: "bad object".into(),
            },
        );
        assert_eq!(r.page_num(), 4);
        assert_eq!(r.block_count(), 0);
        assert!(r.error.is_some());
    }

    #[test]
    fn block_count_ignores_blank_text() {
        let r = PageResult {
            index: 0,
            text: "  \n ".into(),
            tables: vec![vec![vec!["a".into()]]],
            ..Default::default()
        };
        assert!(!r.has_text());
        assert_eq!(r.block_count(), 1);
    }

    #[test]
    fn summary_counts_chars_not_bytes() {
        let r = PageResult {
            index: 1,
            text: "héllo".into(),
            ..Default::default()
        };
        let s = PageSummary::from(&r);
        assert_eq!(s.page_num, 2);
        assert_eq!(s.text_chars, 5);
    }
}
