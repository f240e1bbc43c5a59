//! Fan-in: turn completion-ordered page results into an ordered document.
//!
//! Results are buffered by page index and merged in ascending order once all
//! have arrived, so the output is identical whatever order workers finished
//! in. A result for an index that was not requested, or a second result for
//! the same index, is dropped with a warning. A requested index that never
//! produced a result gets an empty [`PageError::Missing`] page.

use crate::error::PageError;
use crate::output::{ConversionStats, ExtractedImage, PageResult, PageSummary, Table};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// One unit of output content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// A page's text. May span several lines.
    Paragraph(String),
    Table(Table),
    Image(ExtractedImage),
    /// Separates the content of consecutive pages.
    PageBreak,
}

/// The document handed to a writer. Blocks are only ever appended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputDocument {
    pub title: Option<String>,
    blocks: Vec<Block>,
}

impl OutputDocument {
    pub fn new(title: Option<String>) -> Self {
        Self {
            title,
            blocks: Vec::new(),
        }
    }

    pub fn push(&mut self, block: Block) {
        self.blocks.push(block);
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// What the assembler produces.
#[derive(Debug, Clone)]
pub struct Assembled {
    pub document: OutputDocument,
    pub stats: ConversionStats,
    /// Per-page digests, ascending.
    pub pages: Vec<PageSummary>,
}

pub struct DocumentAssembler {
    expected: BTreeSet<usize>,
    received: BTreeMap<usize, PageResult>,
    title: Option<String>,
}

impl DocumentAssembler {
    /// `expected` is the resolved index set.
    pub fn new(expected: &[usize]) -> Self {
        Self {
            expected: expected.iter().copied().collect(),
            received: BTreeMap::new(),
            title: None,
        }
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    /// Buffer one result. Returns false if it was dropped.
    pub fn accept(&mut self, result: PageResult) -> bool {
        if !self.expected.contains(&result.index) {
            warn!("Dropping result for unrequested page {}", result.page_num());
            return false;
        }
        if self.received.contains_key(&result.index) {
            warn!("Dropping duplicate result for page {}", result.page_num());
            return false;
        }
        self.received.insert(result.index, result);
        true
    }

    /// Merge every expected page in ascending order.
    pub fn finish(mut self) -> Assembled {
        let mut document = OutputDocument::new(self.title.take());
        let mut stats = ConversionStats::default();
        let mut pages = Vec::with_capacity(self.expected.len());

        for (n, index) in self.expected.iter().copied().enumerate() {
            let result = self.received.remove(&index).unwrap_or_else(|| {
                warn!("Page {} produced no result", index + 1);
                PageResult::failed(index, PageError::Missing { page: index + 1 })
            });

            if n > 0 {
                document.push(Block::PageBreak);
            }
            append_page(&mut document, &mut stats, &result);
            pages.push(PageSummary::from(&result));
        }

        debug!(
            "Assembled {} pages: {} paragraphs, {} tables, {} images",
            stats.pages, stats.text_blocks, stats.tables, stats.images
        );
        Assembled {
            document,
            stats,
            pages,
        }
    }
}

/// Merge results from any source in one call.
pub fn assemble(expected: &[usize], results: impl IntoIterator<Item = PageResult>) -> Assembled {
    let mut assembler = DocumentAssembler::new(expected);
    for result in results {
        assembler.accept(result);
    }
    assembler.finish()
}

fn append_page(document: &mut OutputDocument, stats: &mut ConversionStats, page: &PageResult) {
    stats.pages += 1;
    stats.warnings += page.warnings.len();
    if page.error.is_some() {
        stats.failed_pages += 1;
    }

    if page.has_text() {
        document.push(Block::Paragraph(page.text.clone()));
        stats.text_blocks += 1;
    }
    for table in &page.tables {
        document.push(Block::Table(table.clone()));
        stats.tables += 1;
    }
    for image in &page.images {
        document.push(Block::Image(image.clone()));
        stats.images += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(index: usize, text: &str) -> PageResult {
        PageResult {
            index,
            text: text.to_string(),
            ..Default::default()
        }
    }

    fn paragraphs(doc: &OutputDocument) -> Vec<&str> {
        doc.blocks()
            .iter()
            .filter_map(|b| match b {
                Block::Paragraph(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn order_is_independent_of_arrival() {
        let expected = [0, 1, 2, 4];
        let forward = assemble(
            &expected,
            vec![page(0, "a"), page(1, "b"), page(2, "c"), page(4, "e")],
        );
        let reverse = assemble(
            &expected,
            vec![page(4, "e"), page(2, "c"), page(1, "b"), page(0, "a")],
        );

        assert_eq!(forward.document, reverse.document);
        assert_eq!(paragraphs(&reverse.document), vec!["a", "b", "c", "e"]);
        assert_eq!(
            reverse.pages.iter().map(|p| p.page_num).collect::<Vec<_>>(),
            vec![1, 2, 3, 5]
        );
    }

    #[test]
    fn page_breaks_separate_pages() {
        let out = assemble(&[0, 1], vec![page(1, "b"), page(0, "a")]);
        assert_eq!(
            out.document.blocks(),
            &[
                Block::Paragraph("a".into()),
                Block::PageBreak,
                Block::Paragraph("b".into()),
            ]
        );
    }

    #[test]
    fn unexpected_and_duplicate_results_are_dropped() {
        let mut assembler = DocumentAssembler::new(&[0]);
        assert!(assembler.accept(page(0, "first")));
        assert!(!assembler.accept(page(0, "second")));
        assert!(!assembler.accept(page(7, "stray")));

        let out = assembler.finish();
        assert_eq!(out.stats.pages, 1);
        assert_eq!(paragraphs(&out.document), vec!["first"]);
    }

    #[test]
    fn missing_page_is_synthesised() {
        let out = assemble(&[0, 1], vec![page(0, "a")]);
        assert_eq!(out.stats.pages, 2);
        assert_eq!(out.stats.failed_pages, 1);
        assert_eq!(out.pages[1].error, Some(PageError::Missing { page: 2 }));
    }

    #[test]
    fn stats_count_blocks() {
        let mut with_content = page(0, "text");
        with_content.tables = vec![vec![vec!["a".into(), "b".into()]; 2]];
        with_content.images = vec![
            ExtractedImage {
                data: vec![0xFF, 0xD8],
                width: 1,
                height: 1,
                mime_type: "image/jpeg",
            };
            2
        ];
        with_content.images_converted = 2;
        with_content.images_attempted = 3;
        with_content.warnings = vec![PageError::ImageFailed {
            page: 1,
            image: 3,
            detail: "bad".into(),
        }];
        let blank = page(1, "   ");

        let out = assemble(&[0, 1], vec![blank, with_content]);
        assert_eq!(
            out.stats,
            ConversionStats {
                pages: 2,
                images: 2,
                tables: 1,
                text_blocks: 1,
                failed_pages: 0,
                warnings: 1,
                ..Default::default()
            }
        );
    }
}
