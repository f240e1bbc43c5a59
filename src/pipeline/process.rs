//! Concurrent per-page extraction.
//!
//! One blocking reader walks the selected pages in a single pass over the
//! document and copies each page out of the engine as a [`RawPage`]. The raw
//! pages flow through a bounded channel into
//! `buffer_unordered(concurrency)`, where each one is finished on its own
//! task: text normalisation, table detection and JPEG encoding on
//! `spawn_blocking`, then the optional OCR call bounded by a timeout. None of
//! that work holds the engine.
//!
//! Results come back in **completion order**. Re-ordering is the
//! assembler's job. Every index yields exactly one [`PageResult`], including
//! when the page cannot be opened or the engine panics on it.

use crate::config::ConversionConfig;
use crate::error::PageError;
use crate::output::PageResult;
use crate::pipeline::images::extract_images;
use crate::pipeline::ocr::OcrEngine;
use crate::pipeline::source::{RawPage, SourceDocument};
use crate::pipeline::table::extract_tables;
use crate::pipeline::text::{extract_text, merge_ocr_text};
use crate::progress::ProgressCallback;
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

/// The per-page slice of [`ConversionConfig`], owned by each task.
#[derive(Debug, Clone)]
pub struct PageOptions {
    pub image_quality: u8,
    pub ocr_enabled: bool,
    pub ocr_max_pixels: u32,
    pub ocr_timeout: Duration,
}

impl PageOptions {
    /// Raster size to request from the engine, if OCR will want one.
    fn render_max(&self) -> Option<u32> {
        self.ocr_enabled.then_some(self.ocr_max_pixels)
    }
}

impl From<&ConversionConfig> for PageOptions {
    fn from(config: &ConversionConfig) -> Self {
        Self {
            image_quality: config.image_quality,
            ocr_enabled: config.ocr_enabled,
            ocr_max_pixels: config.ocr_max_pixels,
            ocr_timeout: Duration::from_secs(config.ocr_timeout_secs),
        }
    }
}

/// A page as it leaves the reader: its content, or why there is none.
type PageRead = (usize, Result<RawPage, PageError>);

/// Fans page indices out to a bounded pool and gathers the results.
pub struct PageProcessor {
    concurrency: usize,
    options: PageOptions,
    ocr: Option<Arc<dyn OcrEngine>>,
    progress: Option<ProgressCallback>,
}

impl PageProcessor {
    pub fn new(concurrency: usize, options: PageOptions) -> Self {
        Self {
            concurrency: concurrency.max(1),
            options,
            ocr: None,
            progress: None,
        }
    }

    /// OCR engine used when [`PageOptions::ocr_enabled`] is set.
    pub fn with_ocr(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.ocr = Some(engine);
        self
    }

    pub fn with_progress(mut self, callback: Option<ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Process `indices` (0-based, as resolved) and return one result per
    /// index, in completion order.
    pub async fn process(&self, doc: &SourceDocument, indices: &[usize]) -> Vec<PageResult> {
        let total = indices.len();
        let mut results = Vec::with_capacity(total);

        let (tx, rx) = mpsc::channel::<PageRead>(self.concurrency);
        let reader = {
            let doc = doc.clone();
            let indices = indices.to_vec();
            let render_max = self.options.render_max();
            tokio::task::spawn_blocking(move || read_pages(&doc, &indices, render_max, &tx))
        };

        let reads = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|read| (read, rx))
        });
        let stream = reads
            .map(|(index, read)| {
                let options = self.options.clone();
                let ocr = self.ocr.clone();
                async move { finish_page(index, read, options, ocr).await }
            })
            .buffer_unordered(self.concurrency);
        let mut stream = std::pin::pin!(stream);

        while let Some(result) = stream.next().await {
            match &result.error {
                None => {
                    debug!("Page {} done: {} blocks", result.page_num(), result.block_count());
                    if let Some(ref cb) = self.progress {
                        cb.on_page_complete(result.page_num(), total, result.block_count());
                    }
                }
                Some(e) => {
                    warn!("{}", e);
                    if let Some(ref cb) = self.progress {
                        cb.on_page_error(result.page_num(), total, &e.to_string());
                    }
                }
            }
            results.push(result);
        }

        // The reader reports every index itself; this only covers the reader
        // task dying outside its own panic guard.
        if let Err(e) = reader.await {
            let done: HashSet<usize> = results.iter().map(|r| r.index).collect();
            for &index in indices.iter().filter(|i| !done.contains(i)) {
                let error = PageError::TaskFailed {
                    page: index + 1,
                    detail: e.to_string(),
                };
                warn!("{}", error);
                if let Some(ref cb) = self.progress {
                    cb.on_page_error(index + 1, total, &error.to_string());
                }
                results.push(PageResult::failed(index, error));
            }
        }

        results
    }
}

/// The blocking reader. Walks `indices` once and sends exactly one
/// [`PageRead`] per index.
///
/// An engine panic costs only the page it happened on: the walk is resumed
/// with a freshly loaded document after that page.
fn read_pages(
    doc: &SourceDocument,
    indices: &[usize],
    render_max: Option<u32>,
    tx: &mpsc::Sender<PageRead>,
) {
    let send = |read: PageRead| {
        // A closed channel means the caller stopped listening.
        let _ = tx.blocking_send(read);
    };

    let mut rest = indices.to_vec();
    while !rest.is_empty() {
        let mut visited = HashSet::new();
        let walk = panic::catch_unwind(AssertUnwindSafe(|| {
            doc.visit_pages(&rest, &mut |index, page| {
                let read = match page {
                    Ok(page) => Ok(RawPage::capture(page, render_max)),
                    Err(detail) => Err(PageError::PageUnreadable {
                        page: index + 1,
                        detail,
                    }),
                };
                send((index, read));
                visited.insert(index);
            })
        }));

        let unvisited: Vec<usize> = rest.into_iter().filter(|i| !visited.contains(i)).collect();
        match walk {
            Ok(outcome) => {
                let detail = outcome
                    .err()
                    .unwrap_or_else(|| "backend returned without visiting the page".to_string());
                for index in unvisited {
                    send((
                        index,
                        Err(PageError::PageUnreadable {
                            page: index + 1,
                            detail: detail.clone(),
                        }),
                    ));
                }
                return;
            }
            Err(payload) => {
                let Some((&crashed, remaining)) = unvisited.split_first() else {
                    return;
                };
                send((
                    crashed,
                    Err(PageError::TaskFailed {
                        page: crashed + 1,
                        detail: panic_message(payload.as_ref()),
                    }),
                ));
                rest = remaining.to_vec();
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("engine panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("engine panicked: {s}")
    } else {
        "engine panicked".to_string()
    }
}

/// One page after it left the engine. Never fails: errors end up in the
/// result.
async fn finish_page(
    index: usize,
    read: Result<RawPage, PageError>,
    options: PageOptions,
    ocr: Option<Arc<dyn OcrEngine>>,
) -> PageResult {
    let page_num = index + 1;
    let raw = match read {
        Ok(raw) => raw,
        Err(error) => return PageResult::failed(index, error),
    };

    let quality = options.image_quality;
    let built = tokio::task::spawn_blocking(move || build_page(index, raw, quality)).await;
    let (mut result, raster) = match built {
        Ok(pair) => pair,
        Err(e) => {
            return PageResult::failed(
                index,
                PageError::TaskFailed {
                    page: page_num,
                    detail: e.to_string(),
                },
            )
        }
    };

    if let (Some(raster), Some(engine)) = (raster, ocr.filter(|_| options.ocr_enabled)) {
        match timeout(options.ocr_timeout, engine.recognize(&raster)).await {
            Ok(Ok(text)) => result.text = merge_ocr_text(&result.text, &text),
            Ok(Err(e)) => result.warnings.push(PageError::OcrFailed {
                page: page_num,
                detail: e.to_string(),
            }),
            Err(_) => result.warnings.push(PageError::OcrFailed {
                page: page_num,
                detail: format!("timed out after {:?}", options.ocr_timeout),
            }),
        }
    }

    for warning in &result.warnings {
        warn!("{}", warning);
    }
    result
}

/// The CPU half: text, tables and images from the copied page. Returns the
/// raster for OCR alongside the result.
fn build_page(index: usize, raw: RawPage, quality: u8) -> (PageResult, Option<DynamicImage>) {
    let text = extract_text(raw.text, index);
    let tables = extract_tables(raw.spans, index);
    let images = extract_images(raw.images, index, quality);

    let mut warnings = Vec::new();
    warnings.extend(text.failures);
    warnings.extend(tables.failures);
    warnings.extend(images.failures);

    let raster = match raw.raster {
        Some(Ok(img)) => Some(img),
        Some(Err(detail)) => {
            warnings.push(PageError::OcrFailed {
                page: index + 1,
                detail: format!("page could not be rendered: {detail}"),
            });
            None
        }
        None => None,
    };

    let images_converted = images.value.converted();
    let result = PageResult {
        index,
        text: text.value,
        tables: tables.value,
        images_converted,
        images_attempted: images.value.attempted,
        images: images.value.images,
        error: None,
        warnings,
    };
    (result, raster)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ocr::OcrError;
    use crate::pipeline::source::{
        DocumentBackend, DocumentInfo, EmbeddedImage, OpenError, SourcePage, TextSpan,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Page(usize);

    impl SourcePage for Page {
        fn text(&self) -> Result<String, String> {
            Ok(format!("page {}", self.0 + 1))
        }
        fn text_spans(&self) -> Result<Vec<TextSpan>, String> {
            Err("no positions".into())
        }
        fn embedded_images(&self) -> Result<Vec<EmbeddedImage>, String> {
            Ok(Vec::new())
        }
        fn render(&self, max_pixels: u32) -> Result<DynamicImage, String> {
            Ok(DynamicImage::new_rgb8(max_pixels.min(8), max_pixels.min(8)))
        }
    }

    /// Page 2 panics, page 3 cannot be opened, the rest work.
    #[derive(Default)]
    struct FlakyBackend {
        loads: AtomicUsize,
    }

    impl DocumentBackend for FlakyBackend {
        fn open(&self, _bytes: &[u8]) -> Result<DocumentInfo, OpenError> {
            Ok(DocumentInfo {
                page_count: 4,
                ..Default::default()
            })
        }

        fn visit_pages(
            &self,
            _bytes: &[u8],
            indices: &[usize],
            visit: &mut dyn FnMut(usize, Result<&dyn SourcePage, String>),
        ) -> Result<(), String> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            for &index in indices {
                match index {
                    1 => panic!("engine crashed"),
                    2 => visit(index, Err("broken page object".into())),
                    _ => visit(index, Ok(&Page(index))),
                }
            }
            Ok(())
        }
    }

    struct EchoOcr;

    #[async_trait]
    impl OcrEngine for EchoOcr {
        async fn recognize(&self, raster: &DynamicImage) -> Result<String, OcrError> {
            Ok(format!("scanned {}px", raster.width()))
        }
    }

    struct SlowOcr;

    #[async_trait]
    impl OcrEngine for SlowOcr {
        async fn recognize(&self, _raster: &DynamicImage) -> Result<String, OcrError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("too late".into())
        }
    }

    fn doc_with(backend: Arc<FlakyBackend>) -> SourceDocument {
        let info = backend.open(b"").unwrap();
        SourceDocument::new(Arc::from(&b"%PDF-1.7"[..]), info, backend)
    }

    fn doc() -> SourceDocument {
        doc_with(Arc::new(FlakyBackend::default()))
    }

    fn options(ocr_enabled: bool) -> PageOptions {
        PageOptions {
            image_quality: 85,
            ocr_enabled,
            ocr_max_pixels: 2000,
            ocr_timeout: Duration::from_millis(200),
        }
    }

    fn sorted(mut results: Vec<PageResult>) -> Vec<PageResult> {
        results.sort_by_key(|r| r.index);
        results
    }

    #[tokio::test]
    async fn every_index_yields_exactly_one_result() {
        let results = PageProcessor::new(2, options(false))
            .process(&doc(), &[0, 1, 2, 3])
            .await;
        let results = sorted(results);

        assert_eq!(results.iter().map(|r| r.index).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        assert_eq!(results[0].text, "page 1");
        assert!(matches!(results[1].error, Some(PageError::TaskFailed { page: 2, .. })));
        assert!(matches!(results[2].error, Some(PageError::PageUnreadable { page: 3, .. })));
        assert!(results[3].error.is_none());
    }

    #[tokio::test]
    async fn document_is_loaded_once_per_walk() {
        let backend = Arc::new(FlakyBackend::default());
        let results = PageProcessor::new(4, options(false))
            .process(&doc_with(backend.clone()), &[0, 2, 3])
            .await;
        assert_eq!(results.len(), 3);
        assert_eq!(backend.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn engine_panic_resumes_after_the_crashed_page() {
        let backend = Arc::new(FlakyBackend::default());
        let results = PageProcessor::new(2, options(false))
            .process(&doc_with(backend.clone()), &[0, 1, 3])
            .await;
        let results = sorted(results);

        assert!(matches!(
            &results[1].error,
            Some(PageError::TaskFailed { page: 2, detail }) if detail.contains("engine crashed")
        ));
        assert_eq!(results[2].text, "page 4");
        assert_eq!(backend.loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unrenderable_page_keeps_its_text() {
        let raw = RawPage {
            text: Ok("kept".into()),
            spans: Ok(Vec::new()),
            images: Ok(Vec::new()),
            raster: Some(Err("bitmap allocation failed".into())),
        };
        let (result, raster) = build_page(0, raw, 85);
        assert!(raster.is_none());
        assert_eq!(result.text, "kept");
        assert!(matches!(result.warnings[0], PageError::OcrFailed { page: 1, .. }));
    }

    #[tokio::test]
    async fn table_failure_is_a_warning_not_a_page_error() {
        let results = PageProcessor::new(1, options(false)).process(&doc(), &[0]).await;
        assert!(results[0].error.is_none());
        assert!(results[0].tables.is_empty());
        assert!(matches!(
            results[0].warnings[0],
            PageError::TableFailed { page: 1, .. }
        ));
    }

    #[tokio::test]
    async fn ocr_text_is_appended() {
        let results = PageProcessor::new(1, options(true))
            .with_ocr(Arc::new(EchoOcr))
            .process(&doc(), &[3])
            .await;
        assert_eq!(results[0].text, "page 4\n\nscanned 8px");
    }

    #[tokio::test]
    async fn ocr_timeout_keeps_the_page() {
        let results = PageProcessor::new(1, options(true))
            .with_ocr(Arc::new(SlowOcr))
            .process(&doc(), &[0])
            .await;
        assert!(results[0].error.is_none());
        assert_eq!(results[0].text, "page 1");
        assert!(results[0]
            .warnings
            .iter()
            .any(|w| matches!(w, PageError::OcrFailed { page: 1, .. })));
    }

    #[tokio::test]
    async fn ocr_engine_is_ignored_when_disabled() {
        let results = PageProcessor::new(1, options(false))
            .with_ocr(Arc::new(EchoOcr))
            .process(&doc(), &[0])
            .await;
        assert_eq!(results[0].text, "page 1");
    }
}
