//! The seam between the pipeline and the PDF engine.
//!
//! [`DocumentBackend`] opens documents and hands out pages by index;
//! [`SourcePage`] exposes what the pipeline reads from one page.
//! The production backend is [`crate::pipeline::pdfium::PdfiumBackend`];
//! tests inject in-memory fakes.
//!
//! Pages are reached through a visitor (`visit_pages`) because engine page
//! handles borrow the engine and the document. The visitor copies what it
//! needs into a [`RawPage`] and returns, so decoding, table detection and
//! JPEG encoding never run while the engine is held.

use crate::error::ConvertError;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Facts learned by opening a document without extracting anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub page_count: usize,
    pub pdf_version: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub producer: Option<String>,
}

/// Why a document could not be opened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpenError {
    #[error("document is password protected")]
    Encrypted,
    #[error("document is corrupt: {0}")]
    Corrupt(String),
    #[error("PDF engine unavailable: {0}")]
    Unavailable(String),
}

impl From<OpenError> for ConvertError {
    fn from(e: OpenError) -> Self {
        match e {
            OpenError::Encrypted => ConvertError::EncryptedDocument,
            OpenError::Corrupt(detail) => ConvertError::CorruptedFile { detail },
            OpenError::Unavailable(detail) => ConvertError::BackendUnavailable(detail),
        }
    }
}

/// A run of text with its position on the page (PDF user space, origin
/// bottom-left, y grows upwards).
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl TextSpan {
    pub fn new(text: impl Into<String>, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }
}

/// One image object as the engine hands it over.
#[derive(Debug, Clone)]
pub enum EmbeddedImage {
    /// A still-encoded stream (JPEG, PNG) that needs decoding.
    Encoded(Vec<u8>),
    /// Pixels the engine already decoded.
    Decoded(DynamicImage),
    /// The engine could not read the object.
    Unreadable(String),
}

/// Read access to one page. Every method may fail independently.
pub trait SourcePage {
    /// Plain text in reading order.
    fn text(&self) -> Result<String, String>;

    /// Positioned text runs, used for table detection.
    fn text_spans(&self) -> Result<Vec<TextSpan>, String>;

    /// Image objects on the page, in content-stream order.
    fn embedded_images(&self) -> Result<Vec<EmbeddedImage>, String>;

    /// Rasterise the page with its longest edge capped at `max_pixels`.
    fn render(&self, max_pixels: u32) -> Result<DynamicImage, String>;
}

/// Everything the extractors need from one page, owned and detached from
/// the engine.
#[derive(Debug, Clone)]
pub struct RawPage {
    pub text: Result<String, String>,
    pub spans: Result<Vec<TextSpan>, String>,
    pub images: Result<Vec<EmbeddedImage>, String>,
    /// `None` unless a raster was asked for.
    pub raster: Option<Result<DynamicImage, String>>,
}

impl RawPage {
    /// Copy the page out of the engine. `render_max` requests a raster with
    /// its longest edge capped at that many pixels.
    pub fn capture(page: &dyn SourcePage, render_max: Option<u32>) -> Self {
        Self {
            text: page.text(),
            spans: page.text_spans(),
            images: page.embedded_images(),
            raster: render_max.map(|max| page.render(max)),
        }
    }
}

/// A PDF engine. Implementations must be shareable across worker threads;
/// all methods are blocking and are called from the blocking pool.
pub trait DocumentBackend: Send + Sync {
    /// Open the document without extracting content.
    fn open(&self, bytes: &[u8]) -> Result<DocumentInfo, OpenError>;

    /// Load the document once and pass each page of `indices` (0-based) to
    /// `visit`, in the order given. A page that cannot be opened is passed as
    /// `Err` and the walk goes on. `Err` from the method itself means the
    /// document could not be loaded and the remaining pages were not visited.
    fn visit_pages(
        &self,
        bytes: &[u8],
        indices: &[usize],
        visit: &mut dyn FnMut(usize, Result<&dyn SourcePage, String>),
    ) -> Result<(), String>;
}

/// An admitted document: shared immutable bytes plus the engine that reads them.
///
/// Cloning is cheap and every clone reads the same buffer. Pages are reached
/// by explicit index, so concurrent tasks never share a cursor.
#[derive(Clone)]
pub struct SourceDocument {
    bytes: Arc<[u8]>,
    info: DocumentInfo,
    backend: Arc<dyn DocumentBackend>,
}

impl SourceDocument {
    pub fn new(bytes: Arc<[u8]>, info: DocumentInfo, backend: Arc<dyn DocumentBackend>) -> Self {
        Self {
            bytes,
            info,
            backend,
        }
    }

    pub fn page_count(&self) -> usize {
        self.info.page_count
    }

    pub fn info(&self) -> &DocumentInfo {
        &self.info
    }

    /// Walk `indices` in one pass over the document. Blocking.
    ///
    /// Indices past the end are reported as `Err` before the engine is
    /// touched; the rest keep their relative order.
    pub fn visit_pages(
        &self,
        indices: &[usize],
        visit: &mut dyn FnMut(usize, Result<&dyn SourcePage, String>),
    ) -> Result<(), String> {
        let (in_range, out_of_range): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&index| index < self.info.page_count);
        for index in out_of_range {
            visit(
                index,
                Err(format!(
                    "page index {} out of range (document has {} pages)",
                    index, self.info.page_count
                )),
            );
        }
        if in_range.is_empty() {
            return Ok(());
        }
        self.backend.visit_pages(&self.bytes, &in_range, visit)
    }
}

impl std::fmt::Debug for SourceDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDocument")
            .field("bytes", &self.bytes.len())
            .field("info", &self.info)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BlankPage;

    impl SourcePage for BlankPage {
        fn text(&self) -> Result<String, String> {
            Ok("blank".into())
        }
        fn text_spans(&self) -> Result<Vec<TextSpan>, String> {
            Err("no positions".into())
        }
        fn embedded_images(&self) -> Result<Vec<EmbeddedImage>, String> {
            Ok(Vec::new())
        }
        fn render(&self, max_pixels: u32) -> Result<DynamicImage, String> {
            Ok(DynamicImage::new_rgb8(max_pixels, max_pixels))
        }
    }

    /// Records the index lists it is asked to walk.
    #[derive(Default)]
    struct RecordingBackend {
        walks: std::sync::Mutex<Vec<Vec<usize>>>,
    }

    impl DocumentBackend for RecordingBackend {
        fn open(&self, _bytes: &[u8]) -> Result<DocumentInfo, OpenError> {
            Ok(DocumentInfo {
                page_count: 2,
                ..Default::default()
            })
        }

        fn visit_pages(
            &self,
            _bytes: &[u8],
            indices: &[usize],
            visit: &mut dyn FnMut(usize, Result<&dyn SourcePage, String>),
        ) -> Result<(), String> {
            self.walks.lock().unwrap().push(indices.to_vec());
            for &index in indices {
                visit(index, Ok(&BlankPage));
            }
            Ok(())
        }
    }

    #[test]
    fn open_errors_map_to_admission_codes() {
        assert_eq!(ConvertError::from(OpenError::Encrypted).code(), Some(1));
        assert_eq!(
            ConvertError::from(OpenError::Corrupt("no xref".into())).code(),
            Some(2)
        );
        assert_eq!(
            ConvertError::from(OpenError::Unavailable("dlopen".into())).code(),
            None
        );
    }

    #[test]
    fn out_of_range_pages_never_reach_the_engine() {
        let backend = Arc::new(RecordingBackend::default());
        let info = backend.open(b"").unwrap();
        let doc = SourceDocument::new(Arc::from(&b"%PDF-1.7"[..]), info, backend.clone());

        let mut seen = Vec::new();
        doc.visit_pages(&[1, 5, 0], &mut |index, page| seen.push((index, page.is_ok())))
            .unwrap();

        assert_eq!(seen, vec![(5, false), (1, true), (0, true)]);
        assert_eq!(*backend.walks.lock().unwrap(), vec![vec![1, 0]]);
    }

    #[test]
    fn capture_renders_only_when_asked() {
        let plain = RawPage::capture(&BlankPage, None);
        assert_eq!(plain.text.as_deref(), Ok("blank"));
        assert!(plain.spans.is_err());
        assert!(plain.raster.is_none());

        let raster = RawPage::capture(&BlankPage, Some(6)).raster.unwrap().unwrap();
        assert_eq!(raster.width(), 6);
    }
}
