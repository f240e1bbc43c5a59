//! The pdfium-backed [`DocumentBackend`].
//!
//! Every call binds pdfium, loads the document from the shared byte slice
//! once, does its work and drops everything before returning. Nothing
//! engine-owned crosses a thread boundary; callers run these methods inside
//! `spawn_blocking` because pdfium is CPU-bound and not async-safe.
//!
//! With the `thread_safe` feature a bound [`Pdfium`] holds a process-wide
//! lock until it is dropped, so a conversion walks all of its pages in one
//! [`DocumentBackend::visit_pages`] call and only copies content out while
//! the lock is held.
//!
//! Library lookup: `PDFIUM_LIB_PATH` (a library file or the directory holding
//! it), then `./`, then the system loader.

use crate::pipeline::source::{
    DocumentBackend, DocumentInfo, EmbeddedImage, OpenError, SourcePage, TextSpan,
};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};

/// Production backend over the pdfium C++ library.
#[derive(Debug, Default, Clone)]
pub struct PdfiumBackend {
    library_path: Option<PathBuf>,
}

impl PdfiumBackend {
    /// Resolve the library at call time (`PDFIUM_LIB_PATH`, `./`, system).
    pub fn new() -> Self {
        Self::default()
    }

    /// Always bind to the library at `path` (file or directory).
    pub fn with_library_path(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }

    fn bind(&self) -> Result<Pdfium, OpenError> {
        let explicit = self
            .library_path
            .clone()
            .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

        let bindings = match explicit {
            Some(path) if path.is_dir() => {
                let dir = path.to_string_lossy().to_string();
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
            }
            Some(path) => Pdfium::bind_to_library(&path),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| OpenError::Unavailable(e.to_string()))?;

        Ok(Pdfium::new(bindings))
    }
}

impl DocumentBackend for PdfiumBackend {
    fn open(&self, bytes: &[u8]) -> Result<DocumentInfo, OpenError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(classify_load_error)?;

        let metadata = document.metadata();
        let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
            metadata.get(tag).and_then(|t| {
                let v = t.value().to_string();
                if v.is_empty() {
                    None
                } else {
                    Some(v)
                }
            })
        };

        let info = DocumentInfo {
            page_count: document.pages().len() as usize,
            pdf_version: format!("{:?}", document.version()),
            title: get_meta(PdfDocumentMetadataTagType::Title),
            author: get_meta(PdfDocumentMetadataTagType::Author),
            producer: get_meta(PdfDocumentMetadataTagType::Producer),
        };
        info!("PDF opened: {} pages", info.page_count);
        Ok(info)
    }

    fn visit_pages(
        &self,
        bytes: &[u8],
        indices: &[usize],
        visit: &mut dyn FnMut(usize, Result<&dyn SourcePage, String>),
    ) -> Result<(), String> {
        let pdfium = self.bind().map_err(|e| e.to_string())?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| format!("{:?}", e))?;
        let pages = document.pages();

        for &index in indices {
            let Ok(page_index) = u16::try_from(index) else {
                visit(index, Err(format!("page index {index} exceeds pdfium's page limit")));
                continue;
            };
            match pages.get(page_index) {
                Ok(page) => visit(index, Ok(&PdfiumPage { page: &page })),
                Err(e) => visit(index, Err(format!("{:?}", e))),
            }
        }
        debug!("Walked {} pages", indices.len());
        Ok(())
    }
}

/// Map a pdfium load failure onto the admission taxonomy.
fn classify_load_error(e: PdfiumError) -> OpenError {
    let err_str = format!("{:?}", e);
    if err_str.contains("Password") || err_str.contains("password") || err_str.contains("Security") {
        OpenError::Encrypted
    } else {
        OpenError::Corrupt(err_str)
    }
}

struct PdfiumPage<'a, 'p> {
    page: &'p PdfPage<'a>,
}

impl SourcePage for PdfiumPage<'_, '_> {
    fn text(&self) -> Result<String, String> {
        let text = self.page.text().map_err(|e| format!("{:?}", e))?;
        Ok(text.all())
    }

    fn text_spans(&self) -> Result<Vec<TextSpan>, String> {
        let text = self.page.text().map_err(|e| format!("{:?}", e))?;
        let mut spans = Vec::new();
        for segment in text.segments().iter() {
            let content = segment.text();
            if content.trim().is_empty() {
                continue;
            }
            let bounds = segment.bounds();
            spans.push(TextSpan::new(
                content.trim(),
                bounds.left().value,
                bounds.bottom().value,
                bounds.right().value - bounds.left().value,
                bounds.top().value - bounds.bottom().value,
            ));
        }
        Ok(spans)
    }

    fn embedded_images(&self) -> Result<Vec<EmbeddedImage>, String> {
        let mut images = Vec::new();
        for object in self.page.objects().iter() {
            if let Some(image_object) = object.as_image_object() {
                images.push(match image_object.get_raw_image() {
                    Ok(img) => EmbeddedImage::Decoded(img),
                    Err(e) => EmbeddedImage::Unreadable(format!("{:?}", e)),
                });
            }
        }
        debug!("Found {} image objects", images.len());
        Ok(images)
    }

    fn render(&self, max_pixels: u32) -> Result<DynamicImage, String> {
        let render_config = PdfRenderConfig::new()
            .set_target_width(max_pixels as i32)
            .set_maximum_height(max_pixels as i32);

        let bitmap = self
            .page
            .render_with_config(&render_config)
            .map_err(|e| format!("{:?}", e))?;

        let image = bitmap.as_image();
        debug!("Rendered page → {}x{} px", image.width(), image.height());
        Ok(image)
    }
}
