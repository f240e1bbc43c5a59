//! Pipeline stages for PDF conversion.
//!
//! Each submodule implements exactly one step, so each can be tested with
//! in-memory fakes and the engine can be swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ validate ──▶ process ─────────────────────────▶ assemble ──▶ writer
//! (bytes)   sniff        ├ text    (native text)            (ordered     (docx/txt)
//!           open         ├ table   (span alignment)          blocks +
//!           scan         ├ images  (decode → JPEG)           stats)
//!                        └ ocr     (raster → vision LLM)
//! ```
//!
//! 1. [`input`]    — load a local path or URL into memory
//! 2. [`validate`] — admission gates: type sniff, trial open, [`scan`]
//! 3. [`process`]  — one engine pass copies [`source`] pages out, then a
//!    bounded fan-out finishes them; [`text`], [`table`], [`images`] and
//!    [`ocr`] each own one concern
//! 4. [`assemble`] — re-order by page index, build blocks, count stats
//!
//! [`pdfium`] is the production [`source::DocumentBackend`]; [`encode`],
//! [`postprocess`] support the OCR stage.

pub mod assemble;
pub mod encode;
pub mod images;
pub mod input;
pub mod ocr;
pub mod pdfium;
pub mod postprocess;
pub mod process;
pub mod scan;
pub mod source;
pub mod table;
pub mod text;
pub mod validate;

use crate::error::PageError;

/// An extractor's contribution plus the items it had to give up on.
///
/// An empty `value` with no failures means "nothing there"; an empty `value`
/// with failures means "something went wrong".
#[derive(Debug, Clone, Default)]
pub struct Extraction<T> {
    pub value: T,
    pub failures: Vec<PageError>,
}

impl<T> Extraction<T> {
    pub fn ok(value: T) -> Self {
        Self {
            value,
            failures: Vec::new(),
        }
    }

    pub fn failed(value: T, failure: PageError) -> Self {
        Self {
            value,
            failures: vec![failure],
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
