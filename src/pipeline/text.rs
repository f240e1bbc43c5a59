//! Native text extraction and OCR text merging.

use crate::error::PageError;
use crate::pipeline::Extraction;

/// Normalise the page's plain text as read from the engine. Failure yields
/// empty text and a [`PageError::TextFailed`] entry.
pub fn extract_text(text: Result<String, String>, index: usize) -> Extraction<String> {
    match text {
        Ok(text) => Extraction::ok(normalise(&text)),
        Err(detail) => Extraction::failed(
            String::new(),
            PageError::TextFailed {
                page: index + 1,
                detail,
            },
        ),
    }
}

/// Append OCR output after the native text, separated by one blank line.
///
/// Either side may be empty, in which case no separator is inserted.
pub fn merge_ocr_text(native: &str, ocr: &str) -> String {
    let native = native.trim_end();
    let ocr = ocr.trim();
    match (native.is_empty(), ocr.is_empty()) {
        (_, true) => native.to_string(),
        (true, false) => ocr.to_string(),
        (false, false) => format!("{native}\n\n{ocr}"),
    }
}

/// pdfium emits `\r\n` between lines and NULs for some unmapped glyphs.
fn normalise(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\0', "")
        .trim_end()
        .to_string()
}
