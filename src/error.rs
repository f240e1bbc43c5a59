//! Error types for the pdf2docx library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ConvertError`] — **Fatal**: the conversion of this document cannot
//!   proceed (rejected at admission, malformed page range, output could not be
//!   written). Returned as `Err(ConvertError)` from the `convert*` functions.
//!
//! * [`PageError`] — **Non-fatal**: a single page, or a single item on a page
//!   (one embedded image, the table pass, the OCR pass), failed while the rest
//!   of the document is fine. Stored inside [`crate::output::PageResult`] so
//!   callers can inspect partial success rather than losing the whole document
//!   to one bad image.
//!
//! Admission failures carry a stable numeric code (see [`ConvertError::code`])
//! that UI collaborators display without parsing messages.

use crate::convert::Stage;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf2docx library.
///
/// Page-level failures use [`PageError`] and are stored in
/// [`crate::output::PageResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Admission errors ──────────────────────────────────────────────────
    /// The byte stream does not carry a PDF signature.
    #[error("Invalid file type: expected application/pdf, detected {detected}")]
    InvalidFileType { detected: String },

    /// The document is password protected.
    #[error("Encrypted document: password protection is present")]
    EncryptedDocument,

    /// The container could not be parsed at all.
    #[error("Corrupted file: {detail}")]
    CorruptedFile { detail: String },

    /// The malware scanner reported a signature match.
    #[error("Malware detected ({signature}): file rejected")]
    MalwareDetected { signature: String },

    /// The malware scanner was reached but could not scan the document.
    #[error("Malware scan failed: {reason}")]
    ScanFailed { reason: String },

    // ── Range errors ──────────────────────────────────────────────────────
    /// The page-range expression could not be resolved.
    #[error("Malformed page range '{expression}': {reason}")]
    MalformedRange { expression: String, reason: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The requested output format is not one this crate can produce.
    #[error("Unsupported output format '{0}' (expected docx or txt)")]
    UnsupportedFormat(String),

    /// The output document could not be produced or stored.
    #[error("Conversion failed while writing {format} output: {detail}")]
    SerializationFailed { format: String, detail: String },

    /// Could not persist the converted document at the requested path.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Engine errors ─────────────────────────────────────────────────────
    /// The PDF engine could not be loaded.
    #[error(
        "PDF engine unavailable: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium (file or directory) or install pdfium\n\
where the system loader can find it.\n"
    )]
    BackendUnavailable(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Several documents were submitted without enabling batch mode.
    #[error("{count} documents submitted but batch mode is disabled")]
    BatchDisabled { count: usize },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// Stable identifier consumed by UI collaborators.
    ///
    /// | code | meaning |
    /// |------|---------|
    /// | 1 | encrypted document |
    /// | 2 | corrupted file |
    /// | 3 | malware detected |
    /// | 4 | invalid file type |
    pub fn code(&self) -> Option<u8> {
        match self {
            ConvertError::EncryptedDocument => Some(1),
            ConvertError::CorruptedFile { .. } => Some(2),
            ConvertError::MalwareDetected { .. } => Some(3),
            ConvertError::InvalidFileType { .. } => Some(4),
            _ => None,
        }
    }

    /// True for errors raised by the admission gate chain.
    pub fn is_admission(&self) -> bool {
        self.code().is_some()
    }

    /// The pipeline stage that fails with this error.
    pub fn stage(&self) -> Stage {
        match self {
            ConvertError::InvalidFileType { .. }
            | ConvertError::EncryptedDocument
            | ConvertError::CorruptedFile { .. }
            | ConvertError::MalwareDetected { .. }
            | ConvertError::ScanFailed { .. }
            | ConvertError::BackendUnavailable(_)
            | ConvertError::FileNotFound { .. }
            | ConvertError::PermissionDenied { .. }
            | ConvertError::DownloadFailed { .. }
            | ConvertError::DownloadTimeout { .. }
            | ConvertError::InvalidConfig(_)
            | ConvertError::BatchDisabled { .. } => Stage::Validating,
            ConvertError::MalformedRange { .. } => Stage::Resolving,
            ConvertError::UnsupportedFormat(_)
            | ConvertError::SerializationFailed { .. }
            | ConvertError::OutputWriteFailed { .. } => Stage::Serializing,
            ConvertError::Internal(_) => Stage::Processing,
        }
    }
}

/// A non-fatal error for a single page or a single item on a page.
///
/// When it is the page's [`crate::output::PageResult::error`], the page
/// contributed an empty payload. When it appears in
/// [`crate::output::PageResult::warnings`], only that item was lost.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The engine could not open the page at all.
    #[error("Page {page}: could not be opened: {detail}")]
    PageUnreadable { page: usize, detail: String },

    /// The worker task died before producing a result.
    #[error("Page {page}: extraction task failed: {detail}")]
    TaskFailed { page: usize, detail: String },

    /// Native text extraction failed.
    #[error("Page {page}: text extraction failed: {detail}")]
    TextFailed { page: usize, detail: String },

    /// Table detection failed; the page contributes no tables.
    #[error("Page {page}: table extraction failed: {detail}")]
    TableFailed { page: usize, detail: String },

    /// One embedded image could not be decoded or re-encoded.
    #[error("Page {page}: image {image} skipped: {detail}")]
    ImageFailed {
        page: usize,
        image: usize,
        detail: String,
    },

    /// The page's image objects could not be enumerated.
    #[error("Page {page}: embedded images unavailable: {detail}")]
    ImagesUnavailable { page: usize, detail: String },

    /// The OCR pass failed or timed out; no OCR text for this page.
    #[error("Page {page}: OCR failed: {detail}")]
    OcrFailed { page: usize, detail: String },

    /// No result arrived for a requested page.
    #[error("Page {page}: no result was produced")]
    Missing { page: usize },
}

impl PageError {
    /// 1-indexed page number the error refers to.
    pub fn page(&self) -> usize {
        match self {
            PageError::PageUnreadable { page, .. }
            | PageError::TaskFailed { page, .. }
            | PageError::TextFailed { page, .. }
            | PageError::TableFailed { page, .. }
            | PageError::ImageFailed { page, .. }
            | PageError::ImagesUnavailable { page, .. }
            | PageError::OcrFailed { page, .. }
            | PageError::Missing { page } => *page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_codes_are_stable() {
        assert_eq!(ConvertError::EncryptedDocument.code(), Some(1));
        assert_eq!(
            ConvertError::CorruptedFile {
                detail: "xref".into()
            }
            .code(),
            Some(2)
        );
        assert_eq!(
            ConvertError::MalwareDetected {
                signature: "Eicar-Test-Signature".into()
            }
            .code(),
            Some(3)
        );
        assert_eq!(
            ConvertError::InvalidFileType {
                detected: "image/png".into()
            }
            .code(),
            Some(4)
        );
    }

    #[test]
    fn non_admission_errors_have_no_code() {
        let e = ConvertError::MalformedRange {
            expression: "3-1".into(),
            reason: "reversed".into(),
        };
        assert_eq!(e.code(), None);
        assert!(!e.is_admission());
        assert_eq!(e.stage(), Stage::Resolving);
    }

    #[test]
    fn scan_failure_is_a_validation_error_without_code() {
        let e = ConvertError::ScanFailed {
            reason: "INSTREAM size limit exceeded. ERROR".into(),
        };
        assert_eq!(e.code(), None);
        assert_eq!(e.stage(), Stage::Validating);
    }

    #[test]
    fn malformed_range_display() {
        let e = ConvertError::MalformedRange {
            expression: "5-3".into(),
            reason: "range start 5 is after end 3".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("'5-3'"), "got: {msg}");
        assert!(msg.contains("after end"), "got: {msg}");
    }

    #[test]
    fn serialization_error_stage() {
        let e = ConvertError::SerializationFailed {
            format: "docx".into(),
            detail: "disk full".into(),
        };
        assert_eq!(e.stage(), Stage::Serializing);
        assert!(e.to_string().contains("disk full"));
    }

    #[test]
    fn page_error_reports_page() {
        let e = PageError::ImageFailed {
            page: 4,
            image: 2,
            detail: "bad huffman table".into(),
        };
        assert_eq!(e.page(), 4);
        assert!(e.to_string().contains("image 2"));
    }
}
