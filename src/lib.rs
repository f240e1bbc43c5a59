//! # pdf2docx
//!
//! Convert PDF documents into editable DOCX or plain-text documents.
//!
//! Each selected page is mined for its text, its tables (detected from text
//! alignment) and its embedded images; an optional OCR pass sends a raster of
//! the page to a vision model and appends what it reads. Before any of that,
//! the input has to pass three admission gates: it must be a PDF, it must not
//! be password protected, and the malware scanner must not flag it.
//!
//! ## Pipeline Overview
//!
//! ```text
//! bytes
//!  │
//!  ├─ 1. Validate  type sniff → trial open → malware scan (unreachable: skipped)
//!  ├─ 2. Resolve   page-range expression → ascending page indices
//!  ├─ 3. Process   one pdfium pass copies pages out; bounded concurrent tasks
//!  │               text · tables · images (→ JPEG) · optional OCR
//!  ├─ 4. Assemble  re-order by page index, build blocks, count stats
//!  └─ 5. Serialize DOCX package or TXT in a scoped temp workspace
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2docx::{convert, ConversionConfig, OutputFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bytes = std::fs::read("report.pdf")?;
//!     let config = ConversionConfig::builder()
//!         .page_range("1-3,5")
//!         .output_format(OutputFormat::Docx)
//!         .build()?;
//!
//!     let output = convert(&bytes, &config).await?;
//!     std::fs::write("report.docx", &output.bytes)?;
//!     eprintln!(
//!         "{} pages, {} tables, {} images",
//!         output.stats.pages, output.stats.tables, output.stats.images
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Errors
//!
//! Admission failures carry a stable code ([`ConvertError::code`]):
//! 1 encrypted, 2 corrupted, 3 malware, 4 invalid file type. Page-level
//! problems never fail the conversion; they are listed per page in
//! [`ConversionOutput::pages`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2docx` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ```toml
//! pdf2docx = { version = "0.1", default-features = false }
//! ```
//!
//! ## PDF engine
//!
//! Extraction uses pdfium through `pdfium-render`. The library is located via
//! `PDFIUM_LIB_PATH` (file or directory), then the working directory, then the
//! system loader.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pages;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod writer;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, OutputFormat};
pub use convert::{
    convert, convert_batch, convert_file, convert_sync, convert_to_file, inspect, BatchItem,
    Converter, ConverterBuilder, Stage,
};
pub use error::{ConvertError, PageError};
pub use output::{ConversionOutput, ConversionStats, ExtractedImage, PageResult, PageSummary, Table};
pub use pages::{resolve_page_range, PageRange};
pub use pipeline::input::InputDocument;
pub use pipeline::scan::ScanStatus;
pub use pipeline::source::DocumentInfo;
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
