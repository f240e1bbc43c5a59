//! Configuration types for PDF conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. A config is immutable once a
//! conversion starts: the orchestrator only borrows it, and page tasks get an
//! owned [`crate::pipeline::process::PageOptions`] snapshot.

use crate::error::ConvertError;
use crate::pages::PageRange;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Configuration for a PDF conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf2docx::{ConversionConfig, OutputFormat};
///
/// let config = ConversionConfig::builder()
///     .page_range("1-3,5")
///     .image_quality(80)
///     .output_format(OutputFormat::Txt)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Page-selection expression: `all`, `5`, `3-15`, `1-3,5`. Default: `all`.
    pub page_range: String,

    /// JPEG quality used when re-encoding extracted images. Range: 1–100. Default: 85.
    pub image_quality: u8,

    /// Output container. Default: [`OutputFormat::Docx`].
    pub output_format: OutputFormat,

    /// Run the OCR pass over a rendered raster of every page. Default: false.
    pub ocr_enabled: bool,

    /// Allow several documents per call to [`crate::convert::convert_batch`]. Default: false.
    pub batch: bool,

    /// Maximum number of pages extracted at once. Default: available parallelism.
    pub concurrency: usize,

    /// Longest edge, in pixels, of the raster handed to OCR. Default: 2000.
    pub ocr_max_pixels: u32,

    /// Per-page OCR timeout in seconds. Default: 60.
    pub ocr_timeout_secs: u64,

    /// Vision LLM provider name for OCR (e.g. "openai", "ollama").
    /// If None, the provider is auto-detected from the environment.
    pub ocr_provider: Option<String>,

    /// Vision LLM model for OCR. If None, uses the provider default.
    pub ocr_model: Option<String>,

    /// clamd endpoint (`host:port`). If None, no scanner is reachable and
    /// admission runs in reduced-security mode.
    pub clamd_address: Option<String>,

    /// Timeout for one malware scan in seconds. Default: 30.
    pub scan_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional per-stage / per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            page_range: "all".to_string(),
            image_quality: 85,
            output_format: OutputFormat::default(),
            ocr_enabled: false,
            batch: false,
            concurrency: default_concurrency(),
            ocr_max_pixels: 2000,
            ocr_timeout_secs: 60,
            ocr_provider: None,
            ocr_model: None,
            clamd_address: None,
            scan_timeout_secs: 30,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("page_range", &self.page_range)
            .field("image_quality", &self.image_quality)
            .field("output_format", &self.output_format)
            .field("ocr_enabled", &self.ocr_enabled)
            .field("batch", &self.batch)
            .field("concurrency", &self.concurrency)
            .field("ocr_max_pixels", &self.ocr_max_pixels)
            .field("ocr_provider", &self.ocr_provider)
            .field("ocr_model", &self.ocr_model)
            .field("clamd_address", &self.clamd_address)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Parse [`Self::page_range`].
    pub fn parsed_page_range(&self) -> Result<PageRange, ConvertError> {
        self.page_range.parse()
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn page_range(mut self, expression: impl Into<String>) -> Self {
        self.config.page_range = expression.into();
        self
    }

    pub fn image_quality(mut self, quality: u8) -> Self {
        self.config.image_quality = quality.clamp(1, 100);
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    pub fn ocr_enabled(mut self, v: bool) -> Self {
        self.config.ocr_enabled = v;
        self
    }

    pub fn batch(mut self, v: bool) -> Self {
        self.config.batch = v;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn ocr_max_pixels(mut self, px: u32) -> Self {
        self.config.ocr_max_pixels = px.max(100);
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_timeout_secs = secs;
        self
    }

    pub fn ocr_provider(mut self, name: impl Into<String>) -> Self {
        self.config.ocr_provider = Some(name.into());
        self
    }

    pub fn ocr_model(mut self, model: impl Into<String>) -> Self {
        self.config.ocr_model = Some(model.into());
        self
    }

    pub fn clamd_address(mut self, address: impl Into<String>) -> Self {
        self.config.clamd_address = Some(address.into());
        self
    }

    pub fn scan_timeout_secs(mut self, secs: u64) -> Self {
        self.config.scan_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, ConvertError> {
        let c = &self.config;
        if !(1..=100).contains(&c.image_quality) {
            return Err(ConvertError::InvalidConfig(format!(
                "Image quality must be 1–100, got {}",
                c.image_quality
            )));
        }
        if c.concurrency == 0 {
            return Err(ConvertError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.ocr_enabled && c.ocr_timeout_secs == 0 {
            return Err(ConvertError::InvalidConfig(
                "OCR timeout must be ≥ 1 second".into(),
            ));
        }
        c.parsed_page_range()?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Output container produced by the conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Office Open XML word-processing package. (default)
    #[default]
    Docx,
    /// UTF-8 plain text; tables as tab-separated rows.
    Txt,
}

impl OutputFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Docx => "docx",
            OutputFormat::Txt => "txt",
        }
    }

    /// MIME type of the produced bytes.
    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            OutputFormat::Txt => "text/plain; charset=utf-8",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docx" => Ok(OutputFormat::Docx),
            "txt" | "text" => Ok(OutputFormat::Txt),
            other => Err(ConvertError::UnsupportedFormat(other.to_string())),
        }
    }
}
