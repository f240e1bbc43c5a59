//! Conversion entry points.
//!
//! [`Converter`] sequences one conversion through its stages:
//!
//! ```text
//! Validating → Resolving → Processing → Assembling → Serializing → Done
//! ```
//!
//! A fatal [`ConvertError`] at any stage ends the conversion of that document
//! ([`ConvertError::stage`] says where). Per-page failures never do; they are
//! reported in [`ConversionOutput::pages`] and the stats.
//!
//! Each conversion gets its own temp workspace which is removed on every exit
//! path, including errors.

use crate::config::ConversionConfig;
use crate::error::ConvertError;
use crate::output::ConversionOutput;
use crate::pipeline::assemble::{DocumentAssembler, OutputDocument};
use crate::pipeline::input::{self, InputDocument};
use crate::pipeline::ocr::{self, OcrEngine};
use crate::pipeline::pdfium::PdfiumBackend;
use crate::pipeline::process::{PageOptions, PageProcessor};
use crate::pipeline::scan::{ClamdScanner, DisabledScanner, MalwareScanner};
use crate::pipeline::source::{DocumentBackend, DocumentInfo, SourceDocument};
use crate::pipeline::validate::{InputValidator, MagicSniffer, MimeSniffer, PDF_MIME, SNIFF_WINDOW};
use crate::writer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Where a conversion is. Reported to progress callbacks on entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Validating,
    Resolving,
    Processing,
    Assembling,
    Serializing,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validating => "validating",
            Stage::Resolving => "resolving",
            Stage::Processing => "processing",
            Stage::Assembling => "assembling",
            Stage::Serializing => "serializing",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// The result of one document in a batch.
#[derive(Debug)]
pub struct BatchItem {
    pub name: String,
    pub result: Result<ConversionOutput, ConvertError>,
}

/// Runs conversions with a fixed set of collaborators.
///
/// Collaborators left unset on the builder are chosen per conversion: the
/// scanner from [`ConversionConfig::clamd_address`], the OCR engine from the
/// OCR provider settings.
pub struct Converter {
    sniffer: Arc<dyn MimeSniffer>,
    backend: Arc<dyn DocumentBackend>,
    scanner: Option<Arc<dyn MalwareScanner>>,
    ocr: Option<Arc<dyn OcrEngine>>,
    workspace_root: Option<PathBuf>,
}

impl Default for Converter {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("scanner", &self.scanner.as_ref().map(|_| "<dyn MalwareScanner>"))
            .field("ocr", &self.ocr.as_ref().map(|_| "<dyn OcrEngine>"))
            .field("workspace_root", &self.workspace_root)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct ConverterBuilder {
    sniffer: Option<Arc<dyn MimeSniffer>>,
    backend: Option<Arc<dyn DocumentBackend>>,
    scanner: Option<Arc<dyn MalwareScanner>>,
    ocr: Option<Arc<dyn OcrEngine>>,
    workspace_root: Option<PathBuf>,
}

impl ConverterBuilder {
    pub fn sniffer(mut self, sniffer: Arc<dyn MimeSniffer>) -> Self {
        self.sniffer = Some(sniffer);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn DocumentBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn scanner(mut self, scanner: Arc<dyn MalwareScanner>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    pub fn ocr(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.ocr = Some(engine);
        self
    }

    /// Directory the per-conversion workspaces are created in. Defaults to
    /// the system temp directory.
    pub fn workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    pub fn build(self) -> Converter {
        Converter {
            sniffer: self.sniffer.unwrap_or_else(|| Arc::new(MagicSniffer)),
            backend: self
                .backend
                .unwrap_or_else(|| Arc::new(PdfiumBackend::new())),
            scanner: self.scanner,
            ocr: self.ocr,
            workspace_root: self.workspace_root,
        }
    }
}

impl Converter {
    pub fn builder() -> ConverterBuilder {
        ConverterBuilder::default()
    }

    /// Convert one in-memory document.
    ///
    /// Returns `Ok` even when some pages failed; check
    /// [`crate::output::ConversionStats::failed_pages`].
    pub async fn convert(
        &self,
        bytes: &[u8],
        config: &ConversionConfig,
    ) -> Result<ConversionOutput, ConvertError> {
        let total_start = Instant::now();
        let enter = |stage: Stage| {
            debug!("Stage: {}", stage);
            if let Some(ref cb) = config.progress_callback {
                cb.on_stage(stage);
            }
        };

        let mut workspace = tempfile::Builder::new();
        workspace.prefix("pdf2docx-");
        let workspace = match self.workspace_root {
            Some(ref root) => workspace.tempdir_in(root),
            None => workspace.tempdir(),
        }
        .map_err(|e| ConvertError::Internal(format!("could not create workspace: {e}")))?;
        debug!("Workspace: {}", workspace.path().display());

        // ── Validating ───────────────────────────────────────────────────
        enter(Stage::Validating);
        let bytes: Arc<[u8]> = Arc::from(bytes);
        let validator = InputValidator::new(
            Arc::clone(&self.sniffer),
            Arc::clone(&self.backend),
            self.scanner_for(config),
        );
        let admission = validator.admit(Arc::clone(&bytes)).await?;

        // ── Resolving ────────────────────────────────────────────────────
        enter(Stage::Resolving);
        let indices = config
            .parsed_page_range()?
            .resolve(admission.info.page_count)?;
        info!(
            "Converting {} of {} pages to {}",
            indices.len(),
            admission.info.page_count,
            config.output_format
        );
        if let Some(ref cb) = config.progress_callback {
            cb.on_conversion_start(indices.len());
        }

        // ── Processing ───────────────────────────────────────────────────
        enter(Stage::Processing);
        let processing_start = Instant::now();
        let source = SourceDocument::new(bytes, admission.info.clone(), Arc::clone(&self.backend));
        let mut processor = PageProcessor::new(config.concurrency, PageOptions::from(config))
            .with_progress(config.progress_callback.clone());
        if config.ocr_enabled {
            processor = processor.with_ocr(self.ocr_for(config));
        }
        let results = processor.process(&source, &indices).await;
        drop(source);
        let processing_duration_ms = processing_start.elapsed().as_millis() as u64;

        // ── Assembling ───────────────────────────────────────────────────
        enter(Stage::Assembling);
        let mut assembler =
            DocumentAssembler::new(&indices).with_title(admission.info.title.clone());
        for result in results {
            assembler.accept(result);
        }
        let assembled = assembler.finish();

        // ── Serializing ──────────────────────────────────────────────────
        enter(Stage::Serializing);
        let output_bytes = serialize_in(
            assembled.document,
            config.output_format,
            workspace.path().to_path_buf(),
        )
        .await?;
        drop(workspace);

        let mut stats = assembled.stats;
        stats.processing_duration_ms = processing_duration_ms;
        stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

        info!(
            "Conversion complete: {} pages ({} failed), {} paragraphs, {} tables, {} images, {}ms",
            stats.pages,
            stats.failed_pages,
            stats.text_blocks,
            stats.tables,
            stats.images,
            stats.total_duration_ms
        );
        if let Some(ref cb) = config.progress_callback {
            cb.on_conversion_complete(stats.pages, stats.pages - stats.failed_pages);
        }
        enter(Stage::Done);

        Ok(ConversionOutput {
            bytes: output_bytes,
            format: config.output_format,
            stats,
            pages: assembled.pages,
            metadata: admission.info,
            scan: admission.scan,
        })
    }

    /// Convert several documents, one after another.
    ///
    /// More than one document requires [`ConversionConfig::batch`]. One
    /// document's failure never affects the others.
    pub async fn convert_batch(
        &self,
        documents: Vec<InputDocument>,
        config: &ConversionConfig,
    ) -> Result<Vec<BatchItem>, ConvertError> {
        if documents.len() > 1 && !config.batch {
            return Err(ConvertError::BatchDisabled {
                count: documents.len(),
            });
        }

        let total = documents.len();
        let mut items = Vec::with_capacity(total);
        for (i, doc) in documents.into_iter().enumerate() {
            info!("Batch {}/{}: {}", i + 1, total, doc.name);
            let result = self.convert(&doc.bytes, config).await;
            items.push(BatchItem {
                name: doc.name,
                result,
            });
        }
        Ok(items)
    }

    /// Read a document's facts without converting it. Runs the type sniff and
    /// the trial open only.
    pub async fn inspect(&self, bytes: &[u8]) -> Result<DocumentInfo, ConvertError> {
        let detected = self.sniffer.sniff(&bytes[..bytes.len().min(SNIFF_WINDOW)]);
        if detected != PDF_MIME {
            return Err(ConvertError::InvalidFileType { detected });
        }
        let backend = Arc::clone(&self.backend);
        let bytes = bytes.to_vec();
        tokio::task::spawn_blocking(move || backend.open(&bytes))
            .await
            .map_err(|e| ConvertError::Internal(format!("trial open panicked: {e}")))?
            .map_err(ConvertError::from)
    }

    fn scanner_for(&self, config: &ConversionConfig) -> Arc<dyn MalwareScanner> {
        if let Some(ref scanner) = self.scanner {
            return Arc::clone(scanner);
        }
        match config.clamd_address {
            Some(ref address) => Arc::new(ClamdScanner::new(
                address.clone(),
                Duration::from_secs(config.scan_timeout_secs),
            )),
            None => Arc::new(DisabledScanner),
        }
    }

    fn ocr_for(&self, config: &ConversionConfig) -> Arc<dyn OcrEngine> {
        match self.ocr {
            Some(ref engine) => Arc::clone(engine),
            None => ocr::engine_for(config),
        }
    }
}

/// Write the document into the workspace on the blocking pool and read the
/// bytes back. Any failure leaves the partial file to the workspace cleanup.
async fn serialize_in(
    document: OutputDocument,
    format: crate::config::OutputFormat,
    workspace: PathBuf,
) -> Result<Vec<u8>, ConvertError> {
    let failed = move |detail: String| ConvertError::SerializationFailed {
        format: format.to_string(),
        detail,
    };

    tokio::task::spawn_blocking(move || {
        let path = workspace.join(format!("output.{}", format.extension()));
        writer::write_file(&document, format, &path).map_err(|e| e.to_string())?;
        std::fs::read(&path).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| failed(e.to_string()))?
    .map_err(failed)
}

// ── Free functions over the default (pdfium) converter ───────────────────

/// Convert in-memory PDF bytes.
///
/// # Example
/// ```rust,no_run
/// use pdf2docx::{convert, ConversionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("document.pdf")?;
/// let output = convert(&bytes, &ConversionConfig::default()).await?;
/// std::fs::write("document.docx", &output.bytes)?;
/// # Ok(())
/// # }
/// ```
pub async fn convert(
    bytes: &[u8],
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    Converter::default().convert(bytes, config).await
}

/// Read a local file and convert it.
pub async fn convert_file(
    path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    let doc = input::read_local(path.as_ref()).await?;
    convert(&doc.bytes, config).await
}

/// Convert and write the result to `output_path`.
///
/// The file appears complete or not at all: bytes go to a temp file in the
/// destination directory which is then renamed into place.
pub async fn convert_to_file(
    bytes: &[u8],
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    let output = convert(bytes, config).await?;
    persist_atomically(output_path.as_ref(), &output.bytes).await?;
    Ok(output)
}

/// Convert several documents with the default converter.
pub async fn convert_batch(
    documents: Vec<InputDocument>,
    config: &ConversionConfig,
) -> Result<Vec<BatchItem>, ConvertError> {
    Converter::default().convert_batch(documents, config).await
}

/// Read page count and metadata without converting.
pub async fn inspect(bytes: &[u8]) -> Result<DocumentInfo, ConvertError> {
    Converter::default().inspect(bytes).await
}

/// Synchronous wrapper around [`convert`]. Creates a temporary runtime.
pub fn convert_sync(
    bytes: &[u8],
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ConvertError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(bytes, config))
}

/// Temp file next to `path`, then rename.
pub async fn persist_atomically(path: &Path, bytes: &[u8]) -> Result<(), ConvertError> {
    let path = path.to_path_buf();
    let bytes = bytes.to_vec();
    let target = path.clone();

    tokio::task::spawn_blocking(move || -> Result<(), ConvertError> {
        let write_failed = |source: std::io::Error| ConvertError::OutputWriteFailed {
            path: path.clone(),
            source,
        };

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(write_failed)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(write_failed)?;
        tmp.write_all(&bytes).map_err(write_failed)?;
        tmp.as_file().sync_all().map_err(write_failed)?;
        tmp.persist(&path).map_err(|e| write_failed(e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| ConvertError::Internal(format!("write task panicked: {e}")))??;

    debug!("Wrote {}", target.display());
    Ok(())
}
