//! CLI binary for pdf2docx.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use pdf2docx::convert::{persist_atomically, BatchItem};
use pdf2docx::pipeline::input::{default_output_path, resolve_input};
use pdf2docx::{
    inspect, ConversionConfig, ConversionOutput, ConversionProgressCallback, ConvertError,
    Converter, InputDocument, OutputFormat, ProgressCallback, ScanStatus, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One progress bar reused across documents; pages complete out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_position(0);
        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_stage(&self, stage: Stage) {
        self.bar.set_message(stage.to_string());
    }

    fn on_conversion_start(&self, total_pages: usize) {
        self.errors.store(0, Ordering::SeqCst);
        self.activate_bar(total_pages);
    }

    fn on_page_complete(&self, page_num: usize, total: usize, blocks: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{blocks:>3} blocks")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        self.bar.set_prefix("Writing");
        if failed > 0 {
            self.bar.println(format!(
                "  {} {}/{} pages extracted ({} failed)",
                yellow("⚠"),
                success_count,
                total_pages,
                failed
            ));
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert to report.docx next to the current directory
  pdf2docx report.pdf

  # Specific pages to plain text
  pdf2docx --pages 1-3,5 --format txt report.pdf -o report.txt

  # Batch: several inputs, outputs written into a directory
  pdf2docx a.pdf b.pdf https://example.org/c.pdf -o converted/

  # Scanned document: append OCR text from a vision model
  pdf2docx --ocr --ocr-provider openai --ocr-model gpt-4.1-mini scan.pdf

  # Scan inputs with clamd before converting
  pdf2docx --clamd 127.0.0.1:3310 upload.pdf

  # Page count and metadata only
  pdf2docx --inspect-only report.pdf

EXIT STATUS:
  0 when every document converted, 1 otherwise. Rejected documents print an
  error code: 1 encrypted, 2 corrupted, 3 malware, 4 invalid file type.

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH         libpdfium file or the directory containing it
  OPENAI_API_KEY          OpenAI API key (OCR)
  ANTHROPIC_API_KEY       Anthropic API key (OCR)
  EDGEQUAKE_LLM_PROVIDER  OCR provider override (with EDGEQUAKE_MODEL)
  EDGEQUAKE_MODEL         OCR model override
  RUST_LOG                Log filter, e.g. pdf2docx=debug
"#;

/// Convert PDF files and URLs to DOCX or plain text.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2docx",
    version,
    about = "Convert PDF files and URLs to DOCX or plain text",
    long_about = "Convert PDF documents (local files or URLs) to editable DOCX or plain text. \
Text, tables and embedded images are extracted per page; an optional OCR pass reads \
scanned pages through a vision model. Inputs are type-checked, rejected when password \
protected, and malware-scanned when a clamd endpoint is configured.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file paths or HTTP/HTTPS URLs. More than one enables batch mode.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Output file (single input) or directory (several inputs).
    #[arg(short, long, env = "PDF2DOCX_OUTPUT")]
    output: Option<PathBuf>,

    /// Page selection: all, 5, 3-15, or 1-3,5.
    #[arg(long, env = "PDF2DOCX_PAGES", default_value = "all")]
    pages: String,

    /// JPEG quality for extracted images (1–100).
    #[arg(long, env = "PDF2DOCX_QUALITY", default_value_t = 85,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    /// Output format: docx or txt.
    #[arg(long, env = "PDF2DOCX_FORMAT", default_value = "docx")]
    format: OutputFormat,

    /// Run OCR on a raster of every page and append the text.
    #[arg(long, env = "PDF2DOCX_OCR")]
    ocr: bool,

    /// Vision provider for OCR: openai, anthropic, gemini, ollama, …
    #[arg(long, env = "PDF2DOCX_OCR_PROVIDER")]
    ocr_provider: Option<String>,

    /// Vision model for OCR.
    #[arg(long, env = "PDF2DOCX_OCR_MODEL")]
    ocr_model: Option<String>,

    /// Per-page OCR timeout in seconds.
    #[arg(long, env = "PDF2DOCX_OCR_TIMEOUT", default_value_t = 60)]
    ocr_timeout: u64,

    /// Pages extracted concurrently. Default: available CPUs.
    #[arg(short, long, env = "PDF2DOCX_CONCURRENCY")]
    concurrency: Option<usize>,

    /// clamd endpoint (host:port). Without it, inputs are not malware-scanned.
    #[arg(long, env = "PDF2DOCX_CLAMD")]
    clamd: Option<String>,

    /// Malware scan timeout in seconds.
    #[arg(long, env = "PDF2DOCX_SCAN_TIMEOUT", default_value_t = 30)]
    scan_timeout: u64,

    /// Print a JSON report instead of the human summary.
    #[arg(long, env = "PDF2DOCX_JSON")]
    json: bool,

    /// Print page count and metadata only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2DOCX_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2DOCX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2DOCX_QUIET")]
    quiet: bool,

    /// Directory for per-conversion scratch workspaces. Default: system temp.
    #[arg(long, env = "PDF2DOCX_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2DOCX_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

/// One input's fate, for the summary and the JSON report.
struct Outcome {
    input: String,
    output_path: Option<PathBuf>,
    result: std::result::Result<ConversionOutput, ConvertError>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; RUST_LOG still wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    if cli.inspect_only {
        return run_inspect(&cli).await;
    }

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let bar = progress.is_some();
    let config = build_config(&cli, progress)?;
    let converter = match cli.temp_dir {
        Some(ref dir) => Converter::builder().workspace_root(dir).build(),
        None => Converter::default(),
    };
    let batch = cli.inputs.len() > 1;

    if let (true, Some(dir)) = (batch, cli.output.as_deref()) {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    }

    // ── Load every input, then convert them as one batch ─────────────────
    let extension = config.output_format.extension();
    let mut targets = Vec::with_capacity(cli.inputs.len());
    let mut documents = Vec::with_capacity(cli.inputs.len());
    for input in &cli.inputs {
        match resolve_input(input, cli.download_timeout).await {
            Ok(doc) => {
                targets.push((input.clone(), Ok(output_path_for(&cli, &doc, extension, batch))));
                documents.push(doc);
            }
            Err(e) => targets.push((input.clone(), Err(e))),
        }
    }

    let mut items = converter
        .convert_batch(documents, &config)
        .await
        .context("Batch rejected")?
        .into_iter();

    let mut outcomes = Vec::with_capacity(targets.len());
    for (input, target) in targets {
        let outcome = match target {
            Ok(output_path) => persist_item(items.next(), input, output_path).await,
            Err(e) => Outcome {
                input,
                output_path: None,
                result: Err(e),
            },
        };
        if !cli.json && !cli.quiet {
            print_outcome(&outcome, bar);
        }
        outcomes.push(outcome);
    }

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&json_report(&outcomes))?);
    } else if batch && !cli.quiet {
        eprintln!(
            "{} {}/{} documents converted",
            if failed == 0 { green("✔") } else { yellow("⚠") },
            outcomes.len() - failed,
            outcomes.len()
        );
    }

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn output_path_for(cli: &Cli, doc: &InputDocument, extension: &str, batch: bool) -> PathBuf {
    match (&cli.output, batch) {
        (Some(dir), true) => default_output_path(doc, Some(dir.as_path()), extension),
        (Some(file), false) => file.clone(),
        (None, _) => default_output_path(doc, None, extension),
    }
}

/// Write one converted document to its target path.
async fn persist_item(item: Option<BatchItem>, input: String, output_path: PathBuf) -> Outcome {
    let result = match item {
        Some(BatchItem {
            result: Ok(output), ..
        }) => persist_atomically(&output_path, &output.bytes)
            .await
            .map(|()| output),
        Some(BatchItem { result: Err(e), .. }) => Err(e),
        None => Err(ConvertError::Internal(format!(
            "no batch result for {input}"
        ))),
    };

    Outcome {
        input,
        output_path: result.is_ok().then_some(output_path),
        result,
    }
}

fn print_outcome(outcome: &Outcome, bar_active: bool) {
    match &outcome.result {
        Ok(output) => {
            let s = &output.stats;
            let path = outcome
                .output_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            eprintln!(
                "{}  {}  →  {}",
                if s.failed_pages == 0 { green("✔") } else { yellow("⚠") },
                outcome.input,
                bold(&path),
            );
            eprintln!(
                "   {} pages ({} failed)  {} paragraphs  {} tables  {} images  {}",
                s.pages,
                s.failed_pages,
                s.text_blocks,
                s.tables,
                s.images,
                dim(&format!("{}ms", s.total_duration_ms)),
            );
            if s.warnings > 0 && !bar_active {
                for page in output.pages.iter().filter(|p| !p.warnings.is_empty()) {
                    for w in &page.warnings {
                        eprintln!("   {} {}", yellow("·"), w);
                    }
                }
            }
            if let ScanStatus::Skipped { ref reason } = output.scan {
                eprintln!("   {} not malware-scanned: {}", yellow("⚠"), reason);
            }
        }
        Err(e) => {
            let code = e
                .code()
                .map(|c| format!(" [code {c}]"))
                .unwrap_or_default();
            eprintln!("{}  {}{}  {}", red("✘"), outcome.input, code, red(&e.to_string()));
        }
    }
}

fn json_report(outcomes: &[Outcome]) -> serde_json::Value {
    let documents: Vec<serde_json::Value> = outcomes
        .iter()
        .map(|o| match &o.result {
            Ok(output) => serde_json::json!({
                "input": o.input,
                "output": o.output_path,
                "ok": true,
                "result": output,
            }),
            Err(e) => serde_json::json!({
                "input": o.input,
                "ok": false,
                "error": {
                    "message": e.to_string(),
                    "code": e.code(),
                    "stage": e.stage(),
                },
            }),
        })
        .collect();
    serde_json::json!({ "documents": documents })
}

async fn run_inspect(cli: &Cli) -> Result<()> {
    for input in &cli.inputs {
        let doc = resolve_input(input, cli.download_timeout)
            .await
            .with_context(|| format!("Failed to load {input}"))?;
        let info = inspect(&doc.bytes)
            .await
            .with_context(|| format!("Failed to inspect {input}"))?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:         {}", input);
            if let Some(ref t) = info.title {
                println!("Title:        {}", t);
            }
            if let Some(ref a) = info.author {
                println!("Author:       {}", a);
            }
            println!("Pages:        {}", info.page_count);
            println!("PDF Version:  {}", info.pdf_version);
            if let Some(ref p) = info.producer {
                println!("Producer:     {}", p);
            }
        }
    }
    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .page_range(cli.pages.clone())
        .image_quality(cli.quality)
        .output_format(cli.format)
        .ocr_enabled(cli.ocr)
        .ocr_timeout_secs(cli.ocr_timeout)
        .batch(cli.inputs.len() > 1)
        .scan_timeout_secs(cli.scan_timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(n) = cli.concurrency {
        builder = builder.concurrency(n);
    }
    if let Some(ref p) = cli.ocr_provider {
        builder = builder.ocr_provider(p.clone());
    }
    if let Some(ref m) = cli.ocr_model {
        builder = builder.ocr_model(m.clone());
    }
    if let Some(ref addr) = cli.clamd {
        builder = builder.clamd_address(addr.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
