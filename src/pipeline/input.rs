//! Input resolution: load a user-supplied path or URL into memory.
//!
//! The pipeline works on an in-memory buffer, so both sources end up as an
//! [`InputDocument`]. No type checking happens here; the admission gates in
//! [`crate::pipeline::validate`] own that.

use crate::error::ConvertError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// A document loaded into memory, with a display name for logs and output naming.
#[derive(Debug, Clone)]
pub struct InputDocument {
    /// File name (local path's final component, or the URL's last segment).
    pub name: String,
    pub bytes: Vec<u8>,
}

impl InputDocument {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// The name without its extension, used to derive output file names.
    pub fn stem(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document")
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load a local path or download an HTTP(S) URL.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<InputDocument, ConvertError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(Path::new(input)).await
    }
}

/// Read a local file, mapping the common I/O failures to typed errors.
pub async fn read_local(path: &Path) -> Result<InputDocument, ConvertError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => ConvertError::FileNotFound {
            path: path.to_path_buf(),
        },
        ErrorKind::PermissionDenied => ConvertError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => ConvertError::Internal(format!("failed to read {}: {}", path.display(), e)),
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "document.pdf".to_string());

    debug!("Read local input: {} ({} bytes)", path.display(), bytes.len());
    Ok(InputDocument::new(name, bytes))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<InputDocument, ConvertError> {
    info!("Downloading PDF from: {}", url);

    let failed = |reason: String| ConvertError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ConvertError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            ConvertError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    info!("Downloaded {} bytes", bytes.len());
    Ok(InputDocument::new(filename_from_url(url), bytes.to_vec()))
}

/// Last non-empty URL path segment containing a dot, else `downloaded.pdf`.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded.pdf".to_string()
}

/// Default output path for an input: the input's stem with the format's
/// extension, in `dir` (or the current directory).
pub fn default_output_path(doc: &InputDocument, dir: Option<&Path>, extension: &str) -> PathBuf {
    let file = format!("{}.{}", doc.stem(), extension);
    match dir {
        Some(dir) => dir.join(file),
        None => PathBuf::from(file),
    }
}
