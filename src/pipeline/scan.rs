//! Malware scanning, the last admission gate.
//!
//! The scanner is a collaborator behind [`MalwareScanner`]. A verdict of
//! [`ScanVerdict::Infected`] rejects the document. A scanner that cannot be
//! reached in time ([`ScanError::is_unreachable`]) is fail-open: the
//! validator admits the document and reports [`ScanStatus::Skipped`]. A
//! scanner that answers with an error (`... ERROR`, a garbled reply, a
//! dropped stream) rejects the document, since the daemon saw the bytes and
//! refused to vouch for them.
//!
//! [`ClamdScanner`] speaks clamd's `INSTREAM` command over TCP:
//!
//! ```text
//! client → "zINSTREAM\0"
//! client → [len: u32 BE][chunk] … [0u32]
//! server → "stream: OK\0" | "stream: <signature> FOUND\0" | "<reason> ERROR\0"
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// clamd's default `StreamMaxLength` is 25 MiB; chunks stay well under it.
const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanVerdict {
    Clean,
    Infected { signature: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("scanner unavailable: {0}")]
    Unavailable(String),

    #[error("scan timed out after {0}s")]
    Timeout(u64),

    #[error("scanner protocol error: {0}")]
    Protocol(String),
}

impl ScanError {
    /// No scanner answered: not configured, connection refused, or timed out.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ScanError::Unavailable(_) | ScanError::Timeout(_))
    }
}

/// Outcome of the malware gate for an admitted document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScanStatus {
    Clean,
    /// The scanner could not give a verdict; the document was admitted anyway.
    Skipped { reason: String },
}

impl ScanStatus {
    pub fn is_skipped(&self) -> bool {
        matches!(self, ScanStatus::Skipped { .. })
    }
}

#[async_trait]
pub trait MalwareScanner: Send + Sync {
    async fn scan(&self, bytes: &[u8]) -> Result<ScanVerdict, ScanError>;
}

/// The scanner used when no endpoint is configured. Always unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledScanner;

#[async_trait]
impl MalwareScanner for DisabledScanner {
    async fn scan(&self, _bytes: &[u8]) -> Result<ScanVerdict, ScanError> {
        Err(ScanError::Unavailable("no scanner configured".to_string()))
    }
}

/// A clamd daemon reached over TCP.
#[derive(Debug, Clone)]
pub struct ClamdScanner {
    address: String,
    timeout: Duration,
}

impl ClamdScanner {
    /// `address` is `host:port`, e.g. `127.0.0.1:3310`.
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }

    async fn exchange(&self, bytes: &[u8]) -> Result<String, ScanError> {
        let mut stream = TcpStream::connect(&self.address)
            .await
            .map_err(|e| ScanError::Unavailable(format!("{}: {}", self.address, e)))?;

        let io = |e: std::io::Error| ScanError::Protocol(e.to_string());

        stream.write_all(b"zINSTREAM\0").await.map_err(io)?;
        for chunk in bytes.chunks(CHUNK_SIZE) {
            stream
                .write_all(&(chunk.len() as u32).to_be_bytes())
                .await
                .map_err(io)?;
            stream.write_all(chunk).await.map_err(io)?;
        }
        stream.write_all(&0u32.to_be_bytes()).await.map_err(io)?;
        stream.flush().await.map_err(io)?;

        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.map_err(io)?;
        Ok(String::from_utf8_lossy(&reply).into_owned())
    }
}

#[async_trait]
impl MalwareScanner for ClamdScanner {
    async fn scan(&self, bytes: &[u8]) -> Result<ScanVerdict, ScanError> {
        debug!("Scanning {} bytes via clamd at {}", bytes.len(), self.address);
        let reply = timeout(self.timeout, self.exchange(bytes))
            .await
            .map_err(|_| ScanError::Timeout(self.timeout.as_secs()))??;
        parse_reply(&reply)
    }
}

fn parse_reply(reply: &str) -> Result<ScanVerdict, ScanError> {
    let reply = reply.trim_end_matches(['\0', '\n', '\r', ' ']);
    let body = reply.strip_prefix("stream: ").unwrap_or(reply);

    if body == "OK" {
        Ok(ScanVerdict::Clean)
    } else if let Some(signature) = body.strip_suffix(" FOUND") {
        Ok(ScanVerdict::Infected {
            signature: signature.trim().to_string(),
        })
    } else if reply.is_empty() {
        Err(ScanError::Protocol("empty reply".to_string()))
    } else {
        Err(ScanError::Protocol(reply.to_string()))
    }
}
