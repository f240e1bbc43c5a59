//! Admission gates, run before any page is touched.
//!
//! Order is fixed and short-circuits on the first rejection:
//!
//! 1. **Type sniff**: [`MimeSniffer`] over the first 1024 bytes must say
//!    `application/pdf` (code 4 otherwise).
//! 2. **Trial open**: [`DocumentBackend::open`] on the blocking pool, no
//!    extraction. Password protection is code 1, an unparsable container code 2.
//! 3. **Malware scan**: [`MalwareScanner`]. A signature match is code 3. A
//!    scanner that cannot be reached does not block admission; the returned
//!    [`Admission::scan`] says [`ScanStatus::Skipped`]. A scanner that was
//!    reached but failed to scan rejects with [`ConvertError::ScanFailed`].
//!
//! The validator only reads the shared buffer.

use crate::error::ConvertError;
use crate::pipeline::scan::{MalwareScanner, ScanStatus, ScanVerdict};
use crate::pipeline::source::{DocumentBackend, DocumentInfo};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const PDF_MIME: &str = "application/pdf";

/// Bytes handed to the sniffer.
pub const SNIFF_WINDOW: usize = 1024;

/// Identifies a byte stream's media type from its leading bytes.
pub trait MimeSniffer: Send + Sync {
    fn sniff(&self, first_bytes: &[u8]) -> String;
}

/// Signature-based sniffer.
///
/// `%PDF-` is accepted anywhere in the window, as PDF readers tolerate junk
/// before the header. Other formats are matched at offset 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct MagicSniffer;

impl MimeSniffer for MagicSniffer {
    fn sniff(&self, first_bytes: &[u8]) -> String {
        let window = &first_bytes[..first_bytes.len().min(SNIFF_WINDOW)];
        if window.windows(5).any(|w| w == b"%PDF-") {
            return PDF_MIME.to_string();
        }

        const SIGNATURES: &[(&[u8], &str)] = &[
            (b"PK\x03\x04", "application/zip"),
            (b"\x89PNG\r\n\x1a\n", "image/png"),
            (b"\xFF\xD8\xFF", "image/jpeg"),
            (b"GIF8", "image/gif"),
            (b"{\\rtf", "application/rtf"),
            (b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1", "application/x-ole-storage"),
            (b"\x7FELF", "application/x-elf"),
            (b"MZ", "application/x-msdownload"),
        ];
        if let Some((_, mime)) = SIGNATURES.iter().find(|(sig, _)| window.starts_with(sig)) {
            return (*mime).to_string();
        }

        if window.is_empty() {
            "application/x-empty".to_string()
        } else if std::str::from_utf8(window).is_ok() {
            "text/plain".to_string()
        } else {
            "application/octet-stream".to_string()
        }
    }
}

/// What admission learned about a document it let through.
#[derive(Debug, Clone)]
pub struct Admission {
    pub mime: String,
    pub info: DocumentInfo,
    pub scan: ScanStatus,
}

pub struct InputValidator {
    sniffer: Arc<dyn MimeSniffer>,
    backend: Arc<dyn DocumentBackend>,
    scanner: Arc<dyn MalwareScanner>,
}

impl InputValidator {
    pub fn new(
        sniffer: Arc<dyn MimeSniffer>,
        backend: Arc<dyn DocumentBackend>,
        scanner: Arc<dyn MalwareScanner>,
    ) -> Self {
        Self {
            sniffer,
            backend,
            scanner,
        }
    }

    /// Run the gates in order; the first rejection is returned.
    pub async fn admit(&self, bytes: Arc<[u8]>) -> Result<Admission, ConvertError> {
        // ── Gate 1: type sniff ───────────────────────────────────────────
        let window = &bytes[..bytes.len().min(SNIFF_WINDOW)];
        let mime = self.sniffer.sniff(window);
        if mime != PDF_MIME {
            warn!("Rejected: detected {}", mime);
            return Err(ConvertError::InvalidFileType { detected: mime });
        }

        // ── Gate 2: trial open ───────────────────────────────────────────
        let backend = Arc::clone(&self.backend);
        let open_bytes = Arc::clone(&bytes);
        let info = tokio::task::spawn_blocking(move || backend.open(&open_bytes))
            .await
            .map_err(|e| ConvertError::Internal(format!("trial open panicked: {e}")))?
            .map_err(ConvertError::from)?;
        debug!("Trial open passed: {} pages", info.page_count);

        // ── Gate 3: malware scan (fail-open only when unreachable) ───────
        let scan = match self.scanner.scan(&bytes).await {
            Ok(ScanVerdict::Clean) => ScanStatus::Clean,
            Ok(ScanVerdict::Infected { signature }) => {
                warn!("Rejected: malware signature {}", signature);
                return Err(ConvertError::MalwareDetected { signature });
            }
            Err(e) if e.is_unreachable() => {
                warn!("Malware scan skipped, admitting without a verdict: {}", e);
                ScanStatus::Skipped {
                    reason: e.to_string(),
                }
            }
            Err(e) => {
                warn!("Rejected: scanner failed: {}", e);
                return Err(ConvertError::ScanFailed {
                    reason: e.to_string(),
                });
            }
        };

        info!("Admitted: {} pages, scan {:?}", info.page_count, scan);
        Ok(Admission { mime, info, scan })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::scan::ScanError;
    use crate::pipeline::source::{OpenError, SourcePage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct OpenOnlyBackend {
        outcome: Option<OpenError>,
        opens: AtomicUsize,
    }

    impl DocumentBackend for OpenOnlyBackend {
        fn open(&self, _bytes: &[u8]) -> Result<DocumentInfo, OpenError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            match &self.outcome {
                Some(e) => Err(e.clone()),
                None => Ok(DocumentInfo {
                    page_count: 3,
                    ..Default::default()
                }),
            }
        }

        fn visit_pages(
            &self,
            _bytes: &[u8],
            _indices: &[usize],
            _visit: &mut dyn FnMut(usize, Result<&dyn SourcePage, String>),
        ) -> Result<(), String> {
            Err("not used".into())
        }
    }

    struct FixedScanner {
        result: Result<ScanVerdict, ScanError>,
        scans: AtomicUsize,
    }

    impl FixedScanner {
        fn new(result: Result<ScanVerdict, ScanError>) -> Self {
            Self {
                result,
                scans: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MalwareScanner for FixedScanner {
        async fn scan(&self, _bytes: &[u8]) -> Result<ScanVerdict, ScanError> {
            self.scans.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn validator(
        backend: Arc<OpenOnlyBackend>,
        scanner: Arc<FixedScanner>,
    ) -> InputValidator {
        InputValidator::new(Arc::new(MagicSniffer), backend, scanner)
    }

    fn pdf() -> Arc<[u8]> {
        Arc::from(&b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n1 0 obj"[..])
    }

    #[test]
    fn sniffer_recognises_common_types() {
        assert_eq!(MagicSniffer.sniff(b"%PDF-1.4"), PDF_MIME);
        assert_eq!(MagicSniffer.sniff(b"junk\n%PDF-1.4"), PDF_MIME);
        assert_eq!(MagicSniffer.sniff(b"PK\x03\x04rest"), "application/zip");
        assert_eq!(MagicSniffer.sniff(b"\x89PNG\r\n\x1a\n...."), "image/png");
        assert_eq!(MagicSniffer.sniff(b"hello"), "text/plain");
        assert_eq!(MagicSniffer.sniff(b""), "application/x-empty");
    }

    #[test]
    fn header_beyond_window_is_not_seen() {
        let mut bytes = vec![b' '; SNIFF_WINDOW];
        bytes.extend_from_slice(b"%PDF-1.7");
        assert_ne!(MagicSniffer.sniff(&bytes), PDF_MIME);
    }

    #[tokio::test]
    async fn wrong_type_short_circuits_before_backend_and_scanner() {
        let backend = Arc::new(OpenOnlyBackend::default());
        let scanner = Arc::new(FixedScanner::new(Ok(ScanVerdict::Clean)));
        let err = validator(backend.clone(), scanner.clone())
            .admit(Arc::from(&b"PK\x03\x04docx"[..]))
            .await
            .unwrap_err();

        assert_eq!(err.code(), Some(4));
        assert_eq!(backend.opens.load(Ordering::SeqCst), 0);
        assert_eq!(scanner.scans.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn encrypted_is_code_1_and_never_scanned() {
        let backend = Arc::new(OpenOnlyBackend {
            outcome: Some(OpenError::Encrypted),
            ..Default::default()
        });
        let scanner = Arc::new(FixedScanner::new(Ok(ScanVerdict::Clean)));
        let err = validator(backend, scanner.clone())
            .admit(pdf())
            .await
            .unwrap_err();

        assert_eq!(err.code(), Some(1));
        assert_eq!(scanner.scans.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn corrupt_is_code_2() {
        let backend = Arc::new(OpenOnlyBackend {
            outcome: Some(OpenError::Corrupt("no xref".into())),
            ..Default::default()
        });
        let scanner = Arc::new(FixedScanner::new(Ok(ScanVerdict::Clean)));
        let err = validator(backend, scanner).admit(pdf()).await.unwrap_err();
        assert_eq!(err.code(), Some(2));
    }

    #[tokio::test]
    async fn infected_is_code_3() {
        let scanner = Arc::new(FixedScanner::new(Ok(ScanVerdict::Infected {
            signature: "Eicar-Test-Signature".into(),
        })));
        let err = validator(Arc::new(OpenOnlyBackend::default()), scanner)
            .admit(pdf())
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(3));
        assert!(err.to_string().contains("Eicar-Test-Signature"));
    }

    #[tokio::test]
    async fn scanner_failure_fails_open() {
        let scanner = Arc::new(FixedScanner::new(Err(ScanError::Unavailable(
            "connection refused".into(),
        ))));
        let admission = validator(Arc::new(OpenOnlyBackend::default()), scanner)
            .admit(pdf())
            .await
            .unwrap();

        assert!(admission.scan.is_skipped());
        assert_eq!(admission.info.page_count, 3);
    }

    #[tokio::test]
    async fn scanner_error_reply_rejects() {
        let scanner = Arc::new(FixedScanner::new(Err(ScanError::Protocol(
            "INSTREAM size limit exceeded. ERROR".into(),
        ))));
        let err = validator(Arc::new(OpenOnlyBackend::default()), scanner)
            .admit(pdf())
            .await
            .unwrap_err();

        assert!(matches!(err, ConvertError::ScanFailed { .. }), "{err}");
        assert!(err.to_string().contains("size limit exceeded"));
    }

    #[tokio::test]
    async fn scanner_timeout_fails_open() {
        let scanner = Arc::new(FixedScanner::new(Err(ScanError::Timeout(30))));
        let admission = validator(Arc::new(OpenOnlyBackend::default()), scanner)
            .admit(pdf())
            .await
            .unwrap();
        assert!(admission.scan.is_skipped());
    }

    #[tokio::test]
    async fn clean_document_is_admitted() {
        let admission = validator(
            Arc::new(OpenOnlyBackend::default()),
            Arc::new(FixedScanner::new(Ok(ScanVerdict::Clean))),
        )
        .admit(pdf())
        .await
        .unwrap();
        assert_eq!(admission.scan, ScanStatus::Clean);
        assert_eq!(admission.mime, PDF_MIME);
    }
}
