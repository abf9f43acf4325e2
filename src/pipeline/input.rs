//! Input: turn a user-supplied path, URL or dropped file into a
//! [`SourceDocument`], and enforce the single-file selection rules.
//!
//! The selector accepts exactly one file of at most
//! [`crate::config::DEFAULT_MAX_FILE_SIZE`] bytes whose media type is PDF,
//! plain text / CSV or any image. Anything that is not a PDF is still
//! accepted here and fails later in the decode stage.

use crate::error::{ReviewError, SelectionError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// An immutable uploaded document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub name: String,
    pub media_type: String,
    pub bytes: Arc<[u8]>,
}

impl SourceDocument {
    /// Build a document, inferring the media type from the name and bytes.
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        let name = name.into();
        let bytes = bytes.into();
        let media_type = media_type_for(&name, &bytes).to_string();
        Self {
            name,
            media_type,
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_pdf(&self) -> bool {
        self.media_type == "application/pdf"
    }

    /// Read a local file.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ReviewError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ReviewError::NotFound {
                what: format!("file '{}'", path.display()),
            },
            _ => ReviewError::InvalidInput {
                input: path.display().to_string(),
                reason: e.to_string(),
            },
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string());
        debug!("Read {} ({} bytes)", path.display(), bytes.len());
        Ok(Self::new(name, bytes))
    }

    /// Download an HTTP(S) URL into memory.
    pub async fn from_url(url: &str, timeout_secs: u64) -> Result<Self, ReviewError> {
        info!("Downloading document from: {}", url);
        let invalid = |reason: String| ReviewError::InvalidInput {
            input: url.to_string(),
            reason,
        };

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| invalid(e.to_string()))?;

        let response = client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                invalid(format!("download timed out after {timeout_secs}s"))
            } else {
                invalid(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(invalid(format!("HTTP {}", response.status())));
        }

        let name = filename_from_url(url);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| invalid(e.to_string()))?;
        info!("Downloaded {} bytes as '{}'", bytes.len(), name);
        Ok(Self::new(name, bytes.to_vec()))
    }

    /// Resolve a path or URL.
    pub async fn from_input(input: &str, timeout_secs: u64) -> Result<Self, ReviewError> {
        if is_url(input) {
            Self::from_url(input, timeout_secs).await
        } else {
            Self::from_path(PathBuf::from(input)).await
        }
    }
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty() && last.contains('.'))
        .unwrap_or_else(|| "downloaded.pdf".to_string())
}

/// Guess a media type from the file extension, falling back to magic bytes.
pub fn media_type_for(name: &str, bytes: &[u8]) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("txt") | Some("csv") => "text/plain",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ if bytes.starts_with(b"%PDF") => "application/pdf",
        _ if bytes.starts_with(b"\x89PNG") => "image/png",
        _ => "application/octet-stream",
    }
}

/// Media types the selector lets through.
pub fn is_accepted_type(media_type: &str) -> bool {
    media_type == "application/pdf"
        || media_type == "text/plain"
        || media_type.starts_with("image/")
}

/// Accept exactly one file under the size and type constraints.
pub fn select_single(
    mut files: Vec<SourceDocument>,
    max_size: u64,
) -> Result<SourceDocument, SelectionError> {
    let file = match files.len() {
        0 => return Err(SelectionError::NoFile),
        1 => files.remove(0),
        count => return Err(SelectionError::TooManyFiles { count }),
    };
    if file.size() > max_size {
        return Err(SelectionError::TooLarge {
            name: file.name,
            size: file.bytes.len() as u64,
            limit: max_size,
        });
    }
    if !is_accepted_type(&file.media_type) {
        return Err(SelectionError::UnsupportedType {
            name: file.name,
            media_type: file.media_type,
        });
    }
    debug!(
        "Selected '{}' ({}, {})",
        file.name,
        file.media_type,
        format_file_size(file.size())
    );
    Ok(file)
}

/// Human-readable byte count in 1024 units, at most two decimals.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = format!("{value:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(name: &str, len: usize) -> SourceDocument {
        SourceDocument::new(name, vec![0u8; len])
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/cv.pdf"));
        assert!(is_url("http://example.com/cv.pdf"));
        assert!(!is_url("/tmp/cv.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn media_type_from_extension_and_magic() {
        assert_eq!(media_type_for("CV.PDF", b""), "application/pdf");
        assert_eq!(media_type_for("notes.csv", b""), "text/plain");
        assert_eq!(media_type_for("scan.jpeg", b""), "image/jpeg");
        assert_eq!(media_type_for("blob", b"%PDF-1.7"), "application/pdf");
        assert_eq!(media_type_for("blob", b"hello"), "application/octet-stream");
    }

    #[test]
    fn select_requires_exactly_one() {
        assert_eq!(select_single(vec![], 10), Err(SelectionError::NoFile));
        let err = select_single(vec![doc("a.pdf", 1), doc("b.pdf", 1)], 10).unwrap_err();
        assert_eq!(err, SelectionError::TooManyFiles { count: 2 });
    }

    #[test]
    fn select_enforces_size_limit() {
        assert!(select_single(vec![doc("a.pdf", 10)], 10).is_ok());
        let err = select_single(vec![doc("a.pdf", 11)], 10).unwrap_err();
        assert!(matches!(err, SelectionError::TooLarge { size: 11, .. }));
    }

    #[test]
    fn select_rejects_unsupported_type() {
        let err = select_single(vec![doc("a.docx", 1)], 10).unwrap_err();
        assert!(matches!(err, SelectionError::UnsupportedType { .. }));
        assert!(select_single(vec![doc("a.txt", 1)], 10).is_ok());
        assert!(select_single(vec![doc("a.png", 1)], 10).is_ok());
    }

    #[test]
    fn file_size_formatting() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(20 * 1024 * 1024), "20 MB");
        assert_eq!(format_file_size(1_234_567), "1.18 MB");
    }

    #[test]
    fn filename_from_url_fallback() {
        assert_eq!(filename_from_url("https://x.io/files/cv.pdf"), "cv.pdf");
        assert_eq!(filename_from_url("https://x.io/download"), "downloaded.pdf");
    }

    #[tokio::test]
    async fn from_path_missing_file() {
        let err = SourceDocument::from_path("/definitely/not/here.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::NotFound { .. }));
    }

    #[tokio::test]
    async fn from_path_reads_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("cv.pdf");
        std::fs::write(&p, b"%PDF-1.4").unwrap();
        let d = SourceDocument::from_path(&p).await.unwrap();
        assert_eq!(d.name, "cv.pdf");
        assert!(d.is_pdf());
        assert_eq!(d.size(), 8);
    }
}
