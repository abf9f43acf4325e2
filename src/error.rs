//! Error types for the resume-review library.
//!
//! Three layers, one per boundary:
//!
//! * [`LoadError`]: the rendering library could not be made ready. Cloneable
//!   because a single in-flight load hands its outcome to every waiter.
//!
//! * [`ConversionError`]: a stage of the PDF → image conversion failed.
//!   Every variant's message names the stage and carries the underlying
//!   cause. The conversion pipeline never lets one of these escape as a
//!   panic; it is folded into [`crate::convert::ConversionResult::Failed`].
//!
//! * [`ReviewError`]: the upload/analyse orchestrator stopped. The
//!   orchestrator only turns these into status strings; it does not branch
//!   on the kind.

use thiserror::Error;

/// The rendering library could not be loaded or bound.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    /// The library binary could not be located or downloaded.
    #[error("rendering library unavailable: {0}")]
    Unavailable(String),

    /// The binary was found but did not expose the expected entry points.
    #[error("rendering library could not be bound: {0}")]
    Bind(String),

    /// The loader task itself died.
    #[error("rendering library load was interrupted: {0}")]
    Interrupted(String),
}

/// A failure in one stage of the PDF → image conversion.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConversionError {
    #[error("Failed to convert PDF: library load failed: {0}")]
    Load(#[from] LoadError),

    /// Empty, corrupt or non-PDF input.
    #[error("Failed to convert PDF: decode failed: {detail}")]
    Decode { detail: String },

    /// The requested page does not exist (1-indexed).
    #[error("Failed to convert PDF: page {page} is out of range (document has {total} pages)")]
    PageRange { page: usize, total: usize },

    #[error("Failed to convert PDF: render failed on page {page}: {detail}")]
    Render { page: usize, detail: String },

    /// The encoder produced no payload.
    #[error("Failed to convert PDF: encode failed: {detail}")]
    Encode { detail: String },
}

impl ConversionError {
    /// Short name of the stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            ConversionError::Load(_) => "load",
            ConversionError::Decode { .. } => "decode",
            ConversionError::PageRange { .. } => "page",
            ConversionError::Render { .. } => "render",
            ConversionError::Encode { .. } => "encode",
        }
    }
}

/// Why a single candidate could not be accepted by the file selector.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("No file selected")]
    NoFile,

    #[error("Only one file may be selected, got {count}")]
    TooManyFiles { count: usize },

    #[error("File '{name}' is {size} bytes; the limit is {limit} bytes")]
    TooLarge { name: String, size: u64, limit: u64 },

    #[error("File '{name}' has unsupported type '{media_type}'")]
    UnsupportedType { name: String, media_type: String },

    #[error("File '{name}' could not be read: {detail}")]
    Unreadable { name: String, detail: String },
}

/// Errors returned by the orchestrator and the collaborators around it.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("failed to upload {what}")]
    Upload { what: String },

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("failed to persist '{key}': {detail}")]
    Persist { key: String, detail: String },

    /// No feedback, or feedback that could not be parsed.
    #[error("feedback unavailable: {0}")]
    Inference(String),

    #[error("{what} not found")]
    NotFound { what: String },

    /// Caller must sign in and then continue at `next`.
    #[error("authentication required (continue at '{next}')")]
    NotAuthenticated { next: String },

    #[error(transparent)]
    Selection(#[from] SelectionError),

    /// The input string is neither a readable path nor an HTTP(S) URL.
    #[error("invalid input '{input}': {reason}")]
    InvalidInput { input: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_messages_name_the_stage() {
        let e = ConversionError::Decode {
            detail: "bad xref".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("decode"), "got: {msg}");
        assert!(msg.contains("bad xref"), "got: {msg}");
        assert_eq!(e.stage(), "decode");
    }

    #[test]
    fn load_error_wraps_into_conversion() {
        let e: ConversionError = LoadError::Unavailable("offline".into()).into();
        assert_eq!(e.stage(), "load");
        assert!(e.to_string().contains("offline"));
    }

    #[test]
    fn page_range_display() {
        let e = ConversionError::PageRange { page: 3, total: 1 };
        assert!(e.to_string().contains("page 3"));
        assert!(e.to_string().contains("1 pages"));
    }

    #[test]
    fn too_large_display() {
        let e = SelectionError::TooLarge {
            name: "cv.pdf".into(),
            size: 30,
            limit: 20,
        };
        assert!(e.to_string().contains("cv.pdf"));
    }

    #[test]
    fn review_error_is_transparent_over_conversion() {
        let inner = ConversionError::Encode {
            detail: "empty".into(),
        };
        let outer: ReviewError = inner.clone().into();
        assert_eq!(outer.to_string(), inner.to_string());
    }
}
