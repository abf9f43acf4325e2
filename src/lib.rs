//! # resume-review
//!
//! Turn a résumé PDF into a previewable image, store both, and attach
//! vision-model feedback to a persisted record.
//!
//! ## Pipeline Overview
//!
//! ```text
//! résumé
//!  │
//!  ├─ 1. Select   exactly one file, ≤ 20 MiB, PDF / text / image
//!  ├─ 2. Upload   original into blob storage
//!  ├─ 3. Convert  load pdfium once → decode → render page 1 at 4× → PNG
//!  ├─ 4. Upload   the PNG
//!  ├─ 5. Persist  record under `resume:<id>` with feedback ""
//!  ├─ 6. Analyse  page image + instructions → vision model
//!  └─ 7. Persist  the same record again with the parsed feedback
//! ```
//!
//! The rendering library is loaded lazily by [`LibraryLoader`]: the first
//! conversion downloads (or finds) the pinned pdfium build, binds it, and
//! every later conversion reuses the handle. Concurrent first calls share
//! one load.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resume_review::{LibraryLoader, ConversionPipeline, PreviewRegistry, SourceDocument};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let loader = Arc::new(LibraryLoader::pdfium(Duration::from_secs(120)));
//!     let pipeline = ConversionPipeline::new(loader, PreviewRegistry::new());
//!
//!     let doc = SourceDocument::from_path("report.pdf").await?;
//!     let (artifact, preview) = pipeline.convert(&doc).await.into_result()?;
//!     println!("{} ({}x{}) at {}", artifact.name, artifact.width, artifact.height, preview);
//!     pipeline.previews().revoke(&preview);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `resume-review` binary (clap + anyhow + indicatif + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod auth;
pub mod config;
pub mod convert;
pub mod error;
pub mod inference;
pub mod library;
pub mod pipeline;
pub mod preview;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod review;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use auth::{require_auth, AuthProvider, StaticAuth};
pub use config::{ReviewConfig, ReviewConfigBuilder};
pub use convert::{convert_to_file, ConversionPipeline, ConversionReport, ConversionResult, ConversionStage};
pub use error::{ConversionError, LoadError, ReviewError, SelectionError};
pub use inference::{FeedbackProvider, FeedbackResponse, LlmFeedback, MessageContent};
pub use library::{LibraryHandle, LibraryLoader, LibraryProvider, LoaderStatus, PdfiumProvider};
pub use pipeline::encode::ImageArtifact;
pub use pipeline::input::{format_file_size, select_single, SourceDocument};
pub use pipeline::render::{PdfDoc, PdfEngine, PageSize, RasterSurface};
pub use preview::{PreviewRegistry, PreviewUrl};
pub use progress::{NoopProgressCallback, ProgressCallback, ReviewProgressCallback};
pub use record::{Feedback, ResumeRecord};
pub use review::{AnalyzeRequest, RecordView, ReviewService};
pub use store::{BlobStorage, FileKv, KvStore, LocalBlobStorage, MemoryBlobStorage, MemoryKv};
