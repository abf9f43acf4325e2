//! Upload/Analyze Orchestrator.
//!
//! ## Ordering
//!
//! [`ReviewService::analyze`] runs six typed stages, each gated on the
//! previous one through `?`:
//!
//! ```text
//! upload résumé → convert → upload image → persist (feedback "")
//!     → request feedback → parse + persist again
//! ```
//!
//! Every stage reports a status line first (`Uploading the file...`, …).
//! The first failure stops the run and is reported as `Error: <message>`.
//! Nothing is rolled back: a record written in stage 4 stays in the store
//! with empty feedback when stage 5 or 6 fails. The two writes are not
//! atomic with respect to each other.

use crate::auth::{require_auth, AuthProvider};
use crate::config::ReviewConfig;
use crate::convert::ConversionPipeline;
use crate::error::ReviewError;
use crate::inference::{FeedbackProvider, LlmFeedback, NoFeedback};
use crate::library::LibraryLoader;
use crate::pipeline::input::{select_single, SourceDocument};
use crate::pipeline::postprocess::parse_feedback;
use crate::preview::{PreviewRegistry, PreviewUrl};
use crate::progress::emit_status;
use crate::prompts::prepare_instructions;
use crate::record::{Feedback, ResumeRecord};
use crate::store::{BlobStorage, FileKv, KvStore, LocalBlobStorage, NamedBlob, StoredFile};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const STATUS_UPLOADING_FILE: &str = "Uploading the file...";
pub const STATUS_CONVERTING: &str = "Converting to image...";
pub const STATUS_UPLOADING_IMAGE: &str = "Uploading the image...";
pub const STATUS_PREPARING: &str = "Preparing data...";
pub const STATUS_ANALYZING: &str = "Analyzing...";
pub const STATUS_SAVING: &str = "Saving feedback...";
pub const STATUS_COMPLETE: &str = "Analysis complete!";

/// Everything the upload form collects.
#[derive(Debug, Clone)]
pub struct AnalyzeRequest {
    pub company_name: String,
    pub job_title: String,
    pub job_description: String,
    pub file: SourceDocument,
}

/// A stored record opened for viewing.
///
/// Both preview URLs belong to the caller; pass the view to
/// [`ReviewService::close_record`] when done.
#[derive(Debug, Clone)]
pub struct RecordView {
    pub record: ResumeRecord,
    pub resume_url: PreviewUrl,
    pub image_url: PreviewUrl,
    /// `None` while analysis has not completed.
    pub feedback: Option<Map<String, Value>>,
}

pub struct ReviewService {
    config: ReviewConfig,
    loader: Arc<LibraryLoader>,
    pipeline: ConversionPipeline,
    previews: PreviewRegistry,
    blobs: Arc<dyn BlobStorage>,
    kv: Arc<dyn KvStore>,
    feedback: Arc<dyn FeedbackProvider>,
    auth: Option<Arc<dyn AuthProvider>>,
}

impl ReviewService {
    pub fn new(
        config: ReviewConfig,
        loader: Arc<LibraryLoader>,
        blobs: Arc<dyn BlobStorage>,
        kv: Arc<dyn KvStore>,
        feedback: Arc<dyn FeedbackProvider>,
    ) -> Self {
        let previews = PreviewRegistry::new();
        let pipeline = ConversionPipeline::from_config(&config, Arc::clone(&loader), previews.clone());
        Self {
            config,
            loader,
            pipeline,
            previews,
            blobs,
            kv,
            feedback,
            auth: None,
        }
    }

    /// Service over `config.data_dir` with a pdfium loader and the configured
    /// LLM provider.
    pub async fn local(config: ReviewConfig) -> Result<Self, ReviewError> {
        Self::open_local(config, true).await
    }

    /// Like [`Self::local`] but without a model; `analyze` fails at the
    /// feedback stage. For listing and viewing.
    pub async fn local_read_only(config: ReviewConfig) -> Result<Self, ReviewError> {
        Self::open_local(config, false).await
    }

    async fn open_local(config: ReviewConfig, with_model: bool) -> Result<Self, ReviewError> {
        let loader = Arc::new(LibraryLoader::pdfium(Duration::from_secs(
            config.download_timeout_secs,
        )));
        let blobs: Arc<dyn BlobStorage> =
            Arc::new(LocalBlobStorage::new(config.data_dir.join("blobs")));
        let kv: Arc<dyn KvStore> = Arc::new(
            FileKv::open(config.data_dir.join("kv.json"))
                .await
                .map_err(|e| ReviewError::InvalidConfig(e.to_string()))?,
        );
        let feedback: Arc<dyn FeedbackProvider> = if with_model {
            Arc::new(LlmFeedback::from_config(
                &config,
                Arc::clone(&blobs),
                Arc::clone(&loader),
            )?)
        } else {
            Arc::new(NoFeedback)
        };
        info!("Review data under {}", config.data_dir.display());
        Ok(Self::new(config, loader, blobs, kv, feedback))
    }

    /// Gate every entry point behind `auth`.
    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn config(&self) -> &ReviewConfig {
        &self.config
    }

    pub fn loader(&self) -> &Arc<LibraryLoader> {
        &self.loader
    }

    pub fn pipeline(&self) -> &ConversionPipeline {
        &self.pipeline
    }

    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }

    /// Upload, convert, persist and analyse one résumé.
    ///
    /// Returns the record as finally persisted, feedback attached.
    pub async fn analyze(&self, request: AnalyzeRequest) -> Result<ResumeRecord, ReviewError> {
        let outcome = match self.gate("/upload") {
            Ok(()) => self.run_analysis(request).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(record) => {
                self.status(STATUS_COMPLETE);
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_complete(&record.id);
                }
                Ok(record)
            }
            Err(e) => {
                warn!("Analysis stopped: {}", e);
                self.status(&format!("Error: {e}"));
                Err(e)
            }
        }
    }

    async fn run_analysis(&self, request: AnalyzeRequest) -> Result<ResumeRecord, ReviewError> {
        let AnalyzeRequest {
            company_name,
            job_title,
            job_description,
            file,
        } = request;
        let file = select_single(vec![file], self.config.max_file_size)?;

        // ── Stage 1: Upload the original ─────────────────────────────────────
        self.status(STATUS_UPLOADING_FILE);
        let resume = self.upload(NamedBlob::from(&file), "the file").await?;

        // ── Stage 2: Convert ─────────────────────────────────────────────────
        self.status(STATUS_CONVERTING);
        let (artifact, preview_url) = self.pipeline.convert(&file).await.into_result()?;

        // ── Stage 3: Upload the image ────────────────────────────────────────
        self.status(STATUS_UPLOADING_IMAGE);
        let image = self.upload(NamedBlob::from(&artifact), "the image").await;
        self.previews.revoke(&preview_url);
        let image = image?;

        // ── Stage 4: Persist without feedback ────────────────────────────────
        self.status(STATUS_PREPARING);
        let mut record = ResumeRecord::new(
            resume.path.clone(),
            image.path,
            company_name,
            job_title,
            job_description,
        );
        self.persist(&record).await?;

        // ── Stage 5: Request feedback ────────────────────────────────────────
        self.status(STATUS_ANALYZING);
        let instructions = prepare_instructions(&record.job_title, &record.job_description);
        let response = self.feedback.feedback(&resume.path, &instructions).await?;
        let text = response
            .message
            .content
            .text()
            .ok_or_else(|| ReviewError::Inference("no feedback received".into()))?;

        // ── Stage 6: Parse and persist again ─────────────────────────────────
        self.status(STATUS_SAVING);
        let parsed = parse_feedback(text).map_err(|e| ReviewError::Inference(e.to_string()))?;
        record.feedback = Feedback::Ready(parsed);
        self.persist(&record).await?;

        info!("Record {} analysed", record.id);
        Ok(record)
    }

    /// Every stored record. Unparsable values are skipped; a store failure
    /// yields an empty list.
    pub async fn list_records(&self) -> Result<Vec<ResumeRecord>, ReviewError> {
        self.gate("/")?;

        let items = match self.kv.list(&self.config.record_pattern(), true).await {
            Ok(items) => items,
            Err(e) => {
                warn!("Listing records failed: {}", e);
                return Ok(Vec::new());
            }
        };

        let records = items
            .into_iter()
            .filter_map(|item| {
                let value = item.value?;
                match ResumeRecord::from_json(&value) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!("Skipping unreadable record '{}': {}", item.key, e);
                        None
                    }
                }
            })
            .collect::<Vec<_>>();
        debug!("Listed {} records", records.len());
        Ok(records)
    }

    /// Load a record and register previews for its résumé and image.
    pub async fn open_record(&self, id: &str) -> Result<RecordView, ReviewError> {
        self.gate(&format!("/resume/{id}"))?;

        let key = self.config.record_key(id);
        let raw = self
            .kv
            .get(&key)
            .await
            .map_err(|e| ReviewError::Internal(format!("reading '{key}': {e}")))?
            .ok_or_else(|| ReviewError::NotFound {
                what: format!("resume '{id}'"),
            })?;
        let record = ResumeRecord::from_json(&raw)
            .map_err(|e| ReviewError::Internal(format!("record '{key}' is unreadable: {e}")))?;

        let resume_bytes = self
            .blobs
            .read(&record.resume_path)
            .await
            .ok_or_else(|| ReviewError::NotFound {
                what: "resume file".into(),
            })?;
        let image_bytes = self
            .blobs
            .read(&record.image_file)
            .await
            .ok_or_else(|| ReviewError::NotFound {
                what: "image file".into(),
            })?;

        let resume_url = self.previews.create(resume_bytes.into(), "application/pdf");
        let image_url = self.previews.create(image_bytes.into(), "image/png");
        let feedback = record.feedback.as_object().cloned();

        Ok(RecordView {
            record,
            resume_url,
            image_url,
            feedback,
        })
    }

    /// Revoke the previews of a view returned by [`Self::open_record`].
    pub fn close_record(&self, view: &RecordView) {
        self.previews.revoke(&view.resume_url);
        self.previews.revoke(&view.image_url);
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    fn gate(&self, next: &str) -> Result<(), ReviewError> {
        match self.auth {
            Some(ref auth) => require_auth(auth.as_ref(), next),
            None => Ok(()),
        }
    }

    fn status(&self, status: &str) {
        debug!("Status: {}", status);
        emit_status(self.config.progress_callback.as_ref(), status);
    }

    async fn upload(&self, blob: NamedBlob, what: &str) -> Result<StoredFile, ReviewError> {
        let stored = self
            .blobs
            .upload(&[blob])
            .await
            .ok_or_else(|| ReviewError::Upload { what: what.into() })?;
        debug!("Uploaded {} to {}", what, stored.path);
        Ok(stored)
    }

    async fn persist(&self, record: &ResumeRecord) -> Result<(), ReviewError> {
        let key = self.config.record_key(&record.id);
        let value = record
            .to_json()
            .map_err(|e| ReviewError::Internal(format!("serialising record: {e}")))?;
        self.kv
            .set(&key, &value)
            .await
            .map_err(|e| ReviewError::Persist {
                key: key.clone(),
                detail: e.to_string(),
            })?;
        debug!("Persisted {} (feedback pending: {})", key, record.feedback.is_pending());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticAuth;
    use crate::error::LoadError;
    use crate::inference::FeedbackResponse;
    use crate::library::{LibraryHandle, LibraryProvider};
    use crate::pipeline::render::{PageSize, PdfDoc, PdfEngine};
    use crate::progress::ReviewProgressCallback;
    use crate::store::{MemoryBlobStorage, MemoryKv};
    use async_trait::async_trait;
    use image::{Rgba, RgbaImage};
    use std::sync::Mutex;

    struct Tiny;
    struct TinyDoc;

    impl PdfEngine for Tiny {
        fn describe(&self) -> String {
            "tiny".into()
        }
        fn open<'a>(&'a self, bytes: &'a [u8]) -> Result<Box<dyn PdfDoc + 'a>, String> {
            if bytes.starts_with(b"%PDF") {
                Ok(Box::new(TinyDoc))
            } else {
                Err("not a PDF".into())
            }
        }
    }

    impl PdfDoc for TinyDoc {
        fn page_count(&self) -> usize {
            1
        }
        fn page_size(&self, _: usize) -> Result<PageSize, String> {
            Ok(PageSize {
                width: 2.0,
                height: 3.0,
            })
        }
        fn render(&self, _: usize, w: u32, h: u32) -> Result<RgbaImage, String> {
            Ok(RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, 255])))
        }
    }

    struct TinyProvider;

    #[async_trait]
    impl LibraryProvider for TinyProvider {
        async fn load(&self) -> Result<LibraryHandle, LoadError> {
            Ok(Arc::new(Tiny))
        }
    }

    struct Canned(String);

    #[async_trait]
    impl FeedbackProvider for Canned {
        async fn feedback(&self, _: &str, _: &str) -> Result<FeedbackResponse, ReviewError> {
            Ok(FeedbackResponse::text(self.0.clone()))
        }
    }

    #[derive(Default)]
    struct Statuses(Mutex<Vec<String>>);

    impl ReviewProgressCallback for Statuses {
        fn on_status(&self, status: &str) {
            self.0.lock().unwrap().push(status.to_string());
        }
    }

    fn service(reply: &str, statuses: Arc<Statuses>) -> (ReviewService, Arc<MemoryKv>) {
        let config = ReviewConfig::builder()
            .progress_callback(statuses)
            .build()
            .unwrap();
        let kv = Arc::new(MemoryKv::new());
        let svc = ReviewService::new(
            config,
            Arc::new(LibraryLoader::new(Arc::new(TinyProvider))),
            Arc::new(MemoryBlobStorage::new()),
            kv.clone(),
            Arc::new(Canned(reply.to_string())),
        );
        (svc, kv)
    }

    fn request(bytes: &[u8]) -> AnalyzeRequest {
        AnalyzeRequest {
            company_name: "Acme".into(),
            job_title: "Engineer".into(),
            job_description: "Ship it".into(),
            file: SourceDocument::new("cv.pdf", bytes.to_vec()),
        }
    }

    #[tokio::test]
    async fn statuses_follow_the_stage_order() {
        let statuses = Arc::new(Statuses::default());
        let (svc, _) = service(r#"{"overallScore": 90}"#, statuses.clone());
        let record = svc.analyze(request(b"%PDF-1.4")).await.unwrap();
        assert_eq!(record.feedback.overall_score(), Some(90));
        assert_eq!(
            *statuses.0.lock().unwrap(),
            vec![
                STATUS_UPLOADING_FILE,
                STATUS_CONVERTING,
                STATUS_UPLOADING_IMAGE,
                STATUS_PREPARING,
                STATUS_ANALYZING,
                STATUS_SAVING,
                STATUS_COMPLETE,
            ]
        );
        assert_eq!(svc.previews().live_count(), 0);
    }

    #[tokio::test]
    async fn conversion_failure_stops_before_persisting() {
        let statuses = Arc::new(Statuses::default());
        let (svc, kv) = service("{}", statuses.clone());
        let err = svc.analyze(request(b"plain text")).await.unwrap_err();
        assert!(matches!(err, ReviewError::Conversion(_)));
        assert!(kv.list("*", false).await.unwrap().is_empty());
        let last = statuses.0.lock().unwrap().last().cloned().unwrap();
        assert!(last.starts_with("Error: Failed to convert PDF"), "{last}");
    }

    #[tokio::test]
    async fn missing_model_leaves_record_pending() {
        let kv = Arc::new(MemoryKv::new());
        let svc = ReviewService::new(
            ReviewConfig::default(),
            Arc::new(LibraryLoader::new(Arc::new(TinyProvider))),
            Arc::new(MemoryBlobStorage::new()),
            kv.clone(),
            Arc::new(NoFeedback),
        );
        let err = svc.analyze(request(b"%PDF-1.4")).await.unwrap_err();
        assert!(matches!(err, ReviewError::Inference(_)));

        let records = svc.list_records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].feedback.is_pending());
    }

    #[tokio::test]
    async fn open_record_registers_previews() {
        let (svc, _) = service(r#"{"overallScore": 10}"#, Arc::default());
        let record = svc.analyze(request(b"%PDF-1.4")).await.unwrap();

        let view = svc.open_record(&record.id).await.unwrap();
        assert_eq!(view.feedback.as_ref().unwrap()["overallScore"], 10);
        assert_eq!(
            svc.previews().resolve(&view.resume_url).unwrap().media_type,
            "application/pdf"
        );
        assert_eq!(svc.previews().live_count(), 2);
        svc.close_record(&view);
        assert_eq!(svc.previews().live_count(), 0);

        assert!(matches!(
            svc.open_record("missing").await,
            Err(ReviewError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn list_skips_garbage_values() {
        let (svc, kv) = service(r#"{"overallScore": 10}"#, Arc::default());
        svc.analyze(request(b"%PDF-1.4")).await.unwrap();
        kv.set("resume:broken", "not json").await.unwrap();
        kv.set("other:1", "{}").await.unwrap();
        assert_eq!(svc.list_records().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn signed_out_callers_are_sent_to_sign_in() {
        let (svc, _) = service("{}", Arc::default());
        let svc = svc.with_auth(Arc::new(StaticAuth::new(None)));
        match svc.open_record("abc").await {
            Err(ReviewError::NotAuthenticated { next }) => assert_eq!(next, "/resume/abc"),
            other => panic!("expected NotAuthenticated, got {other:?}"),
        }
        assert!(matches!(
            svc.list_records().await,
            Err(ReviewError::NotAuthenticated { .. })
        ));
    }
}
