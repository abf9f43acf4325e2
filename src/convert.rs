//! Conversion Pipeline: PDF bytes → PNG artifact + preview URL.
//!
//! ## States
//!
//! ```text
//! Idle → LoadingLibrary → Decoding → Rendering → Encoding → Done
//!              └──────────────┴──────────┴──────────┴──────▶ Failed
//! ```
//!
//! Each stage short-circuits to `Failed` with a [`ConversionError`] naming
//! the stage. [`ConversionPipeline::convert`] never returns a partial
//! artifact: the result is exactly one of [`ConversionResult::Converted`] or
//! [`ConversionResult::Failed`]. No retries happen here; that policy belongs
//! to the caller.

use crate::config::{ReviewConfig, DEFAULT_MAX_PIXELS};
use crate::error::{ConversionError, ReviewError};
use crate::library::LibraryLoader;
use crate::pipeline::encode::{self, ImageArtifact};
use crate::pipeline::input::SourceDocument;
use crate::pipeline::render;
use crate::preview::{PreviewRegistry, PreviewUrl};
use crate::progress::{emit_stage, ProgressCallback};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Scale the pipeline renders at unless configured otherwise.
pub const DEFAULT_SCALE: f32 = 4.0;

/// Where a conversion currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionStage {
    Idle,
    LoadingLibrary,
    Decoding,
    Rendering,
    Encoding,
    Done,
    Failed,
}

/// Outcome of one conversion. Never both, never neither.
#[derive(Debug, Clone)]
pub enum ConversionResult {
    Converted {
        artifact: ImageArtifact,
        preview_url: PreviewUrl,
    },
    Failed {
        error: ConversionError,
    },
}

impl ConversionResult {
    pub fn is_converted(&self) -> bool {
        matches!(self, ConversionResult::Converted { .. })
    }

    pub fn artifact(&self) -> Option<&ImageArtifact> {
        match self {
            ConversionResult::Converted { artifact, .. } => Some(artifact),
            ConversionResult::Failed { .. } => None,
        }
    }

    pub fn preview_url(&self) -> Option<&PreviewUrl> {
        match self {
            ConversionResult::Converted { preview_url, .. } => Some(preview_url),
            ConversionResult::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&ConversionError> {
        match self {
            ConversionResult::Failed { error } => Some(error),
            ConversionResult::Converted { .. } => None,
        }
    }

    pub fn into_result(self) -> Result<(ImageArtifact, PreviewUrl), ConversionError> {
        match self {
            ConversionResult::Converted {
                artifact,
                preview_url,
            } => Ok((artifact, preview_url)),
            ConversionResult::Failed { error } => Err(error),
        }
    }

    /// JSON-friendly view: `{imageUrl, file, error?}`.
    pub fn report(&self) -> ConversionReport {
        match self {
            ConversionResult::Converted {
                artifact,
                preview_url,
            } => ConversionReport {
                image_url: preview_url.to_string(),
                file: Some(ArtifactSummary::from(artifact)),
                error: None,
            },
            ConversionResult::Failed { error } => ConversionReport {
                image_url: String::new(),
                file: None,
                error: Some(error.to_string()),
            },
        }
    }
}

/// Serialisable shape of a [`ConversionResult`].
///
/// A failure reads `{"imageUrl": "", "file": null, "error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionReport {
    pub image_url: String,
    pub file: Option<ArtifactSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub media_type: String,
    pub size: u64,
    pub width: u32,
    pub height: u32,
}

impl From<&ImageArtifact> for ArtifactSummary {
    fn from(a: &ImageArtifact) -> Self {
        Self {
            name: a.name.clone(),
            media_type: a.media_type.clone(),
            size: a.size(),
            width: a.width,
            height: a.height,
        }
    }
}

/// Converts one page of a PDF into a previewable PNG.
#[derive(Clone)]
pub struct ConversionPipeline {
    loader: Arc<LibraryLoader>,
    previews: PreviewRegistry,
    scale: f32,
    page: usize,
    max_pixels: u64,
    progress: Option<ProgressCallback>,
}

impl ConversionPipeline {
    /// Page 1 at [`DEFAULT_SCALE`].
    pub fn new(loader: Arc<LibraryLoader>, previews: PreviewRegistry) -> Self {
        Self {
            loader,
            previews,
            scale: DEFAULT_SCALE,
            page: 1,
            max_pixels: DEFAULT_MAX_PIXELS,
            progress: None,
        }
    }

    pub fn from_config(
        config: &ReviewConfig,
        loader: Arc<LibraryLoader>,
        previews: PreviewRegistry,
    ) -> Self {
        Self {
            loader,
            previews,
            scale: config.scale,
            page: config.page,
            max_pixels: config.max_pixels,
            progress: config.progress_callback.clone(),
        }
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    /// Refuse pages whose viewport exceeds `pixels`.
    pub fn with_max_pixels(mut self, pixels: u64) -> Self {
        self.max_pixels = pixels;
        self
    }

    pub fn with_progress(mut self, cb: ProgressCallback) -> Self {
        self.progress = Some(cb);
        self
    }

    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }

    /// Convert `doc`. The caller owns the returned preview URL and revokes it.
    pub async fn convert(&self, doc: &SourceDocument) -> ConversionResult {
        let start = Instant::now();
        info!("Converting '{}' ({} bytes)", doc.name, doc.size());

        match self.run(doc).await {
            Ok((artifact, preview_url)) => {
                emit_stage(self.progress.as_ref(), ConversionStage::Done);
                info!(
                    "Converted '{}' → '{}' ({}x{} px) in {}ms",
                    doc.name,
                    artifact.name,
                    artifact.width,
                    artifact.height,
                    start.elapsed().as_millis()
                );
                ConversionResult::Converted {
                    artifact,
                    preview_url,
                }
            }
            Err(error) => {
                emit_stage(self.progress.as_ref(), ConversionStage::Failed);
                warn!("{}", error);
                ConversionResult::Failed { error }
            }
        }
    }

    async fn run(&self, doc: &SourceDocument) -> Result<(ImageArtifact, PreviewUrl), ConversionError> {
        // ── Step 1: Library ──────────────────────────────────────────────────
        emit_stage(self.progress.as_ref(), ConversionStage::LoadingLibrary);
        let handle = self.loader.ensure_ready().await?;

        // ── Step 2–3: Decode + render (blocking pool) ────────────────────────
        let surface = render::rasterize(
            &handle,
            Arc::clone(&doc.bytes),
            self.page,
            self.scale,
            self.max_pixels,
            self.progress.clone(),
        )
        .await?;

        // ── Step 4: Encode ──────────────────────────────────────────────────
        emit_stage(self.progress.as_ref(), ConversionStage::Encoding);
        let artifact = encode::export(&surface, &doc.name)?;

        let preview_url = self
            .previews
            .create(Arc::clone(&artifact.bytes), artifact.media_type.clone());
        debug!("Preview registered at {}", preview_url);

        Ok((artifact, preview_url))
    }
}

/// Convert `doc` and write the PNG to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files. The
/// preview URL is revoked before returning since nothing displays it.
pub async fn convert_to_file(
    pipeline: &ConversionPipeline,
    doc: &SourceDocument,
    output_path: impl AsRef<Path>,
) -> Result<ImageArtifact, ReviewError> {
    let (artifact, preview_url) = pipeline.convert(doc).await.into_result()?;
    pipeline.previews().revoke(&preview_url);

    let path = output_path.as_ref();
    let write_err = |e: std::io::Error| ReviewError::Persist {
        key: path.display().to_string(),
        detail: e.to_string(),
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("png.tmp");
    tokio::fs::write(&tmp_path, &artifact.bytes)
        .await
        .map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(write_err)?;

    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadError;
    use crate::library::{LibraryHandle, LibraryProvider};
    use crate::pipeline::render::{PageSize, PdfDoc, PdfEngine};
    use crate::progress::ReviewProgressCallback;
    use async_trait::async_trait;
    use image::{Rgba, RgbaImage};
    use std::sync::Mutex;

    struct Letter;
    struct LetterDoc;

    impl PdfEngine for Letter {
        fn describe(&self) -> String {
            "letter".into()
        }
        fn open<'a>(&'a self, bytes: &'a [u8]) -> Result<Box<dyn PdfDoc + 'a>, String> {
            if bytes.starts_with(b"%PDF") {
                Ok(Box::new(LetterDoc))
            } else {
                Err("not a PDF".into())
            }
        }
    }

    impl PdfDoc for LetterDoc {
        fn page_count(&self) -> usize {
            1
        }
        fn page_size(&self, _: usize) -> Result<PageSize, String> {
            Ok(PageSize {
                width: 6.12,
                height: 7.92,
            })
        }
        fn render(&self, _: usize, w: u32, h: u32) -> Result<RgbaImage, String> {
            Ok(RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255])))
        }
    }

    struct Ready;

    #[async_trait]
    impl LibraryProvider for Ready {
        async fn load(&self) -> Result<LibraryHandle, LoadError> {
            Ok(Arc::new(Letter))
        }
    }

    struct Down;

    #[async_trait]
    impl LibraryProvider for Down {
        async fn load(&self) -> Result<LibraryHandle, LoadError> {
            Err(LoadError::Unavailable("no network".into()))
        }
    }

    #[derive(Default)]
    struct Stages(Mutex<Vec<ConversionStage>>);

    impl ReviewProgressCallback for Stages {
        fn on_stage(&self, stage: ConversionStage) {
            self.0.lock().unwrap().push(stage);
        }
    }

    fn pipeline(provider: Arc<dyn LibraryProvider>) -> ConversionPipeline {
        ConversionPipeline::new(Arc::new(LibraryLoader::new(provider)), PreviewRegistry::new())
    }

    #[tokio::test]
    async fn stages_run_in_order() {
        let stages = Arc::new(Stages::default());
        let p = pipeline(Arc::new(Ready)).with_progress(stages.clone());
        let result = p.convert(&SourceDocument::new("cv.pdf", b"%PDF-1.4".to_vec())).await;
        assert!(result.is_converted());
        assert_eq!(
            *stages.0.lock().unwrap(),
            vec![
                ConversionStage::LoadingLibrary,
                ConversionStage::Decoding,
                ConversionStage::Rendering,
                ConversionStage::Encoding,
                ConversionStage::Done,
            ]
        );
    }

    #[tokio::test]
    async fn success_registers_preview() {
        let p = pipeline(Arc::new(Ready));
        let result = p.convert(&SourceDocument::new("cv.pdf", b"%PDF-1.4".to_vec())).await;
        let url = result.preview_url().expect("preview url");
        let payload = p.previews().resolve(url).expect("live preview");
        assert_eq!(payload.media_type, "image/png");
        assert_eq!(result.artifact().unwrap().width, 24);
    }

    #[tokio::test]
    async fn load_failure_is_reported_as_load_stage() {
        let stages = Arc::new(Stages::default());
        let p = pipeline(Arc::new(Down)).with_progress(stages.clone());
        let result = p.convert(&SourceDocument::new("cv.pdf", b"%PDF".to_vec())).await;
        assert_eq!(result.error().map(|e| e.stage()), Some("load"));
        assert!(result.artifact().is_none());
        assert_eq!(p.previews().live_count(), 0);
        assert_eq!(
            stages.0.lock().unwrap().last(),
            Some(&ConversionStage::Failed)
        );
    }

    #[tokio::test]
    async fn failed_report_shape() {
        let p = pipeline(Arc::new(Ready));
        let result = p.convert(&SourceDocument::new("notes.txt", b"plain".to_vec())).await;
        let json = serde_json::to_value(result.report()).unwrap();
        assert_eq!(json["imageUrl"], "");
        assert!(json["file"].is_null());
        assert!(json["error"].as_str().unwrap().contains("decode"));
    }

    #[tokio::test]
    async fn convert_to_file_writes_png_and_revokes_preview() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("cv.png");
        let p = pipeline(Arc::new(Ready));
        let artifact = convert_to_file(&p, &SourceDocument::new("cv.pdf", b"%PDF".to_vec()), &out)
            .await
            .unwrap();
        let written = std::fs::read(&out).unwrap();
        assert_eq!(written.as_slice(), &*artifact.bytes);
        assert_eq!(p.previews().live_count(), 0);
    }
}
