//! Configuration for conversion and review runs.
//!
//! Every knob lives on [`ReviewConfig`], built through
//! [`ReviewConfigBuilder`]. Conversion, storage and inference all read from
//! the same struct so a single value can be cloned into each collaborator.

use crate::error::ReviewError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Upper bound on an accepted upload, in bytes (20 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 20 * 1024 * 1024;

/// Raster budget per page, in pixels. A letter page at 4× is about 7.8 Mpx.
pub const DEFAULT_MAX_PIXELS: u64 = 40_000_000;

/// Key prefix under which résumé records are stored.
pub const DEFAULT_KEY_PREFIX: &str = "resume:";

/// Configuration for the review pipeline.
///
/// # Example
/// ```rust
/// use resume_review::ReviewConfig;
///
/// let config = ReviewConfig::builder()
///     .scale(4.0)
///     .data_dir("/tmp/resume-review")
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// assert_eq!(config.page, 1);
/// ```
#[derive(Clone)]
pub struct ReviewConfig {
    /// Viewport scale applied to the page's intrinsic size in points. Default: 4.0.
    ///
    /// A 612×792 pt letter page becomes a 2448×3168 px preview. Range 0.5–8.0.
    pub scale: f32,

    /// 1-indexed page that is rasterised. Default: 1.
    pub page: usize,

    /// Largest raster, in pixels (width × height), a page may request. Default: 40 Mpx.
    ///
    /// Pages whose viewport exceeds it fail at the render stage instead of
    /// being downscaled.
    pub max_pixels: u64,

    /// Largest file the selector accepts, in bytes. Default: 20 MiB.
    pub max_file_size: u64,

    /// Key prefix for persisted records. Default: `resume:`.
    pub key_prefix: String,

    /// Scale used when rasterising the stored résumé for the vision model. Default: 2.0.
    ///
    /// Lower than [`Self::scale`]: the model needs legible text, not a
    /// print-sized bitmap, and every extra pixel costs input tokens.
    pub inference_scale: f32,

    /// LLM model identifier. If None, the provider default is used.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate for one review. Default: 4096.
    pub max_tokens: usize,

    /// Timeout for one feedback call in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Root directory of the local blob and key-value stores.
    pub data_dir: PathBuf,

    /// Receives stage and status events. Default: None.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            scale: 4.0,
            page: 1,
            max_pixels: DEFAULT_MAX_PIXELS,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            inference_scale: 2.0,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            api_timeout_secs: 120,
            download_timeout_secs: 120,
            data_dir: default_data_dir(),
            progress_callback: None,
        }
    }
}

fn default_data_dir() -> PathBuf {
    std::env::temp_dir().join("resume-review")
}

impl fmt::Debug for ReviewConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReviewConfig")
            .field("scale", &self.scale)
            .field("page", &self.page)
            .field("max_pixels", &self.max_pixels)
            .field("max_file_size", &self.max_file_size)
            .field("key_prefix", &self.key_prefix)
            .field("inference_scale", &self.inference_scale)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("data_dir", &self.data_dir)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl ReviewConfig {
    pub fn builder() -> ReviewConfigBuilder {
        ReviewConfigBuilder {
            config: Self::default(),
        }
    }

    /// Key under which the record with `id` is stored.
    pub fn record_key(&self, id: &str) -> String {
        format!("{}{}", self.key_prefix, id)
    }

    /// Glob matching every record key.
    pub fn record_pattern(&self) -> String {
        format!("{}*", self.key_prefix)
    }
}

/// Builder for [`ReviewConfig`].
#[derive(Debug)]
pub struct ReviewConfigBuilder {
    config: ReviewConfig,
}

impl ReviewConfigBuilder {
    pub fn scale(mut self, scale: f32) -> Self {
        self.config.scale = scale;
        self
    }

    pub fn page(mut self, page: usize) -> Self {
        self.config.page = page;
        self
    }

    pub fn max_pixels(mut self, pixels: u64) -> Self {
        self.config.max_pixels = pixels;
        self
    }

    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.key_prefix = prefix.into();
        self
    }

    pub fn inference_scale(mut self, scale: f32) -> Self {
        self.config.inference_scale = scale;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ReviewConfig, ReviewError> {
        let c = &self.config;
        for (name, value) in [("scale", c.scale), ("inference scale", c.inference_scale)] {
            if !value.is_finite() || !(0.5..=8.0).contains(&value) {
                return Err(ReviewError::InvalidConfig(format!(
                    "{name} must be 0.5–8.0, got {value}"
                )));
            }
        }
        if c.page == 0 {
            return Err(ReviewError::InvalidConfig(
                "pages are 1-indexed, got 0".into(),
            ));
        }
        if c.max_pixels == 0 {
            return Err(ReviewError::InvalidConfig(
                "max pixels must be > 0".into(),
            ));
        }
        if c.max_file_size == 0 {
            return Err(ReviewError::InvalidConfig(
                "max file size must be > 0".into(),
            ));
        }
        if c.key_prefix.is_empty() || c.key_prefix.contains('*') {
            return Err(ReviewError::InvalidConfig(format!(
                "key prefix must be non-empty and contain no '*', got {:?}",
                c.key_prefix
            )));
        }
        Ok(self.config)
    }
}
