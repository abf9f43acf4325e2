//! Feedback collaborator: résumé + instructions → model reply.
//!
//! The reply arrives as `{message: {content}}` where `content` is either a
//! plain string or an array of parts with a `text` field. [`MessageContent`]
//! models both shapes and [`MessageContent::text`] collapses them, so the
//! orchestrator never branches on the shape.
//!
//! [`LlmFeedback`] is the production implementation over an
//! `edgequake_llm` vision provider.

use crate::config::ReviewConfig;
use crate::error::ReviewError;
use crate::library::LibraryLoader;
use crate::pipeline::{encode, render};
use crate::prompts::FEEDBACK_SYSTEM_PROMPT;
use crate::store::BlobStorage;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Default model when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Produces feedback for a stored résumé.
#[async_trait]
pub trait FeedbackProvider: Send + Sync {
    /// `file_ref` is the blob-storage path of the original résumé.
    async fn feedback(&self, file_ref: &str, instructions: &str) -> Result<FeedbackResponse, ReviewError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackResponse {
    pub message: FeedbackMessage,
}

impl FeedbackResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            message: FeedbackMessage {
                content: MessageContent::Text(content.into()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackMessage {
    pub content: MessageContent,
}

/// `content` as either shape the collaborator may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

impl MessageContent {
    /// The reply text: the string itself, or the first part's text.
    ///
    /// `None` when there is no text at all or it is blank.
    pub fn text(&self) -> Option<&str> {
        let text = match self {
            MessageContent::Text(s) => s.as_str(),
            MessageContent::Parts(parts) => parts.first()?.text.as_deref()?,
        };
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Stand-in when no model is configured.
pub struct NoFeedback;

#[async_trait]
impl FeedbackProvider for NoFeedback {
    async fn feedback(&self, _file_ref: &str, _instructions: &str) -> Result<FeedbackResponse, ReviewError> {
        Err(ReviewError::Inference("no LLM provider configured".into()))
    }
}

// ── LLM-backed provider ──────────────────────────────────────────────────────

/// Sends page 1 of the stored résumé to a vision model.
pub struct LlmFeedback {
    provider: Arc<dyn LLMProvider>,
    blobs: Arc<dyn BlobStorage>,
    loader: Arc<LibraryLoader>,
    scale: f32,
    max_pixels: u64,
    options: CompletionOptions,
    timeout: Duration,
}

impl LlmFeedback {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        blobs: Arc<dyn BlobStorage>,
        loader: Arc<LibraryLoader>,
        config: &ReviewConfig,
    ) -> Self {
        Self {
            provider,
            blobs,
            loader,
            scale: config.inference_scale,
            max_pixels: config.max_pixels,
            options: build_options(config),
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    /// Resolve the provider from `config` (see [`resolve_provider`]).
    pub fn from_config(
        config: &ReviewConfig,
        blobs: Arc<dyn BlobStorage>,
        loader: Arc<LibraryLoader>,
    ) -> Result<Self, ReviewError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, blobs, loader, config))
    }
}

#[async_trait]
impl FeedbackProvider for LlmFeedback {
    async fn feedback(&self, file_ref: &str, instructions: &str) -> Result<FeedbackResponse, ReviewError> {
        let start = Instant::now();

        let bytes = self
            .blobs
            .read(file_ref)
            .await
            .ok_or_else(|| ReviewError::Inference(format!("résumé not readable at '{file_ref}'")))?;

        let handle = self
            .loader
            .ensure_ready()
            .await
            .map_err(|e| ReviewError::Inference(e.to_string()))?;
        let surface = render::rasterize(&handle, bytes.into(), 1, self.scale, self.max_pixels, None)
            .await
            .map_err(|e| ReviewError::Inference(e.to_string()))?;
        let image = encode::encode_for_vision(&surface.image)
            .map_err(|e| ReviewError::Inference(format!("image encoding failed: {e}")))?;

        let messages = vec![
            ChatMessage::system(FEEDBACK_SYSTEM_PROMPT),
            ChatMessage::user_with_images(instructions, vec![image]),
        ];

        let response = tokio::time::timeout(self.timeout, self.provider.chat(&messages, Some(&self.options)))
            .await
            .map_err(|_| ReviewError::Inference(format!("model timed out after {:?}", self.timeout)))?
            .map_err(|e| ReviewError::Inference(e.to_string()))?;

        info!(
            "Feedback received: {} input tokens, {} output tokens, {}ms",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed().as_millis()
        );
        debug!("Feedback reply is {} chars", response.content.len());

        Ok(FeedbackResponse::text(response.content))
    }
}

fn build_options(config: &ReviewConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn create_vision_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ReviewError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ReviewError::InvalidConfig(format!("provider '{provider_name}' is not configured: {e}"))
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. `config.provider`, used as-is.
/// 2. `config.provider_name` with `config.model` (or [`DEFAULT_MODEL`]).
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set.
/// 4. OpenAI when `OPENAI_API_KEY` is set.
/// 5. `ProviderFactory::from_env` auto-detection.
pub fn resolve_provider(config: &ReviewConfig) -> Result<Arc<dyn LLMProvider>, ReviewError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) = ProviderFactory::from_env().map_err(|e| {
        ReviewError::InvalidConfig(format!(
            "No LLM provider could be auto-detected from environment.\n\
             Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
             Error: {}",
            e
        ))
    })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_content_parses() {
        let r: FeedbackResponse =
            serde_json::from_str(r#"{"message":{"content":"{\"overallScore\":1}"}}"#).unwrap();
        assert_eq!(r.message.content.text(), Some("{\"overallScore\":1}"));
    }

    #[test]
    fn array_content_uses_first_part() {
        let r: FeedbackResponse = serde_json::from_str(
            r#"{"message":{"content":[{"type":"text","text":"{\"overallScore\":1}"},{"text":"ignored"}]}}"#,
        )
        .unwrap();
        assert_eq!(r.message.content.text(), Some("{\"overallScore\":1}"));
    }

    #[test]
    fn empty_content_has_no_text() {
        assert_eq!(MessageContent::Text("  ".into()).text(), None);
        assert_eq!(MessageContent::Parts(vec![]).text(), None);
        assert_eq!(
            MessageContent::Parts(vec![ContentPart {
                kind: Some("image".into()),
                text: None
            }])
            .text(),
            None
        );
    }

    #[test]
    fn build_options_defaults() {
        let config = ReviewConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(4096));
    }
}
