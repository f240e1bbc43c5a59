//! OCR over rendered page rasters.
//!
//! [`OcrEngine`] is the seam; the production engine is [`VisionOcr`], which
//! sends the raster to a vision-capable LLM through `edgequake-llm` and cleans
//! the transcription. When no provider can be resolved the pipeline gets an
//! [`UnavailableOcr`] instead, so enabling OCR without credentials degrades to
//! per-page warnings rather than failing the conversion.

use crate::config::ConversionConfig;
use crate::pipeline::encode::encode_page;
use crate::pipeline::postprocess::clean_ocr_text;
use crate::prompts::OCR_SYSTEM_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use image::DynamicImage;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OcrError {
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),

    #[error("could not encode page raster: {0}")]
    Encode(String),

    #[error("OCR request failed: {0}")]
    Request(String),
}

/// Recognises text in a page raster.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, raster: &DynamicImage) -> Result<String, OcrError>;
}

/// Vision-LLM transcription.
pub struct VisionOcr {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
}

impl VisionOcr {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            temperature: 0.0,
            max_tokens: 4096,
        }
    }

    /// Resolve a provider from the config and environment.
    pub fn from_config(config: &ConversionConfig) -> Result<Self, OcrError> {
        resolve_provider(config).map(Self::new)
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for VisionOcr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionOcr")
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl OcrEngine for VisionOcr {
    async fn recognize(&self, raster: &DynamicImage) -> Result<String, OcrError> {
        let image = encode_page(raster).map_err(|e| OcrError::Encode(e.to_string()))?;
        let messages = vec![
            ChatMessage::system(OCR_SYSTEM_PROMPT),
            ChatMessage::user_with_images("", vec![image]),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(|e| OcrError::Request(e.to_string()))?;

        let text = clean_ocr_text(&response.content);
        debug!("OCR returned {} chars", text.chars().count());
        Ok(text)
    }
}

/// Stand-in used when OCR is enabled but no engine could be built.
#[derive(Debug, Clone)]
pub struct UnavailableOcr {
    reason: String,
}

impl UnavailableOcr {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl OcrEngine for UnavailableOcr {
    async fn recognize(&self, _raster: &DynamicImage) -> Result<String, OcrError> {
        Err(OcrError::Unavailable(self.reason.clone()))
    }
}

/// Build the OCR engine for a conversion, falling back to [`UnavailableOcr`].
pub fn engine_for(config: &ConversionConfig) -> Arc<dyn OcrEngine> {
    match VisionOcr::from_config(config) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            warn!("OCR enabled but no vision provider is available: {}", e);
            Arc::new(UnavailableOcr::new(e.to_string()))
        }
    }
}

/// Resolve the vision provider, from most-specific to least-specific:
///
/// 1. `config.ocr_provider` (+ optional `config.ocr_model`)
/// 2. `EDGEQUAKE_LLM_PROVIDER` and `EDGEQUAKE_MODEL`, both set
/// 3. `OPENAI_API_KEY` set and non-empty → OpenAI
/// 4. [`ProviderFactory::from_env`] auto-detection
fn resolve_provider(config: &ConversionConfig) -> Result<Arc<dyn LLMProvider>, OcrError> {
    if let Some(ref name) = config.ocr_provider {
        let model = config.ocr_model.as_deref().unwrap_or("");
        return create_vision_provider(name, model);
    }

    if let (Ok(provider), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !provider.is_empty() && !model.is_empty() {
            return create_vision_provider(&provider, &model);
        }
    }

    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        if !key.is_empty() {
            let model = config.ocr_model.as_deref().unwrap_or("gpt-4.1-nano");
            return create_vision_provider("openai", model);
        }
    }

    let (llm, _embedding) = ProviderFactory::from_env().map_err(|e| {
        OcrError::Unavailable(format!(
            "no vision provider could be auto-detected ({e}); set OPENAI_API_KEY, \
             ANTHROPIC_API_KEY or pass --ocr-provider"
        ))
    })?;
    Ok(llm)
}

fn create_vision_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, OcrError> {
    let provider = ProviderFactory::create_llm_provider(name, model)
        .map_err(|e| OcrError::Unavailable(format!("provider '{name}': {e}")))?;
    info!("OCR provider: {} (model: {})", name, if model.is_empty() { "default" } else { model });
    Ok(provider)
}
