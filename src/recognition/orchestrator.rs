//! Provider selection with fallback.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::baidu::BaiduOcrProvider;
use super::dashscope::DashScopeProvider;
use super::error::{ProviderError, RecognizeError};
use super::gemini::GeminiProvider;
use super::http::build_client;
use super::input::{prepare, ImageInput, ImageOptions, PreparedImage};
use super::normalize::{sanitize, DEFAULT_CONFIDENCE};
use super::provider::{ProviderKind, ProviderSet};
use crate::config::Config;
use crate::models::RecognitionResult;

/// Runs recognition requests against the provider set.
#[derive(Clone)]
pub struct Recognizer {
    providers: ProviderSet,
    attempt_timeout: Duration,
    image_options: ImageOptions,
}

impl Recognizer {
    /// Create a new recognizer. Every provider attempt is cut off after
    /// `attempt_timeout`.
    pub fn new(providers: ProviderSet, attempt_timeout: Duration) -> Self {
        Self {
            providers,
            attempt_timeout,
            image_options: ImageOptions::default(),
        }
    }

    pub fn with_image_options(mut self, options: ImageOptions) -> Self {
        self.image_options = options;
        self
    }

    /// Build the real provider set from configuration, sharing one HTTP client.
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let timeout = config.recognition.request_timeout();
        let client = build_client(timeout)?;

        let providers = ProviderSet::new(
            Arc::new(DashScopeProvider::new(config.dashscope.clone(), client.clone())),
            Arc::new(BaiduOcrProvider::new(config.baidu.clone(), client.clone())),
            Arc::new(GeminiProvider::new(config.gemini.clone(), client)),
        );

        Ok(Self::new(providers, timeout).with_image_options(config.recognition.image_options()))
    }

    pub fn providers(&self) -> &ProviderSet {
        &self.providers
    }

    pub fn image_options(&self) -> &ImageOptions {
        &self.image_options
    }

    /// One bounded call to one provider. An empty result counts as a failure;
    /// accepted results are re-sanitized so every caller sees valid records.
    async fn attempt(
        &self,
        kind: ProviderKind,
        image: &PreparedImage,
    ) -> Result<Vec<RecognitionResult>, ProviderError> {
        let provider = self.providers.get(kind);
        let results = tokio::time::timeout(self.attempt_timeout, provider.recognize(image))
            .await
            .map_err(|_| {
                ProviderError::timeout(
                    kind,
                    format!("no response within {:?}", self.attempt_timeout),
                )
            })??;

        if results.is_empty() {
            return Err(ProviderError::empty(kind));
        }
        Ok(results
            .into_iter()
            .map(|r| sanitize(r, DEFAULT_CONFIDENCE))
            .collect())
    }

    /// Recognize with `preferred`, falling back along its chain.
    ///
    /// Fallback only applies to the multimodal providers; the OCR backend's
    /// errors are returned as-is. When every attempt fails the error from the
    /// first attempt is returned.
    pub async fn recognize_with_fallback(
        &self,
        image: &PreparedImage,
        preferred: ProviderKind,
    ) -> Result<Vec<RecognitionResult>, ProviderError> {
        let first_error = match self.attempt(preferred, image).await {
            Ok(results) => {
                debug!("Recognized {} questions with {}", results.len(), preferred);
                return Ok(results);
            }
            Err(e) => e,
        };

        let chain = preferred.fallback_chain();
        if chain.is_empty() {
            warn!("{} failed: {}", preferred, first_error);
            return Err(first_error);
        }

        warn!("{} failed ({}), trying fallback providers", preferred, first_error);
        for &kind in chain {
            match self.attempt(kind, image).await {
                Ok(results) => {
                    info!(
                        "Fallback to {} recognized {} questions",
                        kind,
                        results.len()
                    );
                    return Ok(results);
                }
                Err(e) => warn!("Fallback provider {} failed: {}", kind, e),
            }
        }

        Err(first_error)
    }

    /// Validate, prepare and recognize a caller-supplied image.
    pub async fn recognize_image(
        &self,
        input: &ImageInput,
        preferred: ProviderKind,
    ) -> Result<Vec<RecognitionResult>, RecognizeError> {
        let image = prepare(input, &self.image_options).await?;
        Ok(self.recognize_with_fallback(&image, preferred).await?)
    }
}
