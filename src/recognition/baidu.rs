//! Baidu general OCR (accurate edition) backend.
//!
//! Baidu only returns text, so subject, difficulty and question boundaries
//! are guessed with [`super::ocr_text`] heuristics. Requests need an OAuth
//! access token which is cached until shortly before it expires.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::error::{ProviderError, ProviderErrorKind};
use super::http::{check_status, read_json, send_error};
use super::input::PreparedImage;
use super::ocr_text::build_results;
use super::provider::{ProviderKind, RecognitionProvider};
use crate::models::RecognitionResult;

const KIND: ProviderKind = ProviderKind::BaiduOcr;

/// Tokens are treated as expired this long before Baidu says they are.
pub const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Baidu error codes for an invalid or expired access token.
const INVALID_TOKEN_CODES: [i64; 2] = [110, 111];

/// Configuration for the Baidu OCR backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaiduConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    /// OAuth token endpoint.
    #[serde(default = "default_token_url")]
    pub token_url: String,
    /// OCR endpoint (access token is appended as a query parameter).
    #[serde(default = "default_ocr_url")]
    pub ocr_url: String,
    /// Confidence reported for every result; subject and difficulty are guesses.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_token_url() -> String {
    "https://aip.baidubce.com/oauth/2.0/token".to_string()
}

fn default_ocr_url() -> String {
    "https://aip.baidubce.com/rest/2.0/ocr/v1/accurate_basic".to_string()
}

fn default_confidence() -> f64 {
    0.75
}

impl Default for BaiduConfig {
    fn default() -> Self {
        Self::base_default().with_env_overrides()
    }
}

impl BaiduConfig {
    fn base_default() -> Self {
        Self {
            api_key: None,
            secret_key: None,
            token_url: default_token_url(),
            ocr_url: default_ocr_url(),
            confidence: default_confidence(),
        }
    }

    pub fn is_default(&self) -> bool {
        *self == Self::base_default()
    }

    /// Apply `BAIDU_API_KEY` and `BAIDU_SECRET_KEY`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("BAIDU_API_KEY") {
            self.api_key = Some(key);
        }
        if let Ok(key) = std::env::var("BAIDU_SECRET_KEY") {
            self.secret_key = Some(key);
        }
        self
    }

    fn credentials(&self) -> Option<(&str, &str)> {
        match (self.api_key.as_deref(), self.secret_key.as_deref()) {
            (Some(key), Some(secret)) if !key.is_empty() && !secret.is_empty() => {
                Some((key, secret))
            }
            _ => None,
        }
    }
}

/// A freshly issued access token.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_in: Duration,
}

#[derive(Debug)]
struct CachedToken {
    token: String,
    refresh_at: Instant,
}

/// Process-wide access token cache.
///
/// The lock is held across a refresh so concurrent callers share one fetch.
#[derive(Debug, Default)]
pub struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached token, fetching a new one if it is missing or
    /// within [`TOKEN_REFRESH_MARGIN`] of expiry.
    pub async fn refresh_if_expired<F, Fut>(&self, fetch: F) -> Result<String, ProviderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AccessToken, ProviderError>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref() {
            if Instant::now() < cached.refresh_at {
                return Ok(cached.token.clone());
            }
        }

        let fresh = fetch().await?;
        let lifetime = fresh.expires_in.saturating_sub(TOKEN_REFRESH_MARGIN);
        debug!("Cached Baidu access token for {:?}", lifetime);
        *slot = Some(CachedToken {
            token: fresh.token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(fresh.token)
    }

    /// Drop the cached token so the next call fetches a new one.
    pub async fn invalidate(&self) {
        self.slot.lock().await.take();
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
    error_description: Option<String>,
}

impl TokenResponse {
    fn into_token(self) -> Result<AccessToken, ProviderError> {
        match self.access_token {
            Some(token) if !token.is_empty() => Ok(AccessToken {
                token,
                expires_in: Duration::from_secs(self.expires_in.unwrap_or_default()),
            }),
            _ => Err(ProviderError::auth(
                KIND,
                format!(
                    "token request rejected: {} {}",
                    self.error.unwrap_or_default(),
                    self.error_description.unwrap_or_default()
                )
                .trim()
                .to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    words_result: Vec<OcrWords>,
    error_code: Option<i64>,
    error_msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OcrWords {
    words: String,
}

/// Pull the recognized text out of an OCR response, one line per word block.
fn ocr_text(response: OcrResponse) -> Result<String, ProviderError> {
    if let Some(code) = response.error_code {
        let message = format!(
            "error {}: {}",
            code,
            response.error_msg.unwrap_or_default()
        );
        return Err(if INVALID_TOKEN_CODES.contains(&code) {
            ProviderError::auth(KIND, message)
        } else {
            ProviderError::http(KIND, message)
        });
    }

    let text = response
        .words_result
        .into_iter()
        .map(|w| w.words)
        .collect::<Vec<_>>()
        .join("\n");

    if text.trim().is_empty() {
        return Err(ProviderError::empty(KIND));
    }
    Ok(text)
}

/// Baidu OCR recognition backend.
pub struct BaiduOcrProvider {
    config: BaiduConfig,
    client: Client,
    tokens: TokenCache,
}

impl BaiduOcrProvider {
    /// Create a new Baidu backend sharing `client`.
    pub fn new(config: BaiduConfig, client: Client) -> Self {
        Self {
            config,
            client,
            tokens: TokenCache::new(),
        }
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        let (api_key, secret_key) = self.config.credentials().ok_or_else(|| {
            ProviderError::auth(KIND, "BAIDU_API_KEY or BAIDU_SECRET_KEY not set")
        })?;
        self.tokens
            .refresh_if_expired(|| self.fetch_token(api_key, secret_key))
            .await
    }

    async fn fetch_token(
        &self,
        api_key: &str,
        secret_key: &str,
    ) -> Result<AccessToken, ProviderError> {
        info!("Requesting Baidu access token");
        let response = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", api_key),
                ("client_secret", secret_key),
            ])
            .send()
            .await
            .map_err(|e| send_error(KIND, e))?;
        let response = check_status(KIND, response).await?;
        read_json::<TokenResponse>(KIND, response).await?.into_token()
    }

    async fn run_ocr(&self, image: &PreparedImage) -> Result<String, ProviderError> {
        let token = self.access_token().await?;

        let response = self
            .client
            .post(&self.config.ocr_url)
            .query(&[("access_token", token.as_str())])
            .form(&[
                ("image", image.base64.as_str()),
                ("language_type", "CHN_ENG"),
                ("detect_direction", "true"),
                ("paragraph", "true"),
            ])
            .send()
            .await
            .map_err(|e| send_error(KIND, e))?;
        let response = check_status(KIND, response).await?;
        let body: OcrResponse = read_json(KIND, response).await?;

        match ocr_text(body) {
            Err(e) if e.kind == ProviderErrorKind::Auth => {
                warn!("Baidu rejected access token, clearing cache");
                self.tokens.invalidate().await;
                Err(e)
            }
            other => other,
        }
    }
}

#[async_trait]
impl RecognitionProvider for BaiduOcrProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    fn is_configured(&self) -> bool {
        self.config.credentials().is_some()
    }

    fn availability_hint(&self) -> String {
        if self.is_configured() {
            "Baidu OCR is available (accurate_basic)".to_string()
        } else {
            "BAIDU_API_KEY and BAIDU_SECRET_KEY not set. Create an OCR app at \
             https://console.bce.baidu.com/ai/"
                .to_string()
        }
    }

    async fn recognize(
        &self,
        image: &PreparedImage,
    ) -> Result<Vec<RecognitionResult>, ProviderError> {
        let text = self.run_ocr(image).await?;
        debug!("Baidu OCR returned {} chars", text.chars().count());

        let results = build_results(&text, self.config.confidence);
        if results.is_empty() {
            return Err(ProviderError::empty(KIND));
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn token(expires_in: u64) -> AccessToken {
        AccessToken {
            token: "tok".to_string(),
            expires_in: Duration::from_secs(expires_in),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_cache_fetches_once_until_margin() {
        let cache = TokenCache::new();
        let counter = AtomicUsize::new(0);
        let fetches = &counter;
        let fetch = move || async move {
            fetches.fetch_add(1, Ordering::SeqCst);
            Ok(token(600))
        };

        assert_eq!(cache.refresh_if_expired(fetch).await.unwrap(), "tok");
        assert_eq!(cache.refresh_if_expired(fetch).await.unwrap(), "tok");
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        // 600s lifetime minus the 300s margin
        tokio::time::advance(Duration::from_secs(301)).await;
        cache.refresh_if_expired(fetch).await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_cache_single_flight() {
        let cache = Arc::new(TokenCache::new());
        let fetches = Arc::new(AtomicUsize::new(0));

        let calls = (0..4).map(|_| {
            let cache = cache.clone();
            let fetches = fetches.clone();
            async move {
                cache
                    .refresh_if_expired(|| async move {
                        fetches.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(token(3600))
                    })
                    .await
            }
        });
        let tokens = futures::future::join_all(calls).await;

        assert!(tokens.iter().all(|t| t.as_deref() == Ok("tok")));
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_token_cache_invalidate_and_errors() {
        let cache = TokenCache::new();
        cache.refresh_if_expired(|| async { Ok(token(3600)) }).await.unwrap();
        cache.invalidate().await;

        let err = cache
            .refresh_if_expired(|| async { Err(ProviderError::auth(KIND, "bad key")) })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Auth);
    }

    #[test]
    fn test_token_response_without_token_is_auth_error() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"error":"invalid_client","error_description":"unknown client id"}"#,
        )
        .unwrap();
        let err = response.into_token().unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Auth);
        assert!(err.message.contains("invalid_client"));
    }

    #[test]
    fn test_ocr_text_joins_lines() {
        let response: OcrResponse = serde_json::from_str(
            r#"{"log_id":1,"words_result_num":2,"words_result":[{"words":"1. 求x"},{"words":"答案：3"}]}"#,
        )
        .unwrap();
        assert_eq!(ocr_text(response).unwrap(), "1. 求x\n答案：3");
    }

    #[test]
    fn test_ocr_text_error_codes() {
        let expired: OcrResponse =
            serde_json::from_str(r#"{"error_code":111,"error_msg":"Access token expired"}"#)
                .unwrap();
        assert_eq!(ocr_text(expired).unwrap_err().kind, ProviderErrorKind::Auth);

        let quota: OcrResponse =
            serde_json::from_str(r#"{"error_code":17,"error_msg":"Open api daily request limit reached"}"#)
                .unwrap();
        assert_eq!(ocr_text(quota).unwrap_err().kind, ProviderErrorKind::Http);

        let empty: OcrResponse = serde_json::from_str(r#"{"words_result":[]}"#).unwrap();
        assert_eq!(
            ocr_text(empty).unwrap_err().kind,
            ProviderErrorKind::EmptyResult
        );
    }

    #[tokio::test]
    async fn test_unconfigured_provider_fails_with_auth() {
        let provider = BaiduOcrProvider::new(BaiduConfig::base_default(), Client::new());
        assert!(!provider.is_configured());

        let image = PreparedImage::new("image/png", b"png");
        let err = provider.recognize(&image).await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Auth);
    }
}
