//! Google Gemini multimodal backend.
//!
//! Uses the `generateContent` REST endpoint with JSON output mode, so the
//! model normally answers with a bare array; the normalizer still copes
//! with fenced or prose-wrapped output.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::ProviderError;
use super::http::{check_status, read_json, send_error};
use super::input::PreparedImage;
use super::normalize::{extract_json_array, normalize_with};
use super::prompts::{extraction_prompt, SYSTEM_INSTRUCTION};
use super::provider::{ProviderKind, RecognitionProvider};
use crate::models::RecognitionResult;

const KIND: ProviderKind = ProviderKind::Gemini;

/// Configuration for the Gemini backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// API base, without the `/models/...` suffix.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_confidence")]
    pub default_confidence: f64,
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_model() -> String {
    "gemini-2.0-flash-exp".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_top_p() -> f32 {
    0.9
}

fn default_confidence() -> f64 {
    0.85
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self::base_default().with_env_overrides()
    }
}

impl GeminiConfig {
    fn base_default() -> Self {
        Self {
            api_key: None,
            endpoint: default_endpoint(),
            model: default_model(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            default_confidence: default_confidence(),
        }
    }

    pub fn is_default(&self) -> bool {
        *self == Self::base_default()
    }

    /// Apply `GEMINI_API_KEY` (or `GOOGLE_API_KEY`) and `GEMINI_MODEL`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(key) = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("GOOGLE_API_KEY"))
            .ok()
        {
            self.api_key = Some(key);
        }
        if let Ok(model) = std::env::var("GEMINI_MODEL") {
            self.model = model;
        }
        self
    }

    fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    system_instruction: GeminiContent,
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

fn parse_response(
    response: GeminiResponse,
    default_confidence: f64,
) -> Result<Vec<RecognitionResult>, ProviderError> {
    if let Some(error) = response.error {
        return Err(ProviderError::http(KIND, error.message));
    }

    let text: String = response
        .candidates
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect()
        })
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(ProviderError::empty(KIND));
    }

    let items = extract_json_array(&text)
        .ok_or_else(|| ProviderError::parse(KIND, "response contains no JSON array"))?;
    if items.is_empty() {
        return Err(ProviderError::empty(KIND));
    }
    Ok(items
        .iter()
        .map(|item| normalize_with(item, default_confidence))
        .collect())
}

/// Gemini recognition backend.
pub struct GeminiProvider {
    config: GeminiConfig,
    client: Client,
}

impl GeminiProvider {
    /// Create a new Gemini backend sharing `client`.
    pub fn new(config: GeminiConfig, client: Client) -> Self {
        Self { config, client }
    }

    fn build_request(&self, image: &PreparedImage) -> GeminiRequest {
        GeminiRequest {
            system_instruction: GeminiContent {
                parts: vec![GeminiPart::Text {
                    text: SYSTEM_INSTRUCTION.to_string(),
                }],
            },
            contents: vec![GeminiContent {
                parts: vec![
                    GeminiPart::InlineData {
                        inline_data: InlineData {
                            mime_type: image.mime_type.clone(),
                            data: image.base64.clone(),
                        },
                    },
                    GeminiPart::Text {
                        text: extraction_prompt(),
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
                response_mime_type: "application/json",
            },
        }
    }
}

#[async_trait]
impl RecognitionProvider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    fn is_configured(&self) -> bool {
        self.config.api_key().is_some()
    }

    fn availability_hint(&self) -> String {
        if self.is_configured() {
            format!("Gemini is available (model: {})", self.config.model)
        } else {
            "GEMINI_API_KEY not set. Get an API key from https://ai.google.dev/".to_string()
        }
    }

    async fn recognize(
        &self,
        image: &PreparedImage,
    ) -> Result<Vec<RecognitionResult>, ProviderError> {
        let api_key = self
            .config
            .api_key()
            .ok_or_else(|| ProviderError::auth(KIND, "GEMINI_API_KEY not set"))?;

        debug!("Sending image to Gemini ({})", self.config.model);
        let response = self
            .client
            .post(self.config.url())
            .query(&[("key", api_key)])
            .json(&self.build_request(image))
            .send()
            .await
            .map_err(|e| send_error(KIND, e))?;
        let response = check_status(KIND, response).await?;
        let body: GeminiResponse = read_json(KIND, response).await?;

        parse_response(body, self.config.default_confidence)
    }
}
