//! Alibaba DashScope (Qwen-VL) multimodal backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::error::ProviderError;
use super::http::{check_status, read_json, send_error};
use super::input::PreparedImage;
use super::normalize::{extract_json_array, normalize_with};
use super::prompts::question_prompt;
use super::provider::{ProviderKind, RecognitionProvider};
use crate::models::RecognitionResult;

const KIND: ProviderKind = ProviderKind::DashScope;

/// Configuration for the DashScope backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashScopeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    /// Used when the model omits a confidence.
    #[serde(default = "default_confidence")]
    pub default_confidence: f64,
}

fn default_endpoint() -> String {
    "https://dashscope.aliyuncs.com/api/v1/services/aigc/multimodal-generation/generation"
        .to_string()
}

fn default_model() -> String {
    "qwen-vl-plus".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_top_p() -> f32 {
    0.9
}

fn default_confidence() -> f64 {
    0.8
}

impl Default for DashScopeConfig {
    fn default() -> Self {
        Self::base_default().with_env_overrides()
    }
}

impl DashScopeConfig {
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

    /// Apply `ALIBABA_API_KEY` (or `DASHSCOPE_API_KEY`) and `DASHSCOPE_MODEL`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(key) = std::env::var("ALIBABA_API_KEY")
            .or_else(|_| std::env::var("DASHSCOPE_API_KEY"))
            .ok()
        {
            self.api_key = Some(key);
        }
        if let Ok(model) = std::env::var("DASHSCOPE_MODEL") {
            self.model = model;
        }
        self
    }

    fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Serialize)]
struct GenerationRequest {
    model: String,
    input: GenerationInput,
    parameters: GenerationParameters,
}

#[derive(Debug, Serialize)]
struct GenerationInput {
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ContentPart {
    Image { image: String },
    Text { text: String },
}

#[derive(Debug, Serialize)]
struct GenerationParameters {
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    output: Option<GenerationOutput>,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerationOutput {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Value,
}

/// Flatten message content, which may be a string, a list of parts (plain
/// strings or `{text}` objects), or a single `{text}` object. Missing
/// content flattens to an empty string; any other shape is a parse error.
fn content_text(content: &Value) -> Result<String, ProviderError> {
    match content {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s.clone()),
        Value::Array(parts) => Ok(parts
            .iter()
            .filter_map(|p| match p {
                Value::String(s) => Some(s.as_str()),
                _ => p.get("text").and_then(Value::as_str),
            })
            .collect::<Vec<_>>()
            .join("")),
        Value::Object(obj) => match obj.get("text") {
            Some(Value::String(text)) => Ok(text.clone()),
            _ => Err(ProviderError::parse(KIND, "message content object has no text")),
        },
        other => Err(ProviderError::parse(
            KIND,
            format!("unsupported message content: {}", other),
        )),
    }
}

/// Turn a decoded response into results.
fn parse_response(
    response: GenerationResponse,
    default_confidence: f64,
) -> Result<Vec<RecognitionResult>, ProviderError> {
    if let Some(code) = response.code.filter(|c| !c.is_empty()) {
        return Err(ProviderError::http(
            KIND,
            format!("{}: {}", code, response.message.unwrap_or_default()),
        ));
    }

    let text = match response.output.and_then(|o| o.choices.into_iter().next()) {
        Some(choice) => content_text(&choice.message.content)?,
        None => String::new(),
    };
    if text.trim().is_empty() {
        return Err(ProviderError::empty(KIND));
    }

    parse_text(&text, default_confidence)
}

/// Extract and normalize the question array from model text.
fn parse_text(
    text: &str,
    default_confidence: f64,
) -> Result<Vec<RecognitionResult>, ProviderError> {
    let items = extract_json_array(text)
        .ok_or_else(|| ProviderError::parse(KIND, "response contains no JSON array"))?;
    if items.is_empty() {
        return Err(ProviderError::empty(KIND));
    }
    Ok(items
        .iter()
        .map(|item| normalize_with(item, default_confidence))
        .collect())
}

/// DashScope recognition backend.
pub struct DashScopeProvider {
    config: DashScopeConfig,
    client: Client,
}

impl DashScopeProvider {
    /// Create a new DashScope backend sharing `client`.
    pub fn new(config: DashScopeConfig, client: Client) -> Self {
        Self { config, client }
    }

    fn build_request(&self, image: &PreparedImage) -> GenerationRequest {
        GenerationRequest {
            model: self.config.model.clone(),
            input: GenerationInput {
                messages: vec![Message {
                    role: "user",
                    content: vec![
                        ContentPart::Image {
                            image: image.data_url(),
                        },
                        ContentPart::Text {
                            text: question_prompt(),
                        },
                    ],
                }],
            },
            parameters: GenerationParameters {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
            },
        }
    }
}

#[async_trait]
impl RecognitionProvider for DashScopeProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    fn is_configured(&self) -> bool {
        self.config.api_key().is_some()
    }

    fn availability_hint(&self) -> String {
        if self.is_configured() {
            format!("DashScope is available (model: {})", self.config.model)
        } else {
            "ALIBABA_API_KEY not set. Get an API key from https://dashscope.console.aliyun.com/"
                .to_string()
        }
    }

    async fn recognize(
        &self,
        image: &PreparedImage,
    ) -> Result<Vec<RecognitionResult>, ProviderError> {
        let api_key = self
            .config
            .api_key()
            .ok_or_else(|| ProviderError::auth(KIND, "ALIBABA_API_KEY not set"))?;

        debug!("Sending image to DashScope ({})", self.config.model);
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .json(&self.build_request(image))
            .send()
            .await
            .map_err(|e| send_error(KIND, e))?;
        let response = check_status(KIND, response).await?;
        let body: GenerationResponse = read_json(KIND, response).await?;

        parse_response(body, self.config.default_confidence)
    }
}
