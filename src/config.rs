//! Configuration management for mistakebook using the prefer crate.
//!
//! A `mistakebook.{toml,yaml,json}` file is discovered by prefer in the
//! standard locations; every section is optional. Environment variables
//! override file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::recognition::{
    BaiduConfig, Compression, DashScopeConfig, GeminiConfig, ImageOptions, ProviderKind,
    MAX_IMAGE_BYTES,
};
use crate::services::batch::BatchOptions;

/// Recognition request settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionConfig {
    /// Provider tried first.
    #[serde(default)]
    pub default_provider: ProviderKind,
    /// Deadline for one provider attempt, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Upload size limit in bytes.
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,
    /// Downscale and re-encode images before upload.
    #[serde(default = "default_compress")]
    pub compress: bool,
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_max_image_bytes() -> usize {
    MAX_IMAGE_BYTES
}

fn default_compress() -> bool {
    true
}

fn default_max_dimension() -> u32 {
    1024
}

fn default_jpeg_quality() -> u8 {
    90
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self::base_default().with_env_overrides()
    }
}

impl RecognitionConfig {
    fn base_default() -> Self {
        Self {
            default_provider: ProviderKind::default(),
            request_timeout_secs: default_request_timeout_secs(),
            max_image_bytes: default_max_image_bytes(),
            compress: default_compress(),
            max_dimension: default_max_dimension(),
            jpeg_quality: default_jpeg_quality(),
        }
    }

    pub fn is_default(&self) -> bool {
        *self == Self::base_default()
    }

    /// Apply environment variable overrides.
    ///
    /// - `MISTAKEBOOK_PROVIDER`: `alibaba`, `baidu` or `gemini`
    /// - `MISTAKEBOOK_TIMEOUT_SECS`: per-attempt deadline
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(kind) = std::env::var("MISTAKEBOOK_PROVIDER")
            .ok()
            .and_then(|v| ProviderKind::from_str(&v))
        {
            self.default_provider = kind;
        }
        if let Some(secs) = std::env::var("MISTAKEBOOK_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.request_timeout_secs = secs;
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn image_options(&self) -> ImageOptions {
        ImageOptions {
            max_bytes: self.max_image_bytes,
            compression: self.compress.then_some(Compression {
                max_dimension: self.max_dimension,
                quality: self.jpeg_quality,
            }),
        }
    }
}

/// Batch queue settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Images recognized at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Automatic retries per image after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Pause before each automatic retry, in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_concurrency() -> usize {
    2
}

fn default_max_retries() -> u32 {
    1
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl BatchConfig {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    pub fn options(&self) -> BatchOptions {
        BatchOptions {
            concurrency: self.concurrency.max(1),
            max_retries: self.max_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "RecognitionConfig::is_default")]
    pub recognition: RecognitionConfig,
    #[serde(default, skip_serializing_if = "BatchConfig::is_default")]
    pub batch: BatchConfig,
    /// Alibaba DashScope credentials and model.
    #[serde(default, skip_serializing_if = "DashScopeConfig::is_default")]
    pub dashscope: DashScopeConfig,
    /// Google Gemini credentials and model.
    #[serde(default, skip_serializing_if = "GeminiConfig::is_default")]
    pub gemini: GeminiConfig,
    /// Baidu OCR credentials.
    #[serde(default, skip_serializing_if = "BaiduConfig::is_default")]
    pub baidu: BaiduConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Falls back to defaults (with env overrides) when no file is found or
    /// the file cannot be parsed.
    pub async fn load() -> Self {
        match prefer::load("mistakebook").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => match Self::load_from_path(path).await {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!("Ignoring config file {}: {}", path.display(), e);
                        Self::default()
                    }
                },
                None => Self::default(),
            },
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// The format follows the file extension: TOML, YAML, otherwise JSON.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config = Self::parse(&contents, ext)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config.with_env_overrides())
    }

    fn parse(contents: &str, ext: &str) -> Result<Self, String> {
        match ext {
            "toml" => {
                toml::from_str(contents).map_err(|e| format!("Failed to parse TOML config: {}", e))
            }
            "yaml" | "yml" => serde_yaml::from_str(contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e)),
            _ => serde_json::from_str(contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e)),
        }
    }

    /// Environment variables win over values read from a file.
    pub fn with_env_overrides(mut self) -> Self {
        self.recognition = self.recognition.with_env_overrides();
        self.dashscope = self.dashscope.with_env_overrides();
        self.gemini = self.gemini.with_env_overrides();
        self.baidu = self.baidu.with_env_overrides();
        self
    }
}
