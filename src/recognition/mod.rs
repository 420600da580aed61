//! Question recognition from images.
//!
//! Three backends are supported:
//! - **Alibaba DashScope**: Qwen-VL multimodal model (primary)
//! - **Baidu OCR**: plain text OCR plus keyword heuristics (secondary)
//! - **Google Gemini**: multimodal model (tertiary)
//!
//! The multimodal backends fall back along a fixed chain; see
//! [`ProviderKind::fallback_chain`].

pub mod baidu;
pub mod dashscope;
mod error;
pub mod gemini;
mod http;
mod input;
mod normalize;
pub mod ocr_text;
mod orchestrator;
mod prompts;
mod provider;

pub use baidu::{BaiduConfig, BaiduOcrProvider, TokenCache};
pub use dashscope::{DashScopeConfig, DashScopeProvider};
pub use error::{ProviderError, ProviderErrorKind, RecognizeError, ValidationError};
pub use gemini::{GeminiConfig, GeminiProvider};
pub use http::{build_client, DEFAULT_REQUEST_TIMEOUT};
pub use input::{
    prepare, prepare_validated, Compression, ImageInput, ImageOptions, PreparedImage, ALLOWED_MIME_TYPES,
    MAX_IMAGE_BYTES,
};
pub use normalize::{extract_json_array, normalize, normalize_with, sanitize, DEFAULT_CONFIDENCE};
pub use orchestrator::Recognizer;
pub use provider::{ProviderKind, ProviderSet, RecognitionProvider};
