//! Error taxonomy for image recognition.

use thiserror::Error;

use super::provider::ProviderKind;

/// Input rejected locally before any provider is contacted.
///
/// Never retried and never triggers fallback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("image is empty")]
    Empty,

    #[error("unsupported image format: {mime}")]
    UnsupportedFormat { mime: String },

    #[error("image is {size} bytes, limit is {max} bytes")]
    TooLarge { size: usize, max: usize },

    #[error("invalid base64 image data: {0}")]
    InvalidEncoding(String),

    #[error("image could not be decoded: {0}")]
    Undecodable(String),
}

/// Failure category reported by a provider adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorKind {
    Timeout,
    Http,
    Parse,
    EmptyResult,
    Auth,
}

impl ProviderErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Http => "http error",
            Self::Parse => "parse error",
            Self::EmptyResult => "empty result",
            Self::Auth => "auth error",
        }
    }
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provider call that produced no usable results.
///
/// Every kind is recoverable the same way (fallback or retry); the kind is
/// kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{provider} {kind}: {message}")]
pub struct ProviderError {
    pub provider: ProviderKind,
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(provider: ProviderKind, kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider,
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(provider: ProviderKind, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::Timeout, message)
    }

    pub fn http(provider: ProviderKind, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::Http, message)
    }

    pub fn parse(provider: ProviderKind, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::Parse, message)
    }

    pub fn empty(provider: ProviderKind) -> Self {
        Self::new(
            provider,
            ProviderErrorKind::EmptyResult,
            "no questions recognized",
        )
    }

    pub fn auth(provider: ProviderKind, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::Auth, message)
    }
}

/// Any failure of a recognition request as seen by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecognizeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Terminal per-item failure in a batch; reported on the item only.
    #[error("recognition failed after {attempts} attempts: {last}")]
    ExhaustedRetries { attempts: u32, last: ProviderError },
}

impl RecognizeError {
    /// Message suitable for showing to the person who uploaded the image.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(ValidationError::UnsupportedFormat { .. }) => {
                "unsupported image format, please upload JPG, PNG, GIF or WebP".to_string()
            }
            Self::Validation(ValidationError::TooLarge { max, .. }) => format!(
                "image file too large, please upload an image under {} MB",
                max / (1024 * 1024)
            ),
            Self::Validation(ValidationError::Empty) => "image file is empty".to_string(),
            Self::Validation(ValidationError::InvalidEncoding(_))
            | Self::Validation(ValidationError::Undecodable(_)) => {
                "image could not be read, please upload a valid image".to_string()
            }
            Self::Provider(e) | Self::ExhaustedRetries { last: e, .. } => match e.kind {
                ProviderErrorKind::EmptyResult => {
                    "no question content recognized, make sure the image is clear".to_string()
                }
                _ => "recognition failed, please retry".to_string(),
            },
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::parse(ProviderKind::Gemini, "no JSON array");
        assert_eq!(err.to_string(), "gemini parse error: no JSON array");
    }

    #[test]
    fn test_user_messages_are_distinct() {
        let messages = [
            RecognizeError::from(ValidationError::UnsupportedFormat {
                mime: "image/bmp".to_string(),
            }),
            RecognizeError::from(ValidationError::TooLarge {
                size: 11 * 1024 * 1024,
                max: 10 * 1024 * 1024,
            }),
            RecognizeError::from(ProviderError::empty(ProviderKind::DashScope)),
            RecognizeError::from(ProviderError::http(ProviderKind::DashScope, "HTTP 500")),
        ]
        .map(|e| e.user_message());

        assert!(messages[0].contains("unsupported"));
        assert!(messages[1].contains("too large"));
        assert!(messages[1].contains("10 MB"));
        assert!(messages[2].contains("no question content"));
        assert!(messages[3].contains("retry"));
    }

    #[test]
    fn test_exhausted_retries_uses_last_error_kind() {
        let err = RecognizeError::ExhaustedRetries {
            attempts: 2,
            last: ProviderError::empty(ProviderKind::BaiduOcr),
        };
        assert!(err.user_message().contains("no question content"));
        assert!(!err.is_validation());
    }
}
