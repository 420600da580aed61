//! Recognition provider abstraction.
//!
//! The set of providers is closed: exactly three backends exist and they are
//! selected by [`ProviderKind`]. Each backend is reached through the
//! [`RecognitionProvider`] trait so the orchestrator can be exercised with
//! in-process fakes.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::ProviderError;
use super::input::PreparedImage;
use crate::models::RecognitionResult;

/// Available recognition backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Alibaba DashScope multimodal LLM (primary).
    #[default]
    #[serde(rename = "alibaba", alias = "dashscope", alias = "qwen")]
    DashScope,
    /// Baidu plain-text OCR (secondary).
    #[serde(rename = "baidu")]
    BaiduOcr,
    /// Google Gemini multimodal LLM (tertiary).
    #[serde(rename = "gemini", alias = "google")]
    Gemini,
}

/// Fixed fallback order across all providers.
static FALLBACK_ORDER: [ProviderKind; 3] = [
    ProviderKind::DashScope,
    ProviderKind::Gemini,
    ProviderKind::BaiduOcr,
];

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::DashScope,
        ProviderKind::BaiduOcr,
        ProviderKind::Gemini,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DashScope => "alibaba",
            Self::BaiduOcr => "baidu",
            Self::Gemini => "gemini",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "alibaba" | "dashscope" | "qwen" => Some(Self::DashScope),
            "baidu" => Some(Self::BaiduOcr),
            "gemini" | "google" => Some(Self::Gemini),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::DashScope => "Alibaba DashScope",
            Self::BaiduOcr => "Baidu OCR",
            Self::Gemini => "Google Gemini",
        }
    }

    /// Only the multimodal providers fall back; a plain-OCR failure is
    /// terminal.
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(self, Self::DashScope | Self::Gemini)
    }

    /// Providers to try, in order, after `self` has failed.
    pub fn fallback_chain(&self) -> &'static [ProviderKind] {
        if !self.is_fallback_eligible() {
            return &[];
        }
        let position = FALLBACK_ORDER
            .iter()
            .position(|kind| kind == self)
            .unwrap_or(FALLBACK_ORDER.len() - 1);
        &FALLBACK_ORDER[position + 1..]
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One AI recognition backend.
#[async_trait]
pub trait RecognitionProvider: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> ProviderKind;

    /// Whether credentials are present. An unconfigured provider still
    /// accepts calls and fails them with an auth error.
    fn is_configured(&self) -> bool;

    /// Describe what is needed to make the provider usable.
    fn availability_hint(&self) -> String;

    /// Recognize every question in the image.
    async fn recognize(&self, image: &PreparedImage)
        -> Result<Vec<RecognitionResult>, ProviderError>;
}

/// The three concrete backends, one slot per [`ProviderKind`].
#[derive(Clone)]
pub struct ProviderSet {
    dashscope: Arc<dyn RecognitionProvider>,
    baidu: Arc<dyn RecognitionProvider>,
    gemini: Arc<dyn RecognitionProvider>,
}

impl ProviderSet {
    pub fn new(
        dashscope: Arc<dyn RecognitionProvider>,
        baidu: Arc<dyn RecognitionProvider>,
        gemini: Arc<dyn RecognitionProvider>,
    ) -> Self {
        Self {
            dashscope,
            baidu,
            gemini,
        }
    }

    /// Look up the backend for a provider kind.
    pub fn get(&self, kind: ProviderKind) -> &dyn RecognitionProvider {
        match kind {
            ProviderKind::DashScope => self.dashscope.as_ref(),
            ProviderKind::BaiduOcr => self.baidu.as_ref(),
            ProviderKind::Gemini => self.gemini.as_ref(),
        }
    }

    /// Iterate backends in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn RecognitionProvider> {
        ProviderKind::ALL.into_iter().map(move |kind| self.get(kind))
    }
}
