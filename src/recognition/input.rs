//! Image payload validation and preparation.
//!
//! Everything here runs locally; a rejected image never reaches a provider.

use std::io::Cursor;
use std::path::Path;

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use tracing::debug;

use super::error::ValidationError;

/// Upload size limit (10 MiB).
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// MIME types accepted for recognition.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
];

/// An image as submitted by a caller, before validation.
#[derive(Debug, Clone)]
pub struct ImageInput {
    name: String,
    bytes: Vec<u8>,
    declared_mime: Option<String>,
}

impl ImageInput {
    /// Wrap raw bytes; the declared type is guessed from the name's extension.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let declared_mime = mime_guess::from_path(&name)
            .first()
            .map(|m| m.essence_str().to_string());
        Self {
            name,
            bytes,
            declared_mime,
        }
    }

    /// Override the declared MIME type.
    pub fn with_declared_mime(mut self, mime: impl Into<String>) -> Self {
        self.declared_mime = Some(mime.into());
        self
    }

    /// Read an image file.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::from_bytes(name, bytes))
    }

    /// Decode a base64 payload, optionally wrapped as a `data:` URL.
    pub fn from_base64(name: impl Into<String>, encoded: &str) -> Result<Self, ValidationError> {
        let encoded = encoded.trim();
        let (declared_mime, data) = match encoded.strip_prefix("data:") {
            Some(rest) => {
                let (header, data) = rest.split_once(',').ok_or_else(|| {
                    ValidationError::InvalidEncoding("data URL has no payload".to_string())
                })?;
                let mime = header.split(';').next().unwrap_or_default();
                (Some(mime.to_string()), data)
            }
            None => (None, encoded),
        };

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| ValidationError::InvalidEncoding(e.to_string()))?;

        let mut input = Self::from_bytes(name, bytes);
        if declared_mime.is_some() {
            input.declared_mime = declared_mime;
        }
        Ok(input)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Effective MIME type: content sniffing first, declared type second.
    pub fn detected_mime(&self) -> Option<String> {
        infer::get(&self.bytes)
            .map(|kind| kind.mime_type().to_string())
            .or_else(|| self.declared_mime.clone())
    }

    /// Check format, then size. Returns the accepted MIME type.
    pub fn validate(&self, max_bytes: usize) -> Result<String, ValidationError> {
        if self.bytes.is_empty() {
            return Err(ValidationError::Empty);
        }

        let mime = self
            .detected_mime()
            .unwrap_or_else(|| "application/octet-stream".to_string());
        if !ALLOWED_MIME_TYPES.contains(&mime.as_str()) {
            return Err(ValidationError::UnsupportedFormat { mime });
        }

        if self.bytes.len() > max_bytes {
            return Err(ValidationError::TooLarge {
                size: self.bytes.len(),
                max: max_bytes,
            });
        }

        Ok(mime)
    }
}

/// Settings for local validation and compression.
#[derive(Debug, Clone)]
pub struct ImageOptions {
    pub max_bytes: usize,
    /// Re-encode before upload; `None` sends the original bytes.
    pub compression: Option<Compression>,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            max_bytes: MAX_IMAGE_BYTES,
            compression: Some(Compression::default()),
        }
    }
}

impl ImageOptions {
    /// Validate only, upload the original bytes.
    pub fn uncompressed() -> Self {
        Self {
            compression: None,
            ..Self::default()
        }
    }
}

/// Downscale-and-JPEG settings.
#[derive(Debug, Clone, Copy)]
pub struct Compression {
    /// Longest side after resizing, in pixels.
    pub max_dimension: u32,
    /// JPEG quality, 1-100.
    pub quality: u8,
}

impl Default for Compression {
    fn default() -> Self {
        Self {
            max_dimension: 1024,
            quality: 90,
        }
    }
}

/// A validated image ready to embed in a provider request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedImage {
    pub mime_type: String,
    pub base64: String,
}

impl PreparedImage {
    pub fn new(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            base64: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    /// `data:<mime>;base64,<payload>`
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

/// Validate an input and produce the payload sent to providers.
///
/// Compression decodes the image on the blocking pool.
pub async fn prepare(
    input: &ImageInput,
    options: &ImageOptions,
) -> Result<PreparedImage, ValidationError> {
    let mime = input.validate(options.max_bytes)?;
    prepare_validated(input, mime, options).await
}

/// Produce the upload payload for an input that already passed
/// [`ImageInput::validate`], which returned `mime`.
pub async fn prepare_validated(
    input: &ImageInput,
    mime: String,
    options: &ImageOptions,
) -> Result<PreparedImage, ValidationError> {
    let Some(compression) = options.compression else {
        return Ok(PreparedImage::new(mime, input.bytes()));
    };

    let bytes = input.bytes().to_vec();
    let name = input.name().to_string();
    let jpeg = tokio::task::spawn_blocking(move || compress(&bytes, compression))
        .await
        .map_err(|e| ValidationError::Undecodable(format!("compression task failed: {}", e)))??;

    debug!(
        "Compressed {} from {} to {} bytes",
        name,
        input.len(),
        jpeg.len()
    );
    Ok(PreparedImage::new("image/jpeg", &jpeg))
}

/// Shrink so the longest side fits `max_dimension` (never enlarging) and
/// re-encode as JPEG.
pub fn compress(bytes: &[u8], compression: Compression) -> Result<Vec<u8>, ValidationError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| ValidationError::Undecodable(e.to_string()))?;

    let max = compression.max_dimension.max(1);
    let img = if img.width() > max || img.height() > max {
        img.resize(max, max, FilterType::Lanczos3)
    } else {
        img
    };

    let mut out = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut out, compression.quality.clamp(1, 100));
    img.to_rgb8()
        .write_with_encoder(encoder)
        .map_err(|e| ValidationError::Undecodable(e.to_string()))?;
    Ok(out.into_inner())
}
