//! Shared HTTP plumbing for provider adapters.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::error::ProviderError;
use super::provider::ProviderKind;

/// Per-request deadline applied by the HTTP client itself.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub const USER_AGENT: &str = concat!("mistakebook/", env!("CARGO_PKG_VERSION"));

/// Longest slice of an error body kept in an error message.
const MAX_ERROR_BODY: usize = 512;

/// Build the client a provider uses for all of its requests.
pub fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .gzip(true)
        .build()
}

/// Classify a transport failure.
pub fn send_error(provider: ProviderKind, err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::timeout(provider, err.to_string())
    } else if err.is_decode() {
        ProviderError::parse(provider, err.to_string())
    } else {
        ProviderError::http(provider, err.to_string())
    }
}

/// Pass a successful response through; turn anything else into an error
/// carrying the status and a prefix of the body.
pub async fn check_status(
    provider: ProviderKind,
    response: Response,
) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(status_error(provider, status, &body))
}

pub fn status_error(provider: ProviderKind, status: StatusCode, body: &str) -> ProviderError {
    let message = format!("HTTP {}: {}", status, truncate(body.trim(), MAX_ERROR_BODY));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::auth(provider, message),
        _ => ProviderError::http(provider, message),
    }
}

/// Decode a JSON body into `T`.
pub async fn read_json<T: DeserializeOwned>(
    provider: ProviderKind,
    response: Response,
) -> Result<T, ProviderError> {
    let body = response
        .text()
        .await
        .map_err(|e| send_error(provider, e))?;
    serde_json::from_str(&body)
        .map_err(|e| ProviderError::parse(provider, format!("invalid response body: {}", e)))
}

/// UTF-8 safe prefix.
fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
