//! Shared HTTP plumbing for validators and posters

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::PlatformError;
use crate::types::PlatformId;

/// Build the client every adapter shares; `timeout` caps each request
pub fn build_client(timeout: Duration) -> Result<Client, PlatformError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("podrelay/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {}", e)))
}

/// Map a transport failure (no HTTP answer at all)
pub fn transport_error(platform: PlatformId, context: &str, error: reqwest::Error) -> PlatformError {
    if error.is_timeout() {
        PlatformError::Timeout(format!(
            "{} did not answer in time during {}",
            platform.display_name(),
            context
        ))
    } else {
        PlatformError::Network(format!(
            "Could not reach {} during {}: {}",
            platform.display_name(),
            context,
            error
        ))
    }
}

/// Map an unsuccessful HTTP status to a platform error
pub fn status_error(
    platform: PlatformId,
    context: &str,
    status: StatusCode,
    message: &str,
) -> PlatformError {
    let name = platform.display_name();
    match status.as_u16() {
        401 | 403 => PlatformError::Authentication(format!(
            "{} rejected the credentials during {} (HTTP {}): {}",
            name,
            context,
            status.as_u16(),
            message
        )),
        429 => PlatformError::RateLimit(format!(
            "{} rate limit exceeded during {}: {}. Please wait before trying again.",
            name, context, message
        )),
        400 | 422 => PlatformError::Validation(format!(
            "{} rejected the request during {}: {}",
            name, context, message
        )),
        _ => PlatformError::Posting(format!(
            "{} returned HTTP {} during {}: {}",
            name,
            status.as_u16(),
            context,
            message
        )),
    }
}

/// Pull the human-readable message out of a platform's error body
///
/// Understands the Graph API (`error.message`), OAuth
/// (`error_description`), AT Protocol (`message`), X (`detail`, `title`,
/// `errors[0].message`) and LinkedIn (`message`) shapes.
pub fn extract_error_message(body: &str) -> String {
    let trimmed = body.trim();
    let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) else {
        return if trimmed.is_empty() {
            "empty response body".to_string()
        } else {
            truncate_body(trimmed)
        };
    };

    let candidates = [
        value.pointer("/error/message"),
        value.pointer("/error_description"),
        value.pointer("/detail"),
        value.pointer("/message"),
        value.pointer("/errors/0/message"),
        value.pointer("/title"),
        value.pointer("/error"),
    ];
    let found = candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| truncate_body(trimmed));
    found
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 300;
    if body.chars().count() <= MAX {
        body.to_string()
    } else {
        let cut: String = body.chars().take(MAX).collect();
        format!("{}…", cut)
    }
}

/// Send a request, mapping transport errors
pub async fn send(
    platform: PlatformId,
    context: &str,
    request: reqwest::RequestBuilder,
) -> Result<Response, PlatformError> {
    request
        .send()
        .await
        .map_err(|e| transport_error(platform, context, e))
}

/// Turn a non-2xx response into an error carrying the upstream message
pub async fn check_status(
    platform: PlatformId,
    context: &str,
    response: Response,
) -> Result<Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = extract_error_message(&body);
    tracing::debug!(
        "{} {} failed with HTTP {}: {}",
        platform,
        context,
        status.as_u16(),
        message
    );
    Err(status_error(platform, context, status, &message))
}

/// Send, check the status and decode a JSON body
pub async fn send_json<T: DeserializeOwned>(
    platform: PlatformId,
    context: &str,
    request: reqwest::RequestBuilder,
) -> Result<T, PlatformError> {
    let response = send(platform, context, request).await?;
    let response = check_status(platform, context, response).await?;
    response.json::<T>().await.map_err(|e| {
        PlatformError::Posting(format!(
            "{} returned an unexpected response during {}: {}",
            platform.display_name(),
            context,
            e
        ))
    })
}

/// Append a remediation hint to authentication failures
pub fn with_auth_hint(error: PlatformError, hint: &str) -> PlatformError {
    match error {
        PlatformError::Authentication(message) => {
            PlatformError::Authentication(format!("{}. {}", message, hint))
        }
        other => other,
    }
}
