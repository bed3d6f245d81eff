//! Mapping of non-success HTTP responses to [`ProviderError`].
//!
//! Recognized bodies:
//! - Envelope: `{"error": {"message": "...", "type": "...", "code": "..."}}`
//! - Flat:     `{"message": "...", "code": "..."}` or `{"detail": "..."}`
//!
//! Anything else is reported verbatim with the status code.

use serde_json::Value;

use crate::provider::ProviderError;

/// Parsed API error information.
#[derive(Debug)]
pub struct ApiErrorInfo {
    /// Human-readable error message.
    pub message: String,
    /// Provider error code (`code` preferred over `type`).
    pub code: Option<String>,
    /// Whether the request can be retried (429 or 5xx).
    pub retryable: bool,
}

/// Parse an API error response body into structured error info.
pub fn parse_api_error(body: &str, status: u16) -> ApiErrorInfo {
    let retryable = status == 429 || status >= 500;
    let fallback = || format!("HTTP {status}: {body}");

    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return ApiErrorInfo {
            message: fallback(),
            code: None,
            retryable,
        };
    };

    let envelope = &json["error"];
    let (message, code) = if let Some(msg) = envelope["message"].as_str() {
        let code = envelope["code"].as_str().or_else(|| envelope["type"].as_str());
        (msg.to_string(), code)
    } else if let Some(msg) = json["message"].as_str().or_else(|| json["detail"].as_str()) {
        (msg.to_string(), json["code"].as_str())
    } else {
        (fallback(), None)
    };

    ApiErrorInfo {
        message,
        code: code.map(String::from),
        retryable,
    }
}

/// Build the error for a failed response.
///
/// 401/403 become [`ProviderError::Auth`], 429 becomes
/// [`ProviderError::RateLimited`] (honoring `retry_after_ms` when present),
/// everything else is [`ProviderError::Api`].
pub fn error_for_status(status: u16, body: &str, retry_after_ms: Option<u64>) -> ProviderError {
    let info = parse_api_error(body, status);
    match status {
        401 | 403 => ProviderError::Auth {
            message: info.message,
        },
        429 => ProviderError::RateLimited {
            retry_after_ms: retry_after_ms.unwrap_or(0),
            message: info.message,
        },
        _ => ProviderError::Api {
            status,
            message: info.message,
            code: info.code,
            retryable: info.retryable,
        },
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
