//! Provider trait, request model, and error taxonomy.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors that can occur while talking to a model provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Authentication failed (missing or rejected key).
    #[error("Auth error: {message}")]
    Auth {
        /// Error description.
        message: String,
    },

    /// Rate limited by the provider.
    #[error("Rate limited: retry after {retry_after_ms}ms")]
    RateLimited {
        /// Suggested retry delay in milliseconds.
        retry_after_ms: u64,
        /// Error description.
        message: String,
    },

    /// Provider returned an API error.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error description.
        message: String,
        /// Provider-specific error code.
        code: Option<String>,
        /// Whether this error can be retried.
        retryable: bool,
    },

    /// Model output did not match the requested schema.
    #[error("Schema mismatch for {schema}: {message}")]
    Schema {
        /// Name of the target schema.
        schema: String,
        /// What went wrong.
        message: String,
    },

    /// The model declined to produce output.
    #[error("Model refused: {message}")]
    Refusal {
        /// Refusal text returned by the model.
        message: String,
    },

    /// Output was cut off by the token limit before the JSON was complete.
    #[error("Output truncated at the token limit")]
    Truncated,

    /// Request was cancelled.
    #[error("Request cancelled")]
    Cancelled,

    /// Provider-specific error.
    #[error("{message}")]
    Other {
        /// Error description.
        message: String,
    },
}

impl ProviderError {
    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| {
                        s == reqwest::StatusCode::TOO_MANY_REQUESTS || s.is_server_error()
                    })
            }
            Self::RateLimited { .. } => true,
            Self::Api { retryable, .. } => *retryable,
            Self::Json(_)
            | Self::Auth { .. }
            | Self::Schema { .. }
            | Self::Refusal { .. }
            | Self::Truncated
            | Self::Cancelled
            | Self::Other { .. } => false,
        }
    }

    /// Retry-after delay in milliseconds, if the provider sent one.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_ms, .. } => Some(*retry_after_ms),
            _ => None,
        }
    }

    /// Short category label used in logs and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Http(_) => "network",
            Self::Json(_) => "parse",
            Self::Auth { .. } => "auth",
            Self::RateLimited { .. } => "rate_limit",
            Self::Api { .. } => "api",
            Self::Schema { .. } => "schema",
            Self::Refusal { .. } => "refusal",
            Self::Truncated => "truncated",
            Self::Cancelled => "cancelled",
            Self::Other { .. } => "unknown",
        }
    }
}

/// Named JSON Schema the model output must conform to.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputSchema {
    /// Schema name (`[a-zA-Z0-9_-]`, sent to the provider).
    pub name: String,
    /// What the output represents.
    pub description: String,
    /// JSON Schema document.
    pub schema: Value,
}

/// An image attached to a request.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageInput {
    /// Base64-encoded image bytes.
    pub data: String,
    /// MIME type, e.g. `image/png`.
    pub mime_type: String,
}

impl ImageInput {
    /// Encode raw image bytes.
    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self {
            data: STANDARD.encode(bytes),
            mime_type: mime_type.into(),
        }
    }

    /// `data:` URL form accepted by vision models.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// One structured-output request.
#[derive(Clone, Debug, PartialEq)]
pub struct StructuredRequest {
    /// Model ID.
    pub model: String,
    /// Sampling temperature (`None` leaves the provider default).
    pub temperature: Option<f64>,
    /// Output token cap.
    pub max_output_tokens: Option<u32>,
    /// Instruction text.
    pub prompt: String,
    /// Optional image sent alongside the prompt.
    pub image: Option<ImageInput>,
    /// Target schema.
    pub schema: OutputSchema,
}

/// A model backend that returns JSON conforming to a requested schema.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StructuredProvider: Send + Sync {
    /// Provider identifier (e.g. `"openai"`).
    fn name(&self) -> &'static str;

    /// Run one request and return the parsed JSON output.
    async fn complete(&self, request: &StructuredRequest) -> ProviderResult<Value>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
