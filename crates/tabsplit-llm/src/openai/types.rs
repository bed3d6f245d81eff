//! `OpenAI` Chat Completions wire types and provider configuration.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Connection configuration for [`super::OpenAiProvider`].
#[derive(Clone)]
pub struct OpenAiConfig {
    /// API key sent as a Bearer token.
    pub api_key: String,
    /// Base URL without trailing slash.
    pub base_url: String,
    /// Optional `OpenAI-Organization` header.
    pub organization: Option<String>,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl OpenAiConfig {
    /// Config for the public API with the given key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            organization: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    /// Override the base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the organization header.
    #[must_use]
    pub fn with_organization(mut self, organization: Option<String>) -> Self {
        self.organization = organization;
        self
    }

    /// Override the request timeout.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"[redacted]")
            .field("base_url", &self.base_url)
            .field("organization", &self.organization)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request
// ─────────────────────────────────────────────────────────────────────────────

/// `POST /chat/completions` body.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    /// Model ID.
    pub model: String,
    /// Conversation (a single user turn here).
    pub messages: Vec<ChatMessage>,
    /// Structured output format.
    pub response_format: ResponseFormat,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Output token cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
}

/// One chat message.
#[derive(Debug, Serialize)]
pub struct ChatMessage {
    /// `"user"`.
    pub role: &'static str,
    /// Content parts.
    pub content: Vec<ContentPart>,
}

/// One content part of a user message.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text part.
    Text {
        /// The text.
        text: String,
    },
    /// Image part.
    ImageUrl {
        /// Image reference.
        image_url: ImageUrl,
    },
}

/// Image reference (a `data:` URL here).
#[derive(Debug, Serialize)]
pub struct ImageUrl {
    /// URL or data URL.
    pub url: String,
}

/// `response_format` object.
#[derive(Debug, Serialize)]
pub struct ResponseFormat {
    /// Always `"json_schema"`.
    #[serde(rename = "type")]
    pub format_type: &'static str,
    /// The schema.
    pub json_schema: JsonSchemaFormat,
}

/// Named schema inside `response_format`.
#[derive(Debug, Serialize)]
pub struct JsonSchemaFormat {
    /// Schema name.
    pub name: String,
    /// Schema description.
    pub description: String,
    /// JSON Schema document.
    pub schema: Value,
    /// Strict schema adherence.
    pub strict: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Response
// ─────────────────────────────────────────────────────────────────────────────

/// `POST /chat/completions` response.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    /// Response ID.
    #[serde(default)]
    pub id: Option<String>,
    /// Completion choices (one requested).
    #[serde(default)]
    pub choices: Vec<Choice>,
    /// Token usage.
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// One completion choice.
#[derive(Debug, Deserialize)]
pub struct Choice {
    /// Assistant message.
    pub message: ChoiceMessage,
    /// `stop`, `length`, `content_filter`, ...
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Assistant message inside a choice.
#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    /// JSON text conforming to the schema.
    #[serde(default)]
    pub content: Option<String>,
    /// Refusal text when the model declined.
    #[serde(default)]
    pub refusal: Option<String>,
}

/// Token usage.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct Usage {
    /// Prompt tokens.
    #[serde(default)]
    pub prompt_tokens: u64,
    /// Completion tokens.
    #[serde(default)]
    pub completion_tokens: u64,
}
