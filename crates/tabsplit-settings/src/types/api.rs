//! Provider API and model settings.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default `OpenAI` API base URL.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model for reading receipts (must accept image input).
pub const DEFAULT_EXTRACTION_MODEL: &str = "gpt-4o-mini";

/// Default model for interpreting split instructions.
pub const DEFAULT_REASONING_MODEL: &str = "gpt-5-mini";

/// API provider settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiSettings {
    /// `OpenAI` settings.
    pub openai: OpenAiSettings,
}

/// `OpenAI` connection settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpenAiSettings {
    /// Base URL (no trailing slash).
    pub base_url: String,
    /// API key. Usually supplied through `OPENAI_API_KEY` instead of the file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Optional organization header.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            api_key: None,
            organization: None,
            request_timeout_ms: 60_000,
        }
    }
}

impl fmt::Debug for OpenAiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("organization", &self.organization)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

/// Which models the two service calls use.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelSettings {
    /// Model for receipt extraction.
    pub extraction_model: String,
    /// Sampling temperature for extraction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_temperature: Option<f64>,
    /// Model for split reasoning.
    pub reasoning_model: String,
    /// Sampling temperature for reasoning (`None` = provider default).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_temperature: Option<f64>,
    /// Output token cap for both calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            extraction_model: DEFAULT_EXTRACTION_MODEL.to_string(),
            extraction_temperature: Some(0.0),
            reasoning_model: DEFAULT_REASONING_MODEL.to_string(),
            reasoning_temperature: None,
            max_output_tokens: None,
        }
    }
}
