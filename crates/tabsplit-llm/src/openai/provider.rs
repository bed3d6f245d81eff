//! `OpenAI` provider implementing [`StructuredProvider`].
//!
//! Sends one non-streaming Chat Completions request per call, with the
//! target schema in `response_format` and any image inlined as a `data:`
//! URL. The first choice's content is parsed as JSON.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::Value;
use tracing::{debug, error, instrument, warn};

use crate::error_parsing::error_for_status;
use crate::provider::{ProviderError, ProviderResult, StructuredProvider, StructuredRequest};

use super::types::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ContentPart, ImageUrl,
    JsonSchemaFormat, OpenAiConfig, ResponseFormat,
};

/// `OpenAI` structured-output provider.
pub struct OpenAiProvider {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiProvider {
    /// Create a provider with its own HTTP client honoring `config.timeout_ms`.
    pub fn new(config: OpenAiConfig) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self { config, client })
    }

    /// Create a provider with a shared HTTP client.
    #[must_use]
    pub fn with_client(config: OpenAiConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn build_headers(&self) -> ProviderResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth_value = format!("Bearer {}", self.config.api_key);
        let _ = headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value).map_err(|e| ProviderError::Auth {
                message: format!("Invalid API key header: {e}"),
            })?,
        );
        if let Some(org) = &self.config.organization {
            let _ = headers.insert(
                "openai-organization",
                HeaderValue::from_str(org).map_err(|e| ProviderError::Other {
                    message: format!("Invalid organization header: {e}"),
                })?,
            );
        }
        Ok(headers)
    }

    fn build_request(request: &StructuredRequest) -> ChatCompletionRequest {
        let mut content = vec![ContentPart::Text {
            text: request.prompt.clone(),
        }];
        if let Some(image) = &request.image {
            content.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: image.data_url(),
                },
            });
        }

        ChatCompletionRequest {
            model: request.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content,
            }],
            response_format: ResponseFormat {
                format_type: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: request.schema.name.clone(),
                    description: request.schema.description.clone(),
                    schema: request.schema.schema.clone(),
                    strict: true,
                },
            },
            temperature: request.temperature,
            max_completion_tokens: request.max_output_tokens,
        }
    }

    /// Extract the JSON output from a completed response.
    fn parse_output(schema: &str, response: ChatCompletionResponse) -> ProviderResult<Value> {
        let Some(choice) = response.choices.into_iter().next() else {
            return Err(ProviderError::Other {
                message: "response contained no choices".into(),
            });
        };

        if let Some(refusal) = choice.message.refusal.filter(|r| !r.is_empty()) {
            return Err(ProviderError::Refusal { message: refusal });
        }
        if choice.finish_reason.as_deref() == Some("length") {
            return Err(ProviderError::Truncated);
        }

        let content = choice.message.content.unwrap_or_default();
        serde_json::from_str(&content).map_err(|e| ProviderError::Schema {
            schema: schema.to_string(),
            message: format!("output is not valid JSON: {e}"),
        })
    }

    async fn send(&self, request: &StructuredRequest) -> ProviderResult<Value> {
        let body = Self::build_request(request);
        let url = format!("{}/chat/completions", self.config.base_url);
        let headers = self.build_headers()?;

        debug!(
            model = %body.model,
            schema = %request.schema.name,
            has_image = request.image.is_some(),
            "sending OpenAI request"
        );

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(tabsplit_core::retry::parse_retry_after_header);
            let body_text = response.text().await.unwrap_or_default();
            let err = error_for_status(status.as_u16(), &body_text, retry_after);
            error!(status = status.as_u16(), category = err.category(), error = %err, "OpenAI API error");
            return Err(err);
        }

        let parsed: ChatCompletionResponse = response.json().await?;
        if let Some(usage) = parsed.usage {
            debug!(
                id = parsed.id.as_deref().unwrap_or("-"),
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "OpenAI usage"
            );
        }
        Self::parse_output(&request.schema.name, parsed)
    }
}

#[async_trait]
impl StructuredProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    #[instrument(skip_all, fields(provider = "openai", model = %request.model, schema = %request.schema.name))]
    async fn complete(&self, request: &StructuredRequest) -> ProviderResult<Value> {
        let started = Instant::now();
        let result = self.send(request).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.category(),
        };
        metrics::counter!(
            "provider_requests_total",
            "provider" => "openai",
            "model" => request.model.clone(),
            "outcome" => outcome
        )
        .increment(1);
        metrics::histogram!("provider_request_duration_seconds", "provider" => "openai")
            .record(started.elapsed().as_secs_f64());
        if let Err(e) = &result {
            warn!(error = %e, "structured completion failed");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
