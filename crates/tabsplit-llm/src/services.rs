//! The two model-backed services the pipeline calls.
//!
//! - [`ReceiptExtractor`]: image in, [`ReceiptExtraction`] out
//! - [`SplitReasoner`]: items, participants and free-text instructions in,
//!   [`ItemizationBreakdown`] out
//!
//! The `Llm*` implementations bind a prompt, a model and a target schema to a
//! [`StructuredProvider`] and wrap the call in [`with_retry`].

use std::sync::Arc;

use async_trait::async_trait;
use tabsplit_core::retry::RetryConfig;
use tabsplit_core::{ItemizationBreakdown, ReceiptExtraction, ReceiptItem};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::provider::{ImageInput, ProviderResult, StructuredProvider, StructuredRequest};
use crate::retry::with_retry;
use crate::schema::StructuredOutput;

/// Instruction sent with the receipt image.
pub const EXTRACTION_PROMPT: &str = "Extract all items from this receipt with their individual prices, \
plus the tax amount and total. Also give an analysis of the receipt, including the total number \
of items, the total amount, and the total tax. Be concise and to the point.";

/// Build the split reasoning prompt.
pub fn split_prompt(items: &[ReceiptItem], people: &[String], instructions: &str) -> String {
    let items_json = serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string());
    let people_json = serde_json::to_string(people).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Parse these split instructions and calculate how much each person owes for each item.\n\n\
         Items: {items_json}\n\
         People: {people_json}\n\
         Split Instructions: {instructions}\n\n\
         Calculate the breakdown of who owes what for each item, including:\n\
         - Each item with its name, price, and how much each person owes for it\n\
         - The total each person owes before tax\n\
         - The overall total before tax"
    )
}

/// Model parameters for one service.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelParams {
    /// Model ID.
    pub model: String,
    /// Sampling temperature (`None` = provider default).
    pub temperature: Option<f64>,
    /// Output token cap.
    pub max_output_tokens: Option<u32>,
}

impl ModelParams {
    /// Params for `model` with provider defaults.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: None,
            max_output_tokens: None,
        }
    }

    /// Set the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the output token cap.
    #[must_use]
    pub fn with_max_output_tokens(mut self, max_output_tokens: Option<u32>) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }
}

/// Reads items, tax and totals off a receipt image.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReceiptExtractor: Send + Sync {
    /// Extract structured receipt data from raw image bytes.
    async fn extract(
        &self,
        image: &[u8],
        mime_type: &str,
        cancel: &CancellationToken,
    ) -> ProviderResult<ReceiptExtraction>;
}

/// Turns free-text split instructions into a per-item, per-person breakdown.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SplitReasoner: Send + Sync {
    /// Compute the pre-tax breakdown.
    async fn itemize(
        &self,
        items: &[ReceiptItem],
        people: &[String],
        instructions: &str,
        cancel: &CancellationToken,
    ) -> ProviderResult<ItemizationBreakdown>;
}

/// [`ReceiptExtractor`] backed by a vision-capable model.
pub struct LlmReceiptExtractor {
    provider: Arc<dyn StructuredProvider>,
    params: ModelParams,
    retry: RetryConfig,
}

impl LlmReceiptExtractor {
    /// Create an extractor.
    pub fn new(provider: Arc<dyn StructuredProvider>, params: ModelParams, retry: RetryConfig) -> Self {
        Self {
            provider,
            params,
            retry,
        }
    }
}

#[async_trait]
impl ReceiptExtractor for LlmReceiptExtractor {
    async fn extract(
        &self,
        image: &[u8],
        mime_type: &str,
        cancel: &CancellationToken,
    ) -> ProviderResult<ReceiptExtraction> {
        let request = StructuredRequest {
            model: self.params.model.clone(),
            temperature: self.params.temperature,
            max_output_tokens: self.params.max_output_tokens,
            prompt: EXTRACTION_PROMPT.to_string(),
            image: Some(ImageInput::from_bytes(image, mime_type)),
            schema: ReceiptExtraction::output_schema(),
        };
        debug!(
            provider = self.provider.name(),
            model = %request.model,
            image_bytes = image.len(),
            "extracting receipt"
        );

        let value = with_retry(&self.retry, cancel, || self.provider.complete(&request)).await?;
        let receipt = ReceiptExtraction::from_output(value)?;

        if !receipt.items_match_subtotal() {
            warn!(
                items_total = receipt.items_total(),
                subtotal = receipt.subtotal,
                "extracted item prices do not add up to the printed subtotal"
            );
        }
        info!(items = receipt.items.len(), tax = receipt.tax, "receipt extracted");
        Ok(receipt)
    }
}

/// [`SplitReasoner`] backed by a reasoning model.
pub struct LlmSplitReasoner {
    provider: Arc<dyn StructuredProvider>,
    params: ModelParams,
    retry: RetryConfig,
}

impl LlmSplitReasoner {
    /// Create a reasoner.
    pub fn new(provider: Arc<dyn StructuredProvider>, params: ModelParams, retry: RetryConfig) -> Self {
        Self {
            provider,
            params,
            retry,
        }
    }
}

#[async_trait]
impl SplitReasoner for LlmSplitReasoner {
    async fn itemize(
        &self,
        items: &[ReceiptItem],
        people: &[String],
        instructions: &str,
        cancel: &CancellationToken,
    ) -> ProviderResult<ItemizationBreakdown> {
        let request = StructuredRequest {
            model: self.params.model.clone(),
            temperature: self.params.temperature,
            max_output_tokens: self.params.max_output_tokens,
            prompt: split_prompt(items, people, instructions),
            image: None,
            schema: ItemizationBreakdown::output_schema(),
        };
        debug!(
            provider = self.provider.name(),
            model = %request.model,
            items = items.len(),
            people = people.len(),
            "reasoning about split"
        );

        let value = with_retry(&self.retry, cancel, || self.provider.complete(&request)).await?;
        let breakdown = ItemizationBreakdown::from_output(value)?;
        info!(
            items = breakdown.item_breakdown.len(),
            total_before_tax = breakdown.total_before_tax,
            "split computed"
        );
        Ok(breakdown)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::provider::{MockStructuredProvider, ProviderError};

    fn no_retry() -> RetryConfig {
        RetryConfig::disabled()
    }

    fn receipt_json() -> serde_json::Value {
        json!({
            "items": [{"name": "Coffee", "price": 4.0}, {"name": "Bagel", "price": 3.0}],
            "subtotal": 7.0,
            "tax": 0.7,
            "total": 7.7,
            "analysis": "2 items, total $7.70, tax $0.70."
        })
    }

    // ── prompts ─────────────────────────────────────────────────────

    #[test]
    fn split_prompt_embeds_inputs_as_json() {
        let items = vec![ReceiptItem::new("Coffee", 4.0)];
        let people = vec!["Alice".to_string(), "Bob".to_string()];
        let prompt = split_prompt(&items, &people, "split evenly");
        assert!(prompt.contains(r#"Items: [{"name":"Coffee","price":4.0}]"#));
        assert!(prompt.contains(r#"People: ["Alice","Bob"]"#));
        assert!(prompt.contains("Split Instructions: split evenly"));
        assert!(prompt.ends_with("- The overall total before tax"));
    }

    #[test]
    fn extraction_prompt_mentions_tax_and_analysis() {
        assert!(EXTRACTION_PROMPT.starts_with("Extract all items from this receipt"));
        assert!(EXTRACTION_PROMPT.contains("the total tax"));
    }

    // ── extractor ───────────────────────────────────────────────────

    #[tokio::test]
    async fn extractor_sends_image_and_schema() {
        let mut provider = MockStructuredProvider::new();
        let _ = provider.expect_name().return_const("mock");
        let _ = provider
            .expect_complete()
            .withf(|req| {
                req.model == "gpt-4o-mini"
                    && req.temperature == Some(0.0)
                    && req.schema.name == "receipt_extraction"
                    && req
                        .image
                        .as_ref()
                        .is_some_and(|i| i.mime_type == "image/jpeg" && i.data == "AQI=")
            })
            .times(1)
            .returning(|_| Ok(receipt_json()));

        let extractor = LlmReceiptExtractor::new(
            Arc::new(provider),
            ModelParams::new("gpt-4o-mini").with_temperature(Some(0.0)),
            no_retry(),
        );
        let receipt = extractor
            .extract(&[1, 2], "image/jpeg", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(receipt.items.len(), 2);
        assert!((receipt.tax - 0.7).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn extractor_maps_bad_output_to_schema_error() {
        let mut provider = MockStructuredProvider::new();
        let _ = provider.expect_name().return_const("mock");
        let _ = provider
            .expect_complete()
            .returning(|_| Ok(json!({"items": "nope"})));

        let extractor =
            LlmReceiptExtractor::new(Arc::new(provider), ModelParams::new("m"), no_retry());
        let err = extractor
            .extract(b"x", "image/png", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, ProviderError::Schema { .. });
    }

    #[tokio::test(start_paused = true)]
    async fn extractor_retries_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let mut provider = MockStructuredProvider::new();
        let _ = provider.expect_name().return_const("mock");
        let _ = provider.expect_complete().returning(move |_| {
            if c.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ProviderError::Api {
                    status: 503,
                    message: "overloaded".into(),
                    code: None,
                    retryable: true,
                })
            } else {
                Ok(receipt_json())
            }
        });

        let retry = RetryConfig {
            max_retries: 2,
            base_delay_ms: 10,
            max_delay_ms: 10,
            jitter_factor: 0.0,
        };
        let extractor = LlmReceiptExtractor::new(Arc::new(provider), ModelParams::new("m"), retry);
        let receipt = extractor
            .extract(b"x", "image/png", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(receipt.items.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    // ── reasoner ────────────────────────────────────────────────────

    #[tokio::test]
    async fn reasoner_sends_prompt_without_image() {
        let mut provider = MockStructuredProvider::new();
        let _ = provider.expect_name().return_const("mock");
        let _ = provider
            .expect_complete()
            .withf(|req| {
                req.image.is_none()
                    && req.model == "gpt-5-mini"
                    && req.schema.name == "itemization_breakdown"
                    && req.prompt.contains("Split Instructions: Alice pays")
            })
            .times(1)
            .returning(|_| {
                Ok(json!({
                    "item_breakdown": [{
                        "item_name": "Coffee",
                        "item_price": 4.0,
                        "splits": [{"person_name": "Alice", "amount": 4.0}]
                    }],
                    "person_totals": [{"person_name": "Alice", "total": 4.0}],
                    "total_before_tax": 4.0
                }))
            });

        let reasoner =
            LlmSplitReasoner::new(Arc::new(provider), ModelParams::new("gpt-5-mini"), no_retry());
        let breakdown = reasoner
            .itemize(
                &[ReceiptItem::new("Coffee", 4.0)],
                &["Alice".to_string()],
                "Alice pays",
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(breakdown.person_totals[0].person_name, "Alice");
        assert!((breakdown.total_before_tax - 4.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn reasoner_propagates_refusal() {
        let mut provider = MockStructuredProvider::new();
        let _ = provider.expect_name().return_const("mock");
        let _ = provider.expect_complete().returning(|_| {
            Err(ProviderError::Refusal {
                message: "no".into(),
            })
        });

        let reasoner = LlmSplitReasoner::new(Arc::new(provider), ModelParams::new("m"), no_retry());
        let err = reasoner
            .itemize(&[], &[], "", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, ProviderError::Refusal { .. });
    }
}
