//! Builds the extraction and reasoning services from settings.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tabsplit_core::{ReceiptExtraction, ReceiptItem};
use tabsplit_llm::mock::{EqualSplitReasoner, StaticReceiptExtractor};
use tabsplit_llm::openai::{OpenAiConfig, OpenAiProvider};
use tabsplit_llm::services::ModelParams;
use tabsplit_llm::{
    LlmReceiptExtractor, LlmSplitReasoner, ReceiptExtractor, SplitReasoner, StructuredProvider,
};
use tabsplit_settings::TabsplitSettings;
use tracing::info;

/// The two collaborators a pipeline needs.
pub struct Services {
    /// Receipt extraction.
    pub extractor: Arc<dyn ReceiptExtractor>,
    /// Split reasoning.
    pub reasoner: Arc<dyn SplitReasoner>,
}

/// Receipt returned for every image in offline mode.
pub fn demo_receipt() -> ReceiptExtraction {
    ReceiptExtraction {
        items: vec![
            ReceiptItem::new("Burger", 12.5),
            ReceiptItem::new("Fries", 4.0),
            ReceiptItem::new("Iced Tea", 3.5),
        ],
        subtotal: 20.0,
        tax: 1.8,
        total: 21.8,
        analysis: "Demo receipt: burger, fries and iced tea".to_string(),
    }
}

/// Deterministic services that never touch the network.
///
/// The reasoner ignores the instructions and splits every item evenly.
pub fn offline_services() -> Services {
    info!("offline mode: using demo receipt and even split");
    Services {
        extractor: Arc::new(StaticReceiptExtractor::new(demo_receipt())),
        reasoner: Arc::new(EqualSplitReasoner),
    }
}

/// OpenAI-backed services.
pub fn openai_services(settings: &TabsplitSettings) -> Result<Services> {
    let openai = &settings.api.openai;
    let Some(api_key) = openai.api_key.as_deref().filter(|k| !k.is_empty()) else {
        bail!("No OpenAI API key configured: set OPENAI_API_KEY or api.openai.apiKey, or pass --offline");
    };

    let config = OpenAiConfig::new(api_key)
        .with_base_url(openai.base_url.clone())
        .with_organization(openai.organization.clone())
        .with_timeout_ms(openai.request_timeout_ms);
    let provider: Arc<dyn StructuredProvider> =
        Arc::new(OpenAiProvider::new(config).context("Failed to build HTTP client")?);

    let models = &settings.models;
    let extraction = ModelParams::new(models.extraction_model.clone())
        .with_temperature(models.extraction_temperature)
        .with_max_output_tokens(models.max_output_tokens);
    let reasoning = ModelParams::new(models.reasoning_model.clone())
        .with_temperature(models.reasoning_temperature)
        .with_max_output_tokens(models.max_output_tokens);
    info!(
        extraction_model = %models.extraction_model,
        reasoning_model = %models.reasoning_model,
        "using OpenAI services"
    );

    Ok(Services {
        extractor: Arc::new(LlmReceiptExtractor::new(
            Arc::clone(&provider),
            extraction,
            settings.retry.clone(),
        )),
        reasoner: Arc::new(LlmSplitReasoner::new(provider, reasoning, settings.retry.clone())),
    })
}

/// Pick offline or OpenAI services.
pub fn build_services(settings: &TabsplitSettings, offline: bool) -> Result<Services> {
    if offline {
        Ok(offline_services())
    } else {
        openai_services(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_receipt_is_consistent() {
        let receipt = demo_receipt();
        assert!(receipt.items_match_subtotal());
        assert!((receipt.subtotal + receipt.tax - receipt.total).abs() < 1e-9);
    }

    #[test]
    fn online_requires_api_key() {
        let settings = TabsplitSettings::default();
        let err = build_services(&settings, false).err().unwrap();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn online_with_key_builds() {
        let mut settings = TabsplitSettings::default();
        settings.api.openai.api_key = Some("sk-test".into());
        assert!(build_services(&settings, false).is_ok());
    }

    #[test]
    fn offline_needs_no_key() {
        assert!(build_services(&TabsplitSettings::default(), true).is_ok());
    }
}
