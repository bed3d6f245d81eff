//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may be partial: missing fields get their default value.

mod api;
mod pipeline;

pub use api::*;
pub use pipeline::*;

use serde::{Deserialize, Serialize};
pub use tabsplit_core::retry::RetryConfig as RetrySettings;

/// Root settings type.
///
/// Loaded from `~/.tabsplit/settings.json` with defaults applied for
/// missing fields. Example:
///
/// ```json
/// {
///   "models": { "reasoningModel": "gpt-5" },
///   "retry": { "maxRetries": 5 }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TabsplitSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// Provider API settings.
    pub api: ApiSettings,
    /// Model selection for the extraction and reasoning calls.
    pub models: ModelSettings,
    /// Retry configuration for provider calls.
    pub retry: RetrySettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
    /// Pipeline behavior.
    pub pipeline: PipelineSettings,
}

impl Default for TabsplitSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "tabsplit".to_string(),
            api: ApiSettings::default(),
            models: ModelSettings::default(),
            retry: RetrySettings::default(),
            logging: LoggingSettings::default(),
            pipeline: PipelineSettings::default(),
        }
    }
}

impl TabsplitSettings {
    /// Clamp out-of-range values and correct invalid invariants.
    ///
    /// Called automatically during loading. Bad values are corrected with a
    /// warning rather than rejected.
    pub fn validate(&mut self) {
        fn clamp(val: &mut f64, min: f64, max: f64, name: &str) {
            if *val < min || *val > max {
                let clamped = val.clamp(min, max);
                tracing::warn!("{name} out of range ({val}), clamped to {clamped}");
                *val = clamped;
            }
        }

        clamp(&mut self.retry.jitter_factor, 0.0, 1.0, "jitter_factor");
        if let Some(t) = self.models.extraction_temperature.as_mut() {
            clamp(t, 0.0, 2.0, "extraction_temperature");
        }
        if let Some(t) = self.models.reasoning_temperature.as_mut() {
            clamp(t, 0.0, 2.0, "reasoning_temperature");
        }

        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            tracing::warn!(
                "retry max_delay_ms ({}) < base_delay_ms ({}), correcting",
                self.retry.max_delay_ms,
                self.retry.base_delay_ms
            );
            self.retry.max_delay_ms = self.retry.base_delay_ms;
        }

        if self.pipeline.max_concurrent_runs == 0 {
            tracing::warn!("max_concurrent_runs is 0, using 1");
            self.pipeline.max_concurrent_runs = 1;
        }

        if !self.pipeline.image_mime_type.starts_with("image/") {
            tracing::warn!(
                mime = %self.pipeline.image_mime_type,
                "image_mime_type is not an image type, using default"
            );
            self.pipeline.image_mime_type = DEFAULT_IMAGE_MIME_TYPE.to_string();
        }

        let base = self.api.openai.base_url.trim_end_matches('/').to_string();
        self.api.openai.base_url = base;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
