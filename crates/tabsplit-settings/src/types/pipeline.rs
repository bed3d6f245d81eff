//! Pipeline and logging settings.

use serde::{Deserialize, Serialize};

/// Default MIME type assumed for inbound images without one.
pub const DEFAULT_IMAGE_MIME_TYPE: &str = "image/png";

/// Pipeline behavior settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineSettings {
    /// MIME type used when the image block does not carry one.
    pub image_mime_type: String,
    /// Reject participant input whose count differs from the number of names.
    pub enforce_participant_count: bool,
    /// How long a suspended run is kept before `prune_expired` drops it.
    /// `0` keeps suspended runs forever.
    pub suspended_run_ttl_ms: u64,
    /// Maximum number of runs executing a stage at the same time.
    pub max_concurrent_runs: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            image_mime_type: DEFAULT_IMAGE_MIME_TYPE.to_string(),
            enforce_participant_count: false,
            suspended_run_ttl_ms: 24 * 60 * 60 * 1000,
            max_concurrent_runs: 64,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`trace`, `debug`, `info`, `warn`, `error`) or any
    /// `EnvFilter` directive string.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_defaults() {
        let p = PipelineSettings::default();
        assert_eq!(p.image_mime_type, "image/png");
        assert!(!p.enforce_participant_count);
        assert_eq!(p.suspended_run_ttl_ms, 86_400_000);
        assert_eq!(p.max_concurrent_runs, 64);
    }

    #[test]
    fn pipeline_serde_camel_case() {
        let json = serde_json::to_value(PipelineSettings::default()).unwrap();
        assert!(json.get("imageMimeType").is_some());
        assert!(json.get("enforceParticipantCount").is_some());
        assert!(json.get("suspendedRunTtlMs").is_some());
    }

    #[test]
    fn logging_defaults() {
        let l = LoggingSettings::default();
        assert_eq!(l.level, "warn");
        assert!(!l.json);
    }
}
