//! # tabsplit-settings
//!
//! Layered configuration for the bill-splitting pipeline.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`TabsplitSettings::default()`]
//! 2. **User file**: `~/.tabsplit/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `OPENAI_*` and `TABSPLIT_*` overrides
//!
//! The loaded value is passed explicitly to whatever needs it; there is no
//! process-wide cache.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path,
    load_settings_with_env, settings_path,
};
pub use types::*;
