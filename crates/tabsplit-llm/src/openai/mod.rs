//! `OpenAI` structured-output provider.

pub mod provider;
pub mod types;

pub use provider::OpenAiProvider;
pub use types::OpenAiConfig;
