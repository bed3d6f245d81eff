//! # tabsplit-llm
//!
//! Structured-output language model access for the bill-splitting pipeline.
//!
//! - [`provider::StructuredProvider`]: one request in, one schema-conforming
//!   JSON value out
//! - [`openai::OpenAiProvider`]: Chat Completions with `json_schema` output
//! - [`retry::with_retry`]: exponential backoff with jitter and cancellation
//! - [`services`]: the receipt extraction and split reasoning calls, each
//!   bound to its prompt and target schema
//! - [`mock`]: deterministic in-process services for offline runs

#![deny(unsafe_code)]

pub mod error_parsing;
pub mod mock;
pub mod openai;
pub mod provider;
pub mod retry;
pub mod schema;
pub mod services;

pub use provider::{
    ImageInput, OutputSchema, ProviderError, ProviderResult, StructuredProvider,
    StructuredRequest,
};
pub use services::{LlmReceiptExtractor, LlmSplitReasoner, ReceiptExtractor, SplitReasoner};
