//! # tabsplit-core
//!
//! Foundation types, branded IDs, and utilities for the tabsplit pipeline.
//!
//! This crate provides the shared vocabulary that all other tabsplit crates depend on:
//!
//! - **Branded IDs**: [`ids::RunId`] as a newtype
//! - **Messages**: [`messages::Message`] with text or structured [`messages::ContentBlock`] content
//! - **Receipt model**: [`receipt::ReceiptItem`], [`receipt::ReceiptExtraction`],
//!   [`receipt::ItemizationBreakdown`] (raw reasoning result), [`receipt::Itemization`] (final split)
//! - **Retry**: [`retry::RetryConfig`] and backoff calculation
//! - **Logging**: [`logging::init_subscriber`]
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other tabsplit crates.

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;
pub mod messages;
pub mod receipt;
pub mod retry;

pub use ids::RunId;
pub use messages::{ContentBlock, Message, MessageContent, Role};
pub use receipt::{
    ItemBreakdown, ItemSplit, Itemization, ItemizationBreakdown, PersonSplit, PersonTotal,
    ReceiptExtraction, ReceiptItem, round_cents,
};
