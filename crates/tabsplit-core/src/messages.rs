//! Exchanged messages and their content blocks.
//!
//! A run's session state carries an append-only list of [`Message`]s. Inbound
//! user messages may carry structured content (a list of [`ContentBlock`]s),
//! one of which can be a base64 image. Outbound acknowledgments appended by
//! the pipeline stages are plain assistant text.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End user (or the calling application on their behalf).
    User,
    /// The pipeline.
    Assistant,
}

/// A single content block inside a structured message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    /// Plain text.
    #[serde(rename = "text")]
    Text {
        /// The text.
        text: String,
    },
    /// Base64-encoded image.
    #[serde(rename = "image")]
    Image {
        /// Base64-encoded image data. Empty when the block carried none.
        #[serde(default)]
        data: String,
        /// MIME type (e.g. `image/png`), if the sender supplied one.
        #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
    /// Any block type the pipeline does not interpret.
    #[serde(other)]
    Other,
}

/// Message content: either a bare string or a list of blocks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text content.
    Text(String),
    /// Structured content blocks.
    Blocks(Vec<ContentBlock>),
}

/// One exchanged message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Author.
    pub role: Role,
    /// Content.
    pub content: MessageContent,
}

impl Message {
    /// Plain-text user message.
    #[must_use]
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    /// Plain-text assistant message.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    /// User message carrying a single image, base64-encoded from raw bytes.
    #[must_use]
    pub fn user_image(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Blocks(vec![ContentBlock::Image {
                data: STANDARD.encode(bytes),
                mime_type: Some(mime_type.into()),
            }]),
        }
    }

    /// Structured content blocks, or an empty slice for plain text content.
    #[must_use]
    pub fn blocks(&self) -> &[ContentBlock] {
        match &self.content {
            MessageContent::Blocks(blocks) => blocks,
            MessageContent::Text(_) => &[],
        }
    }

    /// Concatenated text of the message (text blocks joined with newlines).
    #[must_use]
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
