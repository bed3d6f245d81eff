//! Session state accumulated across a run.
//!
//! Stages never mutate state directly: they return a [`StateUpdate`] that is
//! merged with [`SessionState::apply`]. Messages are append-only and fields
//! are never cleared once set.

use serde::{Deserialize, Serialize};
use tabsplit_core::{Itemization, Message, ReceiptItem};

use crate::errors::{Result, RuntimeError};
use crate::stages::Stage;

/// Everything a run has learned so far.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Exchanged messages, oldest first.
    pub messages: Vec<Message>,
    /// Raw receipt image bytes (base64 on the wire).
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Option::is_none")]
    pub image_data: Option<Vec<u8>>,
    /// MIME type the image block declared, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_mime_type: Option<String>,
    /// Free-text receipt analysis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    /// Declared number of participants.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_people: Option<u32>,
    /// Participant names, in the order given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub people_names: Option<Vec<String>>,
    /// Receipt line items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_items: Option<Vec<ReceiptItem>>,
    /// Tax total read off the receipt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tax: Option<f64>,
    /// Raw split instructions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_instructions: Option<String>,
    /// Final itemization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itemization: Option<Itemization>,
}

/// Fields a stage produced. `None` leaves the current value alone.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateUpdate {
    /// Messages to append.
    pub messages: Vec<Message>,
    /// See [`SessionState::image_data`].
    pub image_data: Option<Vec<u8>>,
    /// See [`SessionState::image_mime_type`].
    pub image_mime_type: Option<String>,
    /// See [`SessionState::analysis`].
    pub analysis: Option<String>,
    /// See [`SessionState::num_people`].
    pub num_people: Option<u32>,
    /// See [`SessionState::people_names`].
    pub people_names: Option<Vec<String>>,
    /// See [`SessionState::receipt_items`].
    pub receipt_items: Option<Vec<ReceiptItem>>,
    /// See [`SessionState::total_tax`].
    pub total_tax: Option<f64>,
    /// See [`SessionState::split_instructions`].
    pub split_instructions: Option<String>,
    /// See [`SessionState::itemization`].
    pub itemization: Option<Itemization>,
}

impl SessionState {
    /// Fresh state seeded with inbound messages.
    pub fn with_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// Merge a stage's output.
    pub fn apply(&mut self, update: StateUpdate) {
        fn set<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        self.messages.extend(update.messages);
        set(&mut self.image_data, update.image_data);
        set(&mut self.image_mime_type, update.image_mime_type);
        set(&mut self.analysis, update.analysis);
        set(&mut self.num_people, update.num_people);
        set(&mut self.people_names, update.people_names);
        set(&mut self.receipt_items, update.receipt_items);
        set(&mut self.total_tax, update.total_tax);
        set(&mut self.split_instructions, update.split_instructions);
        set(&mut self.itemization, update.itemization);
    }

    // ── Preconditions ───────────────────────────────────────────────

    /// Image bytes, or [`RuntimeError::MissingImage`].
    pub fn require_image(&self) -> Result<&[u8]> {
        self.image_data
            .as_deref()
            .filter(|bytes| !bytes.is_empty())
            .ok_or(RuntimeError::MissingImage)
    }

    /// Receipt items.
    pub fn require_items(&self, stage: Stage) -> Result<&[ReceiptItem]> {
        self.receipt_items
            .as_deref()
            .ok_or(RuntimeError::MissingState {
                stage,
                field: "receipt_items",
            })
    }

    /// Participant names.
    pub fn require_people(&self, stage: Stage) -> Result<&[String]> {
        self.people_names
            .as_deref()
            .ok_or(RuntimeError::MissingState {
                stage,
                field: "people_names",
            })
    }

    /// Split instructions.
    pub fn require_instructions(&self, stage: Stage) -> Result<&str> {
        self.split_instructions
            .as_deref()
            .ok_or(RuntimeError::MissingState {
                stage,
                field: "split_instructions",
            })
    }

    /// Tax total.
    pub fn require_tax(&self, stage: Stage) -> Result<f64> {
        self.total_tax.ok_or(RuntimeError::MissingState {
            stage,
            field: "total_tax",
        })
    }
}

mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub(super) fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => serializer.serialize_some(&STANDARD.encode(b)),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
