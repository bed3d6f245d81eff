//! Stage 1: pull the receipt image out of the latest message.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tabsplit_core::{ContentBlock, Message};
use tracing::{debug, warn};

use crate::state::{SessionState, StateUpdate};

/// A decoded image and the MIME type its block declared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedImage {
    /// Raw bytes.
    pub bytes: Vec<u8>,
    /// Declared MIME type.
    pub mime_type: Option<String>,
}

/// Decode the first non-empty image block of the most recent message.
///
/// Returns `None` when there are no messages, the latest one carries no
/// image block, or the data is not valid base64. ASCII whitespace in the
/// payload is ignored so line-wrapped (MIME style) encodings decode. Decode
/// failures are logged and otherwise swallowed.
pub fn decode_latest_image(messages: &[Message]) -> Option<LoadedImage> {
    let last = messages.last()?;
    let (data, mime_type) = last.blocks().iter().find_map(|block| match block {
        ContentBlock::Image { data, mime_type } => {
            let compact: Vec<u8> = data.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
            (!compact.is_empty()).then_some((compact, mime_type))
        }
        _ => None,
    })?;

    match STANDARD.decode(&data) {
        Ok(bytes) => Some(LoadedImage {
            bytes,
            mime_type: mime_type.clone(),
        }),
        Err(e) => {
            warn!(error = %e, encoded_len = data.len(), "failed to decode image block");
            None
        }
    }
}

/// Run the stage.
pub fn load_image(state: &SessionState) -> StateUpdate {
    match decode_latest_image(&state.messages) {
        Some(image) => {
            debug!(bytes = image.bytes.len(), mime = ?image.mime_type, "image loaded");
            StateUpdate {
                image_data: Some(image.bytes),
                image_mime_type: image.mime_type,
                ..StateUpdate::default()
            }
        }
        None => {
            debug!("no image in latest message");
            StateUpdate::default()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
