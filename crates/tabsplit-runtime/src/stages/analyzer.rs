//! Stage 2: extract items and tax from the receipt image.

use tabsplit_llm::ReceiptExtractor;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::errors::Result;
use crate::state::{SessionState, StateUpdate};

/// Run the stage.
///
/// Requires image bytes; their absence is fatal. Only items, tax and the
/// analysis text are kept from the extraction.
#[instrument(skip_all)]
pub async fn analyze_receipt(
    state: &SessionState,
    extractor: &dyn ReceiptExtractor,
    default_mime_type: &str,
    cancel: &CancellationToken,
) -> Result<StateUpdate> {
    let image = state.require_image()?;
    let mime_type = state
        .image_mime_type
        .as_deref()
        .unwrap_or(default_mime_type);

    let receipt = extractor.extract(image, mime_type, cancel).await?;
    info!(
        items = receipt.items.len(),
        tax = receipt.tax,
        total = receipt.total,
        "receipt analyzed"
    );

    Ok(StateUpdate {
        analysis: Some(receipt.analysis),
        receipt_items: Some(receipt.items),
        total_tax: Some(receipt.tax),
        ..StateUpdate::default()
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
