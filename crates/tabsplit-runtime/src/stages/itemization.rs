//! Stage 5: compute the split and apportion tax.
//!
//! The reasoning service does the per-item allocation. The only local
//! arithmetic is [`apportion_tax`]: each person pays tax in proportion to
//! their share of the pre-tax total.

use indexmap::IndexMap;
use tabsplit_core::{ItemSplit, Itemization, ItemizationBreakdown, Message, round_cents};
use tabsplit_llm::SplitReasoner;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::errors::Result;
use crate::stages::Stage;
use crate::state::{SessionState, StateUpdate};

/// Turn the reasoning result into the final itemization.
///
/// `final = pretax + total_tax * pretax / total_before_tax`, and
/// `final = pretax` when `total_before_tax` is not positive. Pure: the same
/// input always yields the same output.
pub fn apportion_tax(breakdown: &ItemizationBreakdown, total_tax: f64) -> Itemization {
    let item_breakdown = breakdown
        .item_breakdown
        .iter()
        .map(|item| ItemSplit {
            item_name: item.item_name.clone(),
            item_price: item.item_price,
            splits: item
                .splits
                .iter()
                .map(|s| (s.person_name.clone(), s.amount))
                .collect(),
        })
        .collect();

    let subtotal = breakdown.total_before_tax;
    let person_totals: IndexMap<String, f64> = breakdown
        .person_totals
        .iter()
        .map(|p| {
            let total = if subtotal > 0.0 {
                p.total + total_tax * (p.total / subtotal)
            } else {
                p.total
            };
            (p.person_name.clone(), total)
        })
        .collect();

    Itemization {
        item_breakdown,
        person_totals,
        total_before_tax: subtotal,
        total_tax,
    }
}

/// Human-readable rendering appended to the message log.
pub fn render_itemization(itemization: &Itemization) -> String {
    let body = serde_json::to_string_pretty(itemization).unwrap_or_else(|_| format!("{itemization:?}"));
    format!("Split calculated:\n{body}")
}

fn log_suspicious(itemization: &Itemization) {
    for item in &itemization.item_breakdown {
        if !item.is_balanced() {
            warn!(
                item = %item.item_name,
                price = item.item_price,
                split_total = round_cents(item.split_total()),
                "item splits do not add up to the item price"
            );
        }
    }
}

/// Run the stage.
#[instrument(skip_all)]
pub async fn calculate_itemization(
    state: &SessionState,
    reasoner: &dyn SplitReasoner,
    cancel: &CancellationToken,
) -> Result<StateUpdate> {
    let stage = Stage::CalculateItemization;
    let items = state.require_items(stage)?;
    let people = state.require_people(stage)?;
    let instructions = state.require_instructions(stage)?;
    let total_tax = state.require_tax(stage)?;

    let breakdown = reasoner.itemize(items, people, instructions, cancel).await?;
    let itemization = apportion_tax(&breakdown, total_tax);
    log_suspicious(&itemization);
    info!(
        people = itemization.person_totals.len(),
        total_before_tax = itemization.total_before_tax,
        total_tax,
        "itemization calculated"
    );

    Ok(StateUpdate {
        messages: vec![Message::assistant(render_itemization(&itemization))],
        itemization: Some(itemization),
        ..StateUpdate::default()
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
