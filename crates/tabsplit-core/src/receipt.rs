//! Receipt and itemization domain types.
//!
//! Field names are `snake_case` on the wire: they double as the target
//! schemas handed to the structured extraction and reasoning services.
//!
//! - [`ReceiptExtraction`]: what the extraction service reads off the image
//! - [`ItemizationBreakdown`]: what the reasoning service returns (list-shaped)
//! - [`Itemization`]: the final split, map-shaped, with tax apportioned

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Tolerance used when comparing money amounts.
pub const MONEY_EPSILON: f64 = 0.005;

/// A single line item on the receipt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReceiptItem {
    /// Name of the item.
    pub name: String,
    /// Price of the item.
    pub price: f64,
}

impl ReceiptItem {
    /// Construct an item.
    #[must_use]
    pub fn new(name: impl Into<String>, price: f64) -> Self {
        Self {
            name: name.into(),
            price,
        }
    }
}

/// Data extracted from a receipt image.
///
/// Only `items`, `tax` and `analysis` survive into session state;
/// `subtotal` and `total` are used for a consistency check and dropped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReceiptExtraction {
    /// Items on the receipt, in receipt order.
    pub items: Vec<ReceiptItem>,
    /// Subtotal printed on the receipt.
    pub subtotal: f64,
    /// Tax amount printed on the receipt.
    pub tax: f64,
    /// Total printed on the receipt.
    pub total: f64,
    /// Short free-text analysis of the receipt.
    pub analysis: String,
}

impl ReceiptExtraction {
    /// Sum of the extracted item prices.
    #[must_use]
    pub fn items_total(&self) -> f64 {
        self.items.iter().map(|i| i.price).sum()
    }

    /// Whether the item prices add up to the printed subtotal.
    #[must_use]
    pub fn items_match_subtotal(&self) -> bool {
        (self.items_total() - self.subtotal).abs() < MONEY_EPSILON
    }
}

/// How much one person owes for one item (reasoning-service shape).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersonSplit {
    /// Name of the person.
    pub person_name: String,
    /// Amount this person owes for the item.
    pub amount: f64,
}

/// Pre-tax total one person owes (reasoning-service shape).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersonTotal {
    /// Name of the person.
    pub person_name: String,
    /// Amount this person owes before tax.
    pub total: f64,
}

/// One item and its per-person splits (reasoning-service shape).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemBreakdown {
    /// Name of the item.
    pub item_name: String,
    /// Price of the item.
    pub item_price: f64,
    /// Amount each person owes for this item.
    pub splits: Vec<PersonSplit>,
}

/// Raw result of the split reasoning call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemizationBreakdown {
    /// Per-item breakdown.
    pub item_breakdown: Vec<ItemBreakdown>,
    /// Per-person pre-tax totals.
    pub person_totals: Vec<PersonTotal>,
    /// Overall pre-tax total.
    pub total_before_tax: f64,
}

/// One item of the final itemization with a name → amount mapping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemSplit {
    /// Name of the item.
    pub item_name: String,
    /// Price of the item.
    pub item_price: f64,
    /// Participant name → amount owed for this item.
    pub splits: IndexMap<String, f64>,
}

impl ItemSplit {
    /// Sum of the per-person amounts for this item.
    #[must_use]
    pub fn split_total(&self) -> f64 {
        self.splits.values().sum()
    }

    /// Whether the per-person amounts add up to the item price.
    ///
    /// Not enforced anywhere: the reasoning service is trusted, and this is
    /// only used to log suspicious results.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        (self.split_total() - self.item_price).abs() < MONEY_EPSILON
    }
}

/// Final itemization: who owes what, tax included.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Itemization {
    /// Per-item breakdown.
    pub item_breakdown: Vec<ItemSplit>,
    /// Participant name → final total including apportioned tax.
    pub person_totals: IndexMap<String, f64>,
    /// Overall pre-tax total.
    pub total_before_tax: f64,
    /// Tax total copied from the extraction.
    pub total_tax: f64,
}

impl Itemization {
    /// Sum of every person's final total.
    #[must_use]
    pub fn grand_total(&self) -> f64 {
        self.person_totals.values().sum()
    }
}

/// Round a money amount to cents for display.
#[must_use]
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extraction() -> ReceiptExtraction {
        ReceiptExtraction {
            items: vec![ReceiptItem::new("Pizza", 20.0), ReceiptItem::new("Soda", 4.0)],
            subtotal: 24.0,
            tax: 2.0,
            total: 26.0,
            analysis: "2 items".into(),
        }
    }

    #[test]
    fn items_total_sums_prices() {
        assert!((extraction().items_total() - 24.0).abs() < f64::EPSILON);
        assert!(extraction().items_match_subtotal());
    }

    #[test]
    fn subtotal_mismatch_detected() {
        let mut e = extraction();
        e.subtotal = 30.0;
        assert!(!e.items_match_subtotal());
    }

    #[test]
    fn breakdown_deserializes_snake_case() {
        let raw: ItemizationBreakdown = serde_json::from_value(json!({
            "item_breakdown": [{
                "item_name": "Coffee",
                "item_price": 5.0,
                "splits": [{"person_name": "Alice", "amount": 5.0}]
            }],
            "person_totals": [{"person_name": "Alice", "total": 5.0}],
            "total_before_tax": 5.0
        }))
        .unwrap();
        assert_eq!(raw.item_breakdown[0].splits[0].person_name, "Alice");
        assert_eq!(raw.person_totals.len(), 1);
    }

    #[test]
    fn item_split_balance() {
        let mut splits = IndexMap::new();
        let _ = splits.insert("Alice".to_string(), 10.0);
        let _ = splits.insert("Bob".to_string(), 10.0);
        let item = ItemSplit {
            item_name: "Pizza".into(),
            item_price: 20.0,
            splits,
        };
        assert!(item.is_balanced());
        assert!((item.split_total() - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn itemization_preserves_person_order() {
        let mut totals = IndexMap::new();
        let _ = totals.insert("Zed".to_string(), 1.0);
        let _ = totals.insert("Amy".to_string(), 2.0);
        let it = Itemization {
            item_breakdown: vec![],
            person_totals: totals,
            total_before_tax: 3.0,
            total_tax: 0.0,
        };
        let json = serde_json::to_string(&it).unwrap();
        assert!(json.find("Zed").unwrap() < json.find("Amy").unwrap());
        assert!((it.grand_total() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn round_cents_rounds_half_up() {
        assert!((round_cents(13.004) - 13.0).abs() < f64::EPSILON);
        assert!((round_cents(2.675_1) - 2.68).abs() < 1e-9);
    }
}
