//! Target schemas for structured model output.
//!
//! Schemas are strict: every property is required and no extra properties
//! are allowed, so a conforming reply deserializes straight into the Rust
//! type.

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tabsplit_core::{ItemizationBreakdown, ReceiptExtraction};

use crate::provider::{OutputSchema, ProviderError, ProviderResult};

/// A type the model can be asked to produce.
pub trait StructuredOutput: DeserializeOwned {
    /// Schema name sent to the provider.
    const NAME: &'static str;

    /// The schema describing `Self`.
    fn output_schema() -> OutputSchema;

    /// Decode a model reply into `Self`.
    fn from_output(value: Value) -> ProviderResult<Self> {
        serde_json::from_value(value).map_err(|e| ProviderError::Schema {
            schema: Self::NAME.to_string(),
            message: e.to_string(),
        })
    }
}

fn object(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

impl StructuredOutput for ReceiptExtraction {
    const NAME: &'static str = "receipt_extraction";

    fn output_schema() -> OutputSchema {
        let item = object(
            json!({
                "name": { "type": "string", "description": "Name of the item" },
                "price": { "type": "number", "description": "Price of the item" },
            }),
            &["name", "price"],
        );
        let schema = object(
            json!({
                "items": { "type": "array", "items": item, "description": "List of items on the receipt" },
                "subtotal": { "type": "number", "description": "Subtotal before tax" },
                "tax": { "type": "number", "description": "Tax amount" },
                "total": { "type": "number", "description": "Total amount" },
                "analysis": { "type": "string", "description": "Short analysis of the receipt" },
            }),
            &["items", "subtotal", "tax", "total", "analysis"],
        );
        OutputSchema {
            name: Self::NAME.to_string(),
            description: "Items, tax and totals read from a receipt image".to_string(),
            schema,
        }
    }
}

impl StructuredOutput for ItemizationBreakdown {
    const NAME: &'static str = "itemization_breakdown";

    fn output_schema() -> OutputSchema {
        let split = object(
            json!({
                "person_name": { "type": "string", "description": "Name of the person" },
                "amount": { "type": "number", "description": "Amount this person owes for the item" },
            }),
            &["person_name", "amount"],
        );
        let item = object(
            json!({
                "item_name": { "type": "string", "description": "Name of the item" },
                "item_price": { "type": "number", "description": "Price of the item" },
                "splits": { "type": "array", "items": split, "description": "How much each person owes for this item" },
            }),
            &["item_name", "item_price", "splits"],
        );
        let person_total = object(
            json!({
                "person_name": { "type": "string", "description": "Name of the person" },
                "total": { "type": "number", "description": "Total amount this person owes before tax" },
            }),
            &["person_name", "total"],
        );
        let schema = object(
            json!({
                "item_breakdown": { "type": "array", "items": item },
                "person_totals": { "type": "array", "items": person_total },
                "total_before_tax": { "type": "number", "description": "Total amount before tax" },
            }),
            &["item_breakdown", "person_totals", "total_before_tax"],
        );
        OutputSchema {
            name: Self::NAME.to_string(),
            description: "Per-item and per-person split of a receipt before tax".to_string(),
            schema,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn assert_strict(schema: &Value) {
        if schema["type"] == "object" {
            assert_eq!(schema["additionalProperties"], false);
            let props = schema["properties"].as_object().unwrap();
            let required: Vec<&str> = schema["required"]
                .as_array()
                .unwrap()
                .iter()
                .map(|v| v.as_str().unwrap())
                .collect();
            for (key, child) in props {
                assert!(required.contains(&key.as_str()), "{key} not required");
                assert_strict(child);
            }
        } else if schema["type"] == "array" {
            assert_strict(&schema["items"]);
        }
    }

    #[test]
    fn receipt_schema_is_strict() {
        let schema = ReceiptExtraction::output_schema();
        assert_eq!(schema.name, "receipt_extraction");
        assert_strict(&schema.schema);
    }

    #[test]
    fn itemization_schema_is_strict() {
        let schema = ItemizationBreakdown::output_schema();
        assert_eq!(schema.name, "itemization_breakdown");
        assert_strict(&schema.schema);
    }

    #[test]
    fn decodes_conforming_receipt() {
        let value = json!({
            "items": [{"name": "Coffee", "price": 4.0}],
            "subtotal": 4.0,
            "tax": 0.4,
            "total": 4.4,
            "analysis": "One item."
        });
        let receipt = ReceiptExtraction::from_output(value).unwrap();
        assert_eq!(receipt.items.len(), 1);
        assert!((receipt.tax - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_field_is_schema_error() {
        let value = json!({"item_breakdown": [], "person_totals": []});
        assert_matches!(
            ItemizationBreakdown::from_output(value),
            Err(ProviderError::Schema { schema, message })
                if schema == "itemization_breakdown" && message.contains("total_before_tax")
        );
    }
}
