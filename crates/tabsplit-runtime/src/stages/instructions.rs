//! Stage 4: collect free-text split instructions.
//!
//! The text is stored as given; interpreting it is the reasoning service's
//! job in stage 5.

use std::fmt::Write as _;

use tabsplit_core::{Message, ReceiptItem};

use crate::interrupt::Interrupt;
use crate::state::StateUpdate;

const EXAMPLES: &str = "Examples:\n\
- \"Item 1 split between Alice and Bob\"\n\
- \"Item 2 Alice pays\"\n\
- \"Item 3 all of us\"\n\
- \"Item 4 2 shares Alice, 1 share Bob\"\n\
- \"Split everything equally\"\n\
- \"I pay for items 1-2, they split items 3-4\"";

/// Prompt text listing the items (1-based, prices to the cent) and people.
pub fn prompt_text(items: &[ReceiptItem], people: &[String]) -> String {
    let mut text = String::from("How should we split the bill?\n\nItems:\n");
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            text.push('\n');
        }
        let _ = write!(text, "{}. {}: ${:.2}", i + 1, item.name, item.price);
    }
    let _ = write!(text, "\n\nPeople: {}\n\n{EXAMPLES}", people.join(", "));
    text
}

/// The instructions prompt, optionally carrying a rejection message.
pub fn instructions_prompt(items: &[ReceiptItem], people: &[String], error: Option<String>) -> Interrupt {
    Interrupt::Prompt {
        text: prompt_text(items, people),
        error,
    }
}

/// Accept the answer, or explain why it was rejected.
pub fn accept_instructions(raw: String) -> Result<StateUpdate, String> {
    if raw.trim().is_empty() {
        return Err("Tell me how to split the bill".to_string());
    }
    Ok(StateUpdate {
        messages: vec![Message::assistant(format!("Processing: {raw}"))],
        split_instructions: Some(raw),
        ..StateUpdate::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_lists_items_and_people() {
        let items = vec![ReceiptItem::new("Pizza", 20.0), ReceiptItem::new("Soda", 4.5)];
        let people = vec!["Alice".to_string(), "Bob".to_string()];
        let text = prompt_text(&items, &people);
        assert!(text.starts_with(
            "How should we split the bill?\n\nItems:\n1. Pizza: $20.00\n2. Soda: $4.50\n\nPeople: Alice, Bob\n\nExamples:\n"
        ));
        assert!(text.ends_with("- \"I pay for items 1-2, they split items 3-4\""));
    }

    #[test]
    fn prompt_with_no_items() {
        let text = prompt_text(&[], &["Alice".to_string()]);
        assert!(text.contains("Items:\n\n\nPeople: Alice"));
    }

    #[test]
    fn prompt_interrupt_carries_error() {
        let interrupt = instructions_prompt(&[], &[], Some("empty".into()));
        assert_eq!(interrupt.error(), Some("empty"));
    }

    #[test]
    fn answer_stored_raw_with_ack() {
        let update = accept_instructions("  Alice pays  ".to_string()).unwrap();
        assert_eq!(update.split_instructions.as_deref(), Some("  Alice pays  "));
        assert_eq!(update.messages[0].text(), "Processing:   Alice pays  ");
    }

    #[test]
    fn blank_answer_rejected() {
        assert!(accept_instructions(" \n ".to_string()).is_err());
    }
}
