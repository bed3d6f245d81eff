//! Stage 3: ask who is splitting the bill.
//!
//! Suspends with a two-field form. The submission is validated here; a bad
//! submission re-emits the form with an `error` instead of failing the run.

use serde_json::{Map, Value};
use tabsplit_core::Message;

use crate::interrupt::{FieldType, FormField, FormRequest, Interrupt};
use crate::state::StateUpdate;

/// Form key for the participant count.
pub const NUM_PEOPLE_FIELD: &str = "num_people";
/// Form key for the participant names.
pub const PEOPLE_NAMES_FIELD: &str = "people_names";

/// Validated participant input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Participants {
    /// Declared count.
    pub count: u32,
    /// Names, trimmed, in the order given.
    pub names: Vec<String>,
}

/// The participants form, optionally carrying a rejection message.
pub fn participants_form(error: Option<String>) -> Interrupt {
    Interrupt::Form(FormRequest {
        fields: vec![
            FormField {
                name: NUM_PEOPLE_FIELD.to_string(),
                label: "How many people do you want to split the bill with?".to_string(),
                field_type: FieldType::Number,
                required: true,
            },
            FormField {
                name: PEOPLE_NAMES_FIELD.to_string(),
                label: "Enter the names (comma-separated)".to_string(),
                field_type: FieldType::Text,
                required: true,
            },
        ],
        error,
    })
}

/// Split a comma-separated name list, trimming each entry and dropping
/// empty ones.
pub fn split_names(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}

fn parse_count(value: Option<&Value>) -> Result<u32, String> {
    let invalid = || "Number of people must be a whole number of at least 1".to_string();
    let count = match value {
        None | Some(Value::Null) => return Err("Number of people is required".to_string()),
        Some(Value::Number(n)) => match (n.as_u64(), n.as_f64()) {
            (Some(n), _) => n,
            (None, Some(f)) if f.fract().abs() < f64::EPSILON && f >= 0.0 => f as u64,
            _ => return Err(invalid()),
        },
        Some(Value::String(s)) => s.trim().parse::<u64>().map_err(|_| invalid())?,
        Some(_) => return Err(invalid()),
    };
    match u32::try_from(count) {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(invalid()),
    }
}

fn parse_names(value: Option<&Value>) -> Result<Vec<String>, String> {
    let names = match value {
        None | Some(Value::Null) => return Err("Names are required".to_string()),
        Some(Value::String(s)) => split_names(s),
        Some(Value::Array(items)) => {
            let mut names = Vec::with_capacity(items.len());
            for item in items {
                let Value::String(name) = item else {
                    return Err("Names must be text".to_string());
                };
                let name = name.trim();
                if !name.is_empty() {
                    names.push(name.to_string());
                }
            }
            names
        }
        Some(_) => return Err("Names must be text".to_string()),
    };

    if names.is_empty() {
        return Err("Enter at least one name".to_string());
    }
    for (i, name) in names.iter().enumerate() {
        if names[..i].contains(name) {
            return Err(format!("Name \"{name}\" appears more than once"));
        }
    }
    Ok(names)
}

/// Validate a form submission.
///
/// The error string is user-facing and is carried back on the re-emitted
/// form.
pub fn parse_participants(
    form: &Map<String, Value>,
    enforce_count: bool,
) -> Result<Participants, String> {
    let count = parse_count(form.get(NUM_PEOPLE_FIELD))?;
    let names = parse_names(form.get(PEOPLE_NAMES_FIELD))?;
    if enforce_count && names.len() != count as usize {
        return Err(format!(
            "You said {count} people but entered {} names",
            names.len()
        ));
    }
    Ok(Participants { count, names })
}

/// State update for accepted participants.
pub fn apply_participants(participants: Participants) -> StateUpdate {
    let ack = format!(
        "Got it! Splitting the bill with {} people: {}",
        participants.count,
        participants.names.join(", ")
    );
    StateUpdate {
        messages: vec![Message::assistant(ack)],
        num_people: Some(participants.count),
        people_names: Some(participants.names),
        ..StateUpdate::default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
