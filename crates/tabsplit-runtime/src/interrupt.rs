//! Interrupt payloads emitted at suspension points and the input that
//! resumes them.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What a suspended run is waiting for.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Interrupt {
    /// A structured form; resumed with [`ResumeInput::Form`].
    Form(FormRequest),
    /// A free-text question; resumed with [`ResumeInput::Text`].
    Prompt {
        /// Text shown to the user.
        text: String,
        /// Why the previous answer was rejected, if it was.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl Interrupt {
    /// The input kind that resumes this interrupt.
    pub fn expects(&self) -> InputKind {
        match self {
            Self::Form(_) => InputKind::Form,
            Self::Prompt { .. } => InputKind::Text,
        }
    }

    /// Rejection message carried by a re-emitted interrupt.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Form(form) => form.error.as_deref(),
            Self::Prompt { error, .. } => error.as_deref(),
        }
    }

    /// The same interrupt with its rejection message replaced.
    #[must_use]
    pub fn with_error(self, error: impl Into<String>) -> Self {
        let error = Some(error.into());
        match self {
            Self::Form(form) => Self::Form(FormRequest { error, ..form }),
            Self::Prompt { text, .. } => Self::Prompt { text, error },
        }
    }
}

/// Form descriptor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FormRequest {
    /// Fields, in display order.
    pub fields: Vec<FormField>,
    /// Why the previous submission was rejected, if it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One form field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    /// Key used in the submitted mapping.
    pub name: String,
    /// Label shown to the user.
    pub label: String,
    /// Input type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Whether a value must be supplied.
    pub required: bool,
}

/// Form field input type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Numeric input.
    Number,
    /// Free text input.
    Text,
}

/// Value supplied to resume a suspended run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResumeInput {
    /// Field name → submitted value.
    Form(Map<String, Value>),
    /// Raw text answer.
    Text(String),
}

impl ResumeInput {
    /// Build a form submission from `(field, value)` pairs.
    pub fn form<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Form(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build a text answer.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Kind of this input.
    pub fn kind(&self) -> InputKind {
        match self {
            Self::Form(_) => InputKind::Form,
            Self::Text(_) => InputKind::Text,
        }
    }
}

/// Kind of resume input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputKind {
    /// Form mapping.
    Form,
    /// Raw text.
    Text,
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Form => write!(f, "form"),
            Self::Text => write!(f, "text"),
        }
    }
}
