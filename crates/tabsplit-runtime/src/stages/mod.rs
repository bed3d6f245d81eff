//! The five pipeline stages.
//!
//! Each stage is a function from the current [`SessionState`](crate::state::SessionState)
//! to a [`StateUpdate`](crate::state::StateUpdate). The two suspension points
//! also build the [`Interrupt`](crate::interrupt::Interrupt) they wait on and
//! parse the input that resumes them.

pub mod analyzer;
pub mod image_loader;
pub mod instructions;
pub mod itemization;
pub mod split_request;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Pipeline stage, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Pull image bytes out of the latest message.
    LoadImage,
    /// Extract items and tax from the image.
    AnalyzeReceipt,
    /// Ask for participant count and names.
    RequestSplit,
    /// Ask for free-text split instructions.
    CollectInstructions,
    /// Compute the split and apportion tax.
    CalculateItemization,
}

impl Stage {
    /// All stages in order.
    pub const ALL: [Self; 5] = [
        Self::LoadImage,
        Self::AnalyzeReceipt,
        Self::RequestSplit,
        Self::CollectInstructions,
        Self::CalculateItemization,
    ];

    /// Stable identifier.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoadImage => "load_image",
            Self::AnalyzeReceipt => "analyze_receipt",
            Self::RequestSplit => "request_split",
            Self::CollectInstructions => "collect_instructions",
            Self::CalculateItemization => "calculate_itemization",
        }
    }

    /// Following stage, or `None` after the last one.
    pub fn next(self) -> Option<Self> {
        let position = Self::ALL.iter().position(|stage| *stage == self)?;
        Self::ALL.get(position + 1).copied()
    }

    /// Whether this stage suspends for external input.
    pub fn is_suspension_point(self) -> bool {
        matches!(self, Self::RequestSplit | Self::CollectInstructions)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
