//! Deterministic in-process services.
//!
//! Used for `--offline` runs and for exercising the pipeline without a
//! network. [`StaticReceiptExtractor`] and [`StaticSplitReasoner`] return
//! fixed results; [`EqualSplitReasoner`] ignores the instructions and splits
//! every item evenly among all participants.

use async_trait::async_trait;
use tabsplit_core::{
    ItemBreakdown, ItemizationBreakdown, PersonSplit, PersonTotal, ReceiptExtraction, ReceiptItem,
};
use tokio_util::sync::CancellationToken;

use crate::provider::{ProviderError, ProviderResult};
use crate::services::{ReceiptExtractor, SplitReasoner};

/// Extractor that always returns the same receipt.
#[derive(Clone, Debug)]
pub struct StaticReceiptExtractor {
    receipt: ReceiptExtraction,
}

impl StaticReceiptExtractor {
    /// Return `receipt` for every image.
    pub fn new(receipt: ReceiptExtraction) -> Self {
        Self { receipt }
    }
}

#[async_trait]
impl ReceiptExtractor for StaticReceiptExtractor {
    async fn extract(
        &self,
        image: &[u8],
        _mime_type: &str,
        cancel: &CancellationToken,
    ) -> ProviderResult<ReceiptExtraction> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        if image.is_empty() {
            return Err(ProviderError::Other {
                message: "empty image".into(),
            });
        }
        Ok(self.receipt.clone())
    }
}

/// Reasoner that always returns the same breakdown.
#[derive(Clone, Debug)]
pub struct StaticSplitReasoner {
    breakdown: ItemizationBreakdown,
}

impl StaticSplitReasoner {
    /// Return `breakdown` for every request.
    pub fn new(breakdown: ItemizationBreakdown) -> Self {
        Self { breakdown }
    }
}

#[async_trait]
impl SplitReasoner for StaticSplitReasoner {
    async fn itemize(
        &self,
        _items: &[ReceiptItem],
        _people: &[String],
        _instructions: &str,
        cancel: &CancellationToken,
    ) -> ProviderResult<ItemizationBreakdown> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        Ok(self.breakdown.clone())
    }
}

/// Reasoner that splits every item evenly among all participants.
#[derive(Clone, Copy, Debug, Default)]
pub struct EqualSplitReasoner;

impl EqualSplitReasoner {
    /// Compute an even breakdown.
    pub fn breakdown(items: &[ReceiptItem], people: &[String]) -> ItemizationBreakdown {
        let share = |price: f64| {
            if people.is_empty() {
                0.0
            } else {
                price / people.len() as f64
            }
        };

        let item_breakdown: Vec<ItemBreakdown> = items
            .iter()
            .map(|item| ItemBreakdown {
                item_name: item.name.clone(),
                item_price: item.price,
                splits: people
                    .iter()
                    .map(|p| PersonSplit {
                        person_name: p.clone(),
                        amount: share(item.price),
                    })
                    .collect(),
            })
            .collect();

        let total_before_tax: f64 = items.iter().map(|i| i.price).sum();
        let person_totals = people
            .iter()
            .map(|p| PersonTotal {
                person_name: p.clone(),
                total: share(total_before_tax),
            })
            .collect();

        ItemizationBreakdown {
            item_breakdown,
            person_totals,
            total_before_tax,
        }
    }
}

#[async_trait]
impl SplitReasoner for EqualSplitReasoner {
    async fn itemize(
        &self,
        items: &[ReceiptItem],
        people: &[String],
        _instructions: &str,
        cancel: &CancellationToken,
    ) -> ProviderResult<ItemizationBreakdown> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        Ok(Self::breakdown(items, people))
    }
}
