//! Batch domain types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use stockflow_shared::types::{BatchId, ProductId};

/// Quality classification of a stock batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QualityStatus {
    /// Saleable stock.
    Good,
    /// Manufacturing defect.
    Defective,
    /// Past its expiry date.
    Expired,
    /// Physically damaged.
    Damaged,
}

impl QualityStatus {
    /// Returns the wire name of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Good => "GOOD",
            Self::Defective => "DEFECTIVE",
            Self::Expired => "EXPIRED",
            Self::Damaged => "DAMAGED",
        }
    }

    /// Parses a status name, ignoring case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "GOOD" => Some(Self::Good),
            "DEFECTIVE" => Some(Self::Defective),
            "EXPIRED" => Some(Self::Expired),
            "DAMAGED" => Some(Self::Damaged),
            _ => None,
        }
    }
}

impl fmt::Display for QualityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One batch's contribution to one invoice.
///
/// Immutable apart from `already_returned`, which only grows as
/// settlements are committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchInfo {
    /// The batch ID.
    pub batch_id: BatchId,
    /// Human-facing batch number.
    pub batch_number: String,
    /// The product stocked in this batch.
    pub product_id: ProductId,
    /// Display name of the product.
    pub product_name: String,
    /// Unit price charged on the invoice.
    pub unit_price: Decimal,
    /// Unit cost of the batch.
    pub unit_cost: Decimal,
    /// Units of this batch sold on the invoice.
    pub sold_quantity: u32,
    /// Units already returned by committed settlements.
    pub already_returned: u32,
    /// `sold_quantity - already_returned` as reported by the service.
    pub max_returnable_quantity: u32,
    /// Quality classification.
    pub quality_status: QualityStatus,
    /// Whether the service allows a return against this batch.
    pub can_return: bool,
}

impl BatchInfo {
    /// Units that can still be returned, derived from sold and returned
    /// counts rather than the reported maximum. Never negative.
    #[must_use]
    pub fn returnable_quantity(&self) -> u32 {
        self.sold_quantity.saturating_sub(self.already_returned)
    }

    /// Returns true if the reported maximum agrees with the counts.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.max_returnable_quantity == self.returnable_quantity()
    }

    /// Returns true if both the service flag and the counts allow a return.
    #[must_use]
    pub fn has_returnable_units(&self) -> bool {
        self.can_return && self.returnable_quantity() > 0
    }
}

/// Which field a search query matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchField {
    /// The batch number contains the query.
    BatchNumber,
    /// The product name contains the query.
    ProductName,
}

impl MatchField {
    /// Matches a query against a batch number and product name,
    /// case-insensitively. Batch numbers take precedence.
    #[must_use]
    pub fn detect(batch_number: &str, product_name: &str, query: &str) -> Option<Self> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        if batch_number.to_lowercase().contains(&needle) {
            Some(Self::BatchNumber)
        } else if product_name.to_lowercase().contains(&needle) {
            Some(Self::ProductName)
        } else {
            None
        }
    }
}

/// A batch found by free-text search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchSearchResult {
    /// The batch ID.
    pub batch_id: BatchId,
    /// Human-facing batch number.
    pub batch_number: String,
    /// The product stocked in this batch.
    pub product_id: ProductId,
    /// Display name of the product.
    pub product_name: String,
    /// Quality classification.
    pub quality_status: QualityStatus,
    /// Which field the query matched.
    pub matched_on: MatchField,
    /// The batch's line on the invoice the search was scoped to, if it
    /// contributed to that invoice.
    #[serde(default)]
    pub invoice_line: Option<BatchInfo>,
}

impl BatchSearchResult {
    /// Returns true if this result can seed a return on the scoped invoice.
    #[must_use]
    pub fn is_returnable_on_invoice(&self) -> bool {
        self.invoice_line
            .as_ref()
            .is_some_and(BatchInfo::has_returnable_units)
    }
}
