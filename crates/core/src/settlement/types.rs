//! Settlement domain types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use stockflow_shared::types::{BatchId, InvoiceId, ProductId};

use super::arena::RowHandle;
use crate::batch::{BatchInfo, QualityStatus};
use crate::valuation::ReturnCalculation;

/// Settlement lifecycle.
///
/// The valid transitions are:
/// - Idle → Editing (open an outstanding invoice)
/// - Editing → Validating (submit)
/// - Validating → Editing (validation failed)
/// - Validating → Submitting (validation passed)
/// - Submitting → Settled | Failed
/// - Failed → Editing (the form is changed)
/// - Editing | Failed → Idle (cancel)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementState {
    /// No invoice selected.
    Idle,
    /// The operator is filling in payments and returns.
    Editing,
    /// Local checks are running.
    Validating,
    /// The settlement request is in flight.
    Submitting,
    /// The service applied the settlement.
    Settled,
    /// The service rejected the settlement; the form is kept.
    Failed,
}

impl SettlementState {
    /// Returns the string representation of the state.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Editing => "editing",
            Self::Validating => "validating",
            Self::Submitting => "submitting",
            Self::Settled => "settled",
            Self::Failed => "failed",
        }
    }

    /// Returns true if the form may be changed in this state.
    #[must_use]
    pub fn is_editable(&self) -> bool {
        matches!(self, Self::Editing | Self::Failed)
    }
}

impl fmt::Display for SettlementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why goods are being returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnReason {
    /// Goods arrived or became damaged.
    Damaged,
    /// Goods passed their expiry date.
    Expired,
    /// Goods are faulty.
    Defective,
    /// The shop received the wrong product.
    WrongItem,
    /// The shop's customer brought the goods back.
    CustomerReturn,
    /// Anything else; explain in the notes.
    Other,
}

impl ReturnReason {
    /// Returns the wire name of the reason.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Damaged => "damaged",
            Self::Expired => "expired",
            Self::Defective => "defective",
            Self::WrongItem => "wrong_item",
            Self::CustomerReturn => "customer_return",
            Self::Other => "other",
        }
    }

    /// Parses a reason name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "damaged" => Some(Self::Damaged),
            "expired" => Some(Self::Expired),
            "defective" => Some(Self::Defective),
            "wrong_item" => Some(Self::WrongItem),
            "customer_return" => Some(Self::CustomerReturn),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// The reason a row starts with for a batch of the given quality.
    #[must_use]
    pub fn for_quality(quality: QualityStatus) -> Self {
        match quality {
            QualityStatus::Good => Self::CustomerReturn,
            QualityStatus::Defective => Self::Defective,
            QualityStatus::Expired => Self::Expired,
            QualityStatus::Damaged => Self::Damaged,
        }
    }
}

impl fmt::Display for ReturnReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a row's valuation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationSource {
    /// Estimated by the local engine.
    Local,
    /// Returned by the back-office service.
    Remote,
}

/// A return request row of an in-progress settlement.
///
/// `quote` is the valuation as produced for the row on its own; the
/// `calculation` is the quote re-derived against earlier rows of the same
/// settlement on the same batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnRow {
    pub(crate) batch_id: BatchId,
    pub(crate) product_id: ProductId,
    pub(crate) batch_number: String,
    pub(crate) quantity: u32,
    pub(crate) reason: ReturnReason,
    pub(crate) notes: Option<String>,
    pub(crate) generation: u64,
    pub(crate) quote: ReturnCalculation,
    pub(crate) source: CalculationSource,
    pub(crate) calculation: ReturnCalculation,
    pub(crate) calculation_error: Option<String>,
}

impl ReturnRow {
    pub(crate) fn new(
        batch: &BatchInfo,
        quantity: u32,
        reason: ReturnReason,
        quote: ReturnCalculation,
    ) -> Self {
        Self {
            batch_id: batch.batch_id,
            product_id: batch.product_id,
            batch_number: batch.batch_number.clone(),
            quantity,
            reason,
            notes: None,
            generation: 0,
            calculation: quote.clone(),
            quote,
            source: CalculationSource::Local,
            calculation_error: None,
        }
    }

    /// Batch being returned.
    #[must_use]
    pub fn batch_id(&self) -> BatchId {
        self.batch_id
    }

    /// Product stocked in the batch.
    #[must_use]
    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    /// Human-facing batch number.
    #[must_use]
    pub fn batch_number(&self) -> &str {
        &self.batch_number
    }

    /// Units requested.
    #[must_use]
    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Reason code.
    #[must_use]
    pub fn reason(&self) -> ReturnReason {
        self.reason
    }

    /// Free-text notes.
    #[must_use]
    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    /// Bumped whenever the batch or quantity changes.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Valuation constrained to this settlement.
    #[must_use]
    pub fn calculation(&self) -> &ReturnCalculation {
        &self.calculation
    }

    /// Where the valuation came from.
    #[must_use]
    pub fn source(&self) -> CalculationSource {
        self.source
    }

    /// Last failure to obtain a service valuation, if any.
    #[must_use]
    pub fn calculation_error(&self) -> Option<&str> {
        self.calculation_error.as_deref()
    }

    /// Returns true if the row can be submitted.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.calculation.calculation_valid
    }

    /// Amount the row contributes to the settlement.
    #[must_use]
    pub fn return_amount(&self) -> Decimal {
        self.calculation.effective_amount()
    }
}

/// Correlates a valuation request with the row state that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CalculationTicket {
    /// The row the valuation is for.
    pub row: RowHandle,
    /// Row generation when the request was issued.
    pub generation: u64,
    /// Invoice of the settlement.
    pub invoice_id: InvoiceId,
    /// Batch the row had when the request was issued.
    pub batch_id: BatchId,
    /// Quantity the row had when the request was issued.
    pub quantity: u32,
}

/// What happened to a valuation response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalculationOutcome {
    /// The response was for the row's current state and was applied.
    Applied,
    /// The row was removed or changed since the request; the response was
    /// discarded.
    Stale,
}

/// Derived settlement totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SettlementTotals {
    /// Sum of entered payment amounts.
    pub payments: Decimal,
    /// Sum of valid return amounts.
    pub returns: Decimal,
    /// `payments + returns`.
    pub total_settlement: Decimal,
    /// `balance_due - total_settlement`.
    pub remaining_balance: Decimal,
}

impl SettlementTotals {
    /// Computes totals against a balance.
    #[must_use]
    pub fn new(balance_due: Decimal, payments: Decimal, returns: Decimal) -> Self {
        let total_settlement = payments + returns;
        Self {
            payments,
            returns,
            total_settlement,
            remaining_balance: balance_due - total_settlement,
        }
    }
}
