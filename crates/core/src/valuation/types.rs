//! Valuation domain types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stockflow_shared::types::{BatchId, InvoiceId};

use super::error::ValuationError;
use crate::batch::QualityStatus;

/// Where a margin percentage came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarginSource {
    /// The margin configured on the invoice's shop.
    Shop,
    /// The system-wide fallback margin.
    SystemDefault,
}

/// Shop margin with its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShopMargin {
    /// Margin as a percentage of the sale price.
    pub percentage: Decimal,
    /// Where the percentage came from.
    pub source: MarginSource,
}

impl ShopMargin {
    /// Picks the shop's margin when it has one, the default otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the chosen margin is outside `0 <= m < 100`.
    pub fn resolve(shop_margin: Option<Decimal>, default: Decimal) -> Result<Self, ValuationError> {
        let margin = match shop_margin {
            Some(percentage) => Self {
                percentage,
                source: MarginSource::Shop,
            },
            None => Self {
                percentage: default,
                source: MarginSource::SystemDefault,
            },
        };
        margin.validate()?;
        Ok(margin)
    }

    /// Checks the percentage is at least 0 and below 100.
    pub fn validate(&self) -> Result<(), ValuationError> {
        if self.percentage < Decimal::ZERO || self.percentage >= Decimal::ONE_HUNDRED {
            return Err(ValuationError::InvalidMarginPercentage(self.percentage));
        }
        Ok(())
    }

    /// Fraction of the sale price refunded: `1 - percentage / 100`.
    #[must_use]
    pub fn cost_factor(&self) -> Decimal {
        Decimal::ONE - self.percentage / Decimal::ONE_HUNDRED
    }
}

/// Valuation of one requested return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReturnCalculation {
    /// Invoice the return is against.
    pub invoice_id: InvoiceId,
    /// Batch being returned.
    pub batch_id: BatchId,
    /// Units requested.
    pub return_quantity: u32,
    /// Unit price charged on the invoice.
    pub original_unit_price: Decimal,
    /// Unit price with the shop margin removed.
    pub cost_price_per_unit: Decimal,
    /// Margin applied, in percent.
    pub shop_margin_percentage: Decimal,
    /// Margin removed per unit.
    pub shop_margin_amount_per_unit: Decimal,
    /// Where the margin came from.
    pub margin_source: MarginSource,
    /// Quality of the batch.
    pub quality_status: QualityStatus,
    /// Deduction percentage applied for quality.
    pub quality_deduction_percentage: Decimal,
    /// Amount deducted for quality.
    pub quality_deduction: Decimal,
    /// `cost_price_per_unit * quantity`, rounded, before quality deduction.
    pub gross_return_amount: Decimal,
    /// Refund value of the return.
    pub total_return_amount: Decimal,
    /// Units still returnable for this request.
    pub max_returnable_quantity: u32,
    /// False when the quantity cannot be returned; the amount is then not
    /// to be used.
    pub calculation_valid: bool,
    /// Why the calculation is invalid.
    #[serde(default)]
    pub invalid_reason: Option<String>,
}

impl ReturnCalculation {
    /// Amount this return contributes to a settlement: the total when the
    /// calculation is valid, zero otherwise.
    #[must_use]
    pub fn effective_amount(&self) -> Decimal {
        if self.calculation_valid {
            self.total_return_amount
        } else {
            Decimal::ZERO
        }
    }

    /// Re-derives the limits of a calculation against the units already
    /// claimed by other uncommitted requests of the same session.
    ///
    /// The service computes `max_returnable_quantity` from committed
    /// returns only; `pending` is what earlier rows of the current
    /// settlement hold on the same batch.
    #[must_use]
    pub fn constrain_to_session(mut self, pending: u32) -> Self {
        if pending == 0 {
            return self;
        }
        self.max_returnable_quantity = self.max_returnable_quantity.saturating_sub(pending);
        if self.calculation_valid && self.return_quantity > self.max_returnable_quantity {
            self.calculation_valid = false;
            self.invalid_reason = Some(quantity_message(
                self.return_quantity,
                self.max_returnable_quantity,
            ));
        }
        self
    }
}

/// Operator-facing message for a quantity over the limit.
pub(crate) fn quantity_message(requested: u32, available: u32) -> String {
    if available == 0 {
        format!("Requested {requested} units but no units are left to return")
    } else {
        format!("Requested {requested} units but only {available} can be returned")
    }
}
