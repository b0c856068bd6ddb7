//! Return valuation engine.

use rust_decimal::{Decimal, RoundingStrategy};
use stockflow_shared::config::ValuationConfig;
use stockflow_shared::types::{InvoiceId, round_money};

use super::error::ValuationError;
use super::policy::{QualityDeductionPolicy, QualityRule};
use super::types::{ReturnCalculation, ShopMargin, quantity_message};
use crate::batch::BatchInfo;

/// Scale used for per-unit prices in a calculation.
const UNIT_PRICE_SCALE: u32 = 4;

/// Everything needed to value one return request.
#[derive(Debug, Clone, Copy)]
pub struct ValuationInput<'a> {
    /// Invoice the return is against.
    pub invoice_id: InvoiceId,
    /// The batch's line on that invoice.
    pub batch: &'a BatchInfo,
    /// Units requested.
    pub quantity: u32,
    /// Margin configured on the invoice's shop, if any.
    pub shop_margin: Option<Decimal>,
    /// Units of the same batch held by earlier uncommitted requests.
    pub pending_quantity: u32,
}

/// Values returns at cost.
///
/// Pure and deterministic: the same input always produces the same
/// calculation, and nothing is mutated.
#[derive(Debug, Clone)]
pub struct ReturnValuationEngine {
    default_margin: Decimal,
    policy: QualityDeductionPolicy,
}

impl ReturnValuationEngine {
    /// Creates an engine with a fallback margin and a quality policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the fallback margin is outside `0 <= m < 100`.
    pub fn new(default_margin: Decimal, policy: QualityDeductionPolicy) -> Result<Self, ValuationError> {
        ShopMargin::resolve(None, default_margin)?;
        Ok(Self {
            default_margin,
            policy,
        })
    }

    /// Builds the engine from configuration.
    pub fn from_config(config: &ValuationConfig) -> Result<Self, ValuationError> {
        Self::new(
            config.default_shop_margin_percentage,
            QualityDeductionPolicy::from_config(config)?,
        )
    }

    /// The fallback margin.
    #[must_use]
    pub fn default_margin(&self) -> Decimal {
        self.default_margin
    }

    /// The quality policy.
    #[must_use]
    pub fn policy(&self) -> &QualityDeductionPolicy {
        &self.policy
    }

    /// Values a return request.
    ///
    /// The returnable maximum is re-derived from the batch's sold and
    /// returned counts minus `pending_quantity`; the batch's reported
    /// maximum is not trusted.
    ///
    /// # Errors
    ///
    /// Returns an error for an out-of-range margin or a negative price.
    /// Quantities over the limit yield `calculation_valid = false`.
    pub fn calculate(&self, input: ValuationInput<'_>) -> Result<ReturnCalculation, ValuationError> {
        let batch = input.batch;
        if batch.unit_price < Decimal::ZERO {
            return Err(ValuationError::NegativeUnitPrice {
                batch_id: batch.batch_id,
                price: batch.unit_price,
            });
        }

        let margin = ShopMargin::resolve(input.shop_margin, self.default_margin)?;
        let exact_cost_per_unit = batch.unit_price * margin.cost_factor();
        let cost_price_per_unit = round_unit(exact_cost_per_unit);
        let quantity = Decimal::from(input.quantity);

        let gross_return_amount = round_money(exact_cost_per_unit * quantity);

        let rule = self.policy.rule_for(batch.quality_status);
        let quality_deduction_percentage = self.policy.deduction_percentage(batch.quality_status);
        let quality_deduction =
            round_money(gross_return_amount * quality_deduction_percentage / Decimal::ONE_HUNDRED);
        let total_return_amount = gross_return_amount - quality_deduction;

        let returnable = if batch.can_return && rule != QualityRule::NotReturnable {
            batch.returnable_quantity()
        } else {
            0
        };
        let max_returnable_quantity = returnable.saturating_sub(input.pending_quantity);

        let invalid_reason = if rule == QualityRule::NotReturnable {
            Some(format!(
                "{} stock cannot be returned",
                batch.quality_status
            ))
        } else if !batch.can_return {
            Some(format!("Batch {} is not open for returns", batch.batch_number))
        } else if input.quantity == 0 {
            Some("Return quantity must be at least 1".to_string())
        } else if input.quantity > max_returnable_quantity {
            Some(quantity_message(input.quantity, max_returnable_quantity))
        } else {
            None
        };

        Ok(ReturnCalculation {
            invoice_id: input.invoice_id,
            batch_id: batch.batch_id,
            return_quantity: input.quantity,
            original_unit_price: batch.unit_price,
            cost_price_per_unit,
            shop_margin_percentage: margin.percentage,
            shop_margin_amount_per_unit: round_unit(batch.unit_price - exact_cost_per_unit),
            margin_source: margin.source,
            quality_status: batch.quality_status,
            quality_deduction_percentage,
            quality_deduction,
            gross_return_amount,
            total_return_amount,
            max_returnable_quantity,
            calculation_valid: invalid_reason.is_none(),
            invalid_reason,
        })
    }
}

fn round_unit(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(UNIT_PRICE_SCALE, RoundingStrategy::MidpointNearestEven)
}
