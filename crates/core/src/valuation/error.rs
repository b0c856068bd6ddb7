//! Valuation error types.

use rust_decimal::Decimal;
use stockflow_shared::types::BatchId;
use thiserror::Error;

use crate::batch::QualityStatus;

/// Errors that can occur while valuing a return.
///
/// An over-sized quantity is not an error: it yields a calculation with
/// `calculation_valid = false`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValuationError {
    /// Margin percentage outside `0 <= margin < 100`.
    #[error("Shop margin must be at least 0% and below 100%, got {0}%")]
    InvalidMarginPercentage(Decimal),

    /// Batch carries a negative unit price.
    #[error("Batch {batch_id} has a negative unit price: {price}")]
    NegativeUnitPrice {
        /// The batch ID.
        batch_id: BatchId,
        /// The offending price.
        price: Decimal,
    },

    /// Deduction percentage outside `0..=100`.
    #[error("Quality deduction for {status} must be between 0% and 100%, got {percentage}%")]
    InvalidDeductionPercentage {
        /// The quality status the rule applies to.
        status: QualityStatus,
        /// The offending percentage.
        percentage: Decimal,
    },

    /// A deduction was configured for `GOOD` stock.
    #[error("GOOD stock cannot carry a quality deduction")]
    DeductionOnGoodStock,

    /// Configuration names a quality status that does not exist.
    #[error("Unknown quality status: {0}")]
    UnknownQualityStatus(String),
}

impl ValuationError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidMarginPercentage(_) => "INVALID_MARGIN_PERCENTAGE",
            Self::NegativeUnitPrice { .. } => "NEGATIVE_UNIT_PRICE",
            Self::InvalidDeductionPercentage { .. } => "INVALID_DEDUCTION_PERCENTAGE",
            Self::DeductionOnGoodStock => "DEDUCTION_ON_GOOD_STOCK",
            Self::UnknownQualityStatus(_) => "UNKNOWN_QUALITY_STATUS",
        }
    }
}
