//! Settlement error types.

use rust_decimal::Decimal;
use stockflow_shared::types::{BatchId, display_amount};
use thiserror::Error;

use super::arena::RowHandle;
use super::types::SettlementState;
use crate::invoice::InvoiceStatus;
use crate::payment::PaymentIssue;
use crate::valuation::ValuationError;

/// A return row that cannot be submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnIssue {
    /// The row.
    pub row: RowHandle,
    /// Batch number of the row.
    pub batch_number: String,
    /// Why the row is invalid.
    pub reason: String,
}

/// Errors that can occur while editing or submitting a settlement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettlementError {
    /// Payments and returns add up to nothing.
    #[error("Nothing to settle: payments and returns total {}", money(.total))]
    NothingToSettle {
        /// The settlement total.
        total: Decimal,
    },

    /// The settlement would apply more than is owed.
    #[error(
        "Settlement total {} exceeds the balance due {}",
        money(.total),
        money(.balance_due)
    )]
    ExceedsBalance {
        /// The settlement total.
        total: Decimal,
        /// The invoice balance.
        balance_due: Decimal,
    },

    /// One or more payments are invalid.
    #[error("{}", join_issues(.0))]
    InvalidPayments(Vec<PaymentIssue>),

    /// One or more returns are invalid.
    #[error("{}", join_returns(.0))]
    InvalidReturns(Vec<ReturnIssue>),

    /// The invoice is not in a status that accepts settlements.
    #[error("Invoice {invoice_number} is {status} and cannot be settled")]
    InvoiceNotSettleable {
        /// Human-facing invoice number.
        invoice_number: String,
        /// Current status.
        status: InvoiceStatus,
    },

    /// The invoice has no balance left.
    #[error("Invoice {0} has no balance due")]
    NothingOutstanding(String),

    /// The action is not allowed in the current state.
    #[error("Cannot {action} while the settlement is {state}")]
    InvalidState {
        /// Current state.
        state: SettlementState,
        /// What was attempted.
        action: &'static str,
    },

    /// No row has this handle.
    #[error("Row {0} does not exist")]
    UnknownRow(RowHandle),

    /// The batch is not part of the invoice.
    #[error("Batch {0} is not on this invoice")]
    UnknownBatch(BatchId),

    /// A search result cannot seed a return on this invoice.
    #[error("Batch {0} has no returnable units on this invoice")]
    BatchNotReturnable(String),

    /// A valuation answered for a different batch or quantity.
    #[error("Valuation for batch {batch_id} does not match the request")]
    MismatchedCalculation {
        /// Batch the valuation was for.
        batch_id: BatchId,
    },

    /// Valuation failed.
    #[error(transparent)]
    Valuation(#[from] ValuationError),
}

impl SettlementError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NothingToSettle { .. } => "NOTHING_TO_SETTLE",
            Self::ExceedsBalance { .. } => "EXCEEDS_BALANCE",
            Self::InvalidPayments(_) => "INVALID_PAYMENTS",
            Self::InvalidReturns(_) => "INVALID_RETURNS",
            Self::InvoiceNotSettleable { .. } => "INVOICE_NOT_SETTLEABLE",
            Self::NothingOutstanding(_) => "NOTHING_OUTSTANDING",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::UnknownRow(_) => "UNKNOWN_ROW",
            Self::UnknownBatch(_) => "UNKNOWN_BATCH",
            Self::BatchNotReturnable(_) => "BATCH_NOT_RETURNABLE",
            Self::MismatchedCalculation { .. } => "MISMATCHED_CALCULATION",
            Self::Valuation(e) => e.error_code(),
        }
    }

    /// Returns true if the error blocks submission before any request is
    /// made.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NothingToSettle { .. }
                | Self::ExceedsBalance { .. }
                | Self::InvalidPayments(_)
                | Self::InvalidReturns(_)
        )
    }
}

fn money(amount: &Decimal) -> String {
    display_amount(*amount)
}

fn join_issues(issues: &[PaymentIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn join_returns(issues: &[ReturnIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("Return of batch {}: {}", i.batch_number, i.reason))
        .collect::<Vec<_>>()
        .join("; ")
}
