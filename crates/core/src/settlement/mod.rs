//! Invoice settlement with mixed payments and batch returns.
//!
//! This module implements the settlement lifecycle:
//! - Form rows addressed by stable handles
//! - Explicit recalculation of totals after every mutation
//! - Correlation of service valuations with the row state that caused them
//! - Validation and construction of the single all-or-nothing request
//!
//! # Modules
//!
//! - `arena` - Row storage with stable handles
//! - `types` - States, return rows, tickets and totals
//! - `form` - The in-progress settlement form
//! - `reconciler` - The settlement state machine
//! - `payload` - Request and response records
//! - `error` - Settlement errors

pub mod arena;
pub mod error;
pub mod form;
pub mod payload;
pub mod reconciler;
pub mod types;

#[cfg(test)]
mod reconciler_props;

pub use arena::{RowArena, RowHandle};
pub use error::{ReturnIssue, SettlementError};
pub use form::SettlementForm;
pub use payload::{
    PaymentLine, ReturnLine, SettlePaymentsOnlyRequest, SettleWithReturnsRequest,
    SettlementPayload, SettlementResponse, SettlementTransaction, compose_notes,
};
pub use reconciler::SettlementReconciler;
pub use types::{
    CalculationOutcome, CalculationSource, CalculationTicket, ReturnReason, ReturnRow,
    SettlementState, SettlementTotals,
};
