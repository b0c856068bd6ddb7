//! Payment entries and their validation.
//!
//! A settlement may combine any number of payments, in any mix of
//! methods. Each entry is validated on its own and applied as its own
//! ledger movement; there is no ordering between them.

pub mod types;
pub mod validation;

#[cfg(test)]
mod validation_props;

pub use types::{PaymentEntry, PaymentMethod};
pub use validation::{IssueKind, PaymentIssue, PaymentValidator, ValidationResult, total_payments};
