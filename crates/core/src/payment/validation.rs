//! Payment validation rules.
//!
//! Amount problems block submission. Missing method metadata only warns,
//! unless the validator is configured to require reference numbers.

use rust_decimal::Decimal;
use std::fmt;
use stockflow_shared::config::SettlementConfig;
use stockflow_shared::types::{MONEY_SCALE, display_amount};

use super::types::{PaymentEntry, PaymentMethod};

/// What is wrong with a payment entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueKind {
    /// No amount entered.
    MissingAmount,
    /// Amount is zero or negative.
    NonPositiveAmount(Decimal),
    /// Amount has more than two decimal places.
    SubMinorUnitAmount(Decimal),
    /// Cheque or transfer without a reference number.
    MissingReference(PaymentMethod),
    /// Bank transfer without a bank name.
    MissingBankName,
    /// Cheque without a cheque date.
    MissingChequeDate,
}

/// A problem found on one payment entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIssue {
    /// Zero-based position of the entry in the list validated.
    pub position: usize,
    /// The problem.
    pub kind: IssueKind,
}

impl fmt::Display for PaymentIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let row = self.position + 1;
        match &self.kind {
            IssueKind::MissingAmount => write!(f, "Payment {row}: amount is required"),
            IssueKind::NonPositiveAmount(amount) => write!(
                f,
                "Payment {row}: amount must be greater than zero, got {}",
                display_amount(*amount)
            ),
            IssueKind::SubMinorUnitAmount(amount) => write!(
                f,
                "Payment {row}: amount {amount} has more than {MONEY_SCALE} decimal places"
            ),
            IssueKind::MissingReference(method) => {
                write!(f, "Payment {row}: {method} payment has no reference number")
            }
            IssueKind::MissingBankName => write!(f, "Payment {row}: bank transfer has no bank name"),
            IssueKind::MissingChequeDate => write!(f, "Payment {row}: cheque has no cheque date"),
        }
    }
}

/// Outcome of validating a list of payments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    /// Problems that block submission.
    pub errors: Vec<PaymentIssue>,
    /// Problems worth recording but not blocking.
    pub warnings: Vec<PaymentIssue>,
}

impl ValidationResult {
    /// Returns true if nothing blocks submission.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validates payment entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaymentValidator {
    require_reference_numbers: bool,
}

impl PaymentValidator {
    /// Creates a validator that only warns about missing references.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a validator that blocks cheques and transfers without a
    /// reference number.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            require_reference_numbers: true,
        }
    }

    /// Builds the validator from configuration.
    #[must_use]
    pub fn from_config(config: &SettlementConfig) -> Self {
        Self {
            require_reference_numbers: config.require_reference_numbers,
        }
    }

    /// Validates every entry independently.
    pub fn validate<'a, I>(&self, entries: I) -> ValidationResult
    where
        I: IntoIterator<Item = &'a PaymentEntry>,
    {
        let mut result = ValidationResult::default();

        for (position, entry) in entries.into_iter().enumerate() {
            match entry.amount {
                None => result.errors.push(PaymentIssue {
                    position,
                    kind: IssueKind::MissingAmount,
                }),
                Some(amount) if amount <= Decimal::ZERO => result.errors.push(PaymentIssue {
                    position,
                    kind: IssueKind::NonPositiveAmount(amount),
                }),
                Some(amount) if amount.normalize().scale() > MONEY_SCALE => {
                    result.errors.push(PaymentIssue {
                        position,
                        kind: IssueKind::SubMinorUnitAmount(amount),
                    });
                }
                Some(_) => {}
            }

            if entry.method.expects_reference() && !entry.has_reference() {
                let issue = PaymentIssue {
                    position,
                    kind: IssueKind::MissingReference(entry.method),
                };
                if self.require_reference_numbers {
                    result.errors.push(issue);
                } else {
                    result.warnings.push(issue);
                }
            }

            match entry.method {
                PaymentMethod::BankTransfer
                    if entry.bank_name.as_deref().is_none_or(|b| b.trim().is_empty()) =>
                {
                    result.warnings.push(PaymentIssue {
                        position,
                        kind: IssueKind::MissingBankName,
                    });
                }
                PaymentMethod::Cheque if entry.cheque_date.is_none() => {
                    result.warnings.push(PaymentIssue {
                        position,
                        kind: IssueKind::MissingChequeDate,
                    });
                }
                _ => {}
            }
        }

        result
    }
}

/// Sum of all entered amounts. Entries without an amount count as zero.
pub fn total_payments<'a, I>(entries: I) -> Decimal
where
    I: IntoIterator<Item = &'a PaymentEntry>,
{
    entries.into_iter().filter_map(|e| e.amount).sum()
}
