//! Quality deduction policy table.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use stockflow_shared::config::ValuationConfig;

use super::error::ValuationError;
use crate::batch::QualityStatus;

/// How a quality status affects a return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityRule {
    /// Refund is reduced by this percentage.
    Deduct(Decimal),
    /// Batches in this state cannot be returned.
    NotReturnable,
}

/// Maps non-`GOOD` quality statuses to deduction rules.
///
/// Statuses without a rule are returnable with no deduction. `GOOD` stock
/// never carries a deduction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QualityDeductionPolicy {
    rules: BTreeMap<QualityStatus, QualityRule>,
}

impl QualityDeductionPolicy {
    /// Creates an empty policy: everything returnable, nothing deducted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule, replacing any earlier rule for the same status.
    ///
    /// # Errors
    ///
    /// Returns an error for a rule on `GOOD` or a percentage outside `0..=100`.
    pub fn with_rule(mut self, status: QualityStatus, rule: QualityRule) -> Result<Self, ValuationError> {
        if status == QualityStatus::Good {
            return Err(ValuationError::DeductionOnGoodStock);
        }
        if let QualityRule::Deduct(percentage) = rule {
            if percentage < Decimal::ZERO || percentage > Decimal::ONE_HUNDRED {
                return Err(ValuationError::InvalidDeductionPercentage { status, percentage });
            }
        }
        self.rules.insert(status, rule);
        Ok(self)
    }

    /// Builds the policy from configuration.
    ///
    /// `non_returnable` wins over a deduction configured for the same status.
    pub fn from_config(config: &ValuationConfig) -> Result<Self, ValuationError> {
        let mut policy = Self::new();

        for (name, percentage) in &config.quality_deductions {
            let status = parse_status(name)?;
            policy = policy.with_rule(status, QualityRule::Deduct(*percentage))?;
        }
        for name in &config.non_returnable {
            let status = parse_status(name)?;
            policy = policy.with_rule(status, QualityRule::NotReturnable)?;
        }

        Ok(policy)
    }

    /// Returns the rule for a status.
    #[must_use]
    pub fn rule_for(&self, status: QualityStatus) -> QualityRule {
        if status == QualityStatus::Good {
            return QualityRule::Deduct(Decimal::ZERO);
        }
        self.rules
            .get(&status)
            .copied()
            .unwrap_or(QualityRule::Deduct(Decimal::ZERO))
    }

    /// Returns true if batches in this state may be returned.
    #[must_use]
    pub fn allows_return(&self, status: QualityStatus) -> bool {
        !matches!(self.rule_for(status), QualityRule::NotReturnable)
    }

    /// Deduction percentage for a status; zero when not returnable.
    #[must_use]
    pub fn deduction_percentage(&self, status: QualityStatus) -> Decimal {
        match self.rule_for(status) {
            QualityRule::Deduct(percentage) => percentage,
            QualityRule::NotReturnable => Decimal::ZERO,
        }
    }
}

fn parse_status(name: &str) -> Result<QualityStatus, ValuationError> {
    QualityStatus::parse(name).ok_or_else(|| ValuationError::UnknownQualityStatus(name.to_string()))
}
