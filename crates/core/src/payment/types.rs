//! Payment domain types.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a payment was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Cash.
    Cash,
    /// Cheque.
    Cheque,
    /// Bank transfer.
    BankTransfer,
    /// Offset against a bill owed to the shop.
    BillToBill,
    /// Credit note issued earlier.
    CreditNote,
    /// Goods returned outside the batch return flow.
    Return,
}

impl PaymentMethod {
    /// Returns the wire name of the method.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Cheque => "cheque",
            Self::BankTransfer => "bank_transfer",
            Self::BillToBill => "bill_to_bill",
            Self::CreditNote => "credit_note",
            Self::Return => "return",
        }
    }

    /// Parses a method name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "cash" => Some(Self::Cash),
            "cheque" => Some(Self::Cheque),
            "bank_transfer" => Some(Self::BankTransfer),
            "bill_to_bill" => Some(Self::BillToBill),
            "credit_note" => Some(Self::CreditNote),
            "return" => Some(Self::Return),
            _ => None,
        }
    }

    /// Returns true if this method should carry a reference number.
    #[must_use]
    pub fn expects_reference(&self) -> bool {
        matches!(self, Self::Cheque | Self::BankTransfer)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Cash => "Cash",
            Self::Cheque => "Cheque",
            Self::BankTransfer => "Bank transfer",
            Self::BillToBill => "Bill to bill",
            Self::CreditNote => "Credit note",
            Self::Return => "Return",
        };
        f.write_str(label)
    }
}

/// A payment row of an in-progress settlement.
///
/// The amount is optional because a freshly added row has none yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaymentEntry {
    /// Payment method.
    pub method: PaymentMethod,
    /// Amount paid.
    #[serde(default)]
    pub amount: Option<Decimal>,
    /// Cheque number or transfer reference.
    #[serde(default)]
    pub reference_number: Option<String>,
    /// Bank the transfer came from.
    #[serde(default)]
    pub bank_name: Option<String>,
    /// Date written on the cheque.
    #[serde(default)]
    pub cheque_date: Option<NaiveDate>,
}

impl PaymentEntry {
    /// Creates an entry with a method and amount and no metadata.
    #[must_use]
    pub fn new(method: PaymentMethod, amount: Decimal) -> Self {
        Self {
            method,
            amount: Some(amount),
            reference_number: None,
            bank_name: None,
            cheque_date: None,
        }
    }

    /// Creates a cash entry.
    #[must_use]
    pub fn cash(amount: Decimal) -> Self {
        Self::new(PaymentMethod::Cash, amount)
    }

    /// Creates a cheque entry.
    #[must_use]
    pub fn cheque(amount: Decimal, reference_number: impl Into<String>, cheque_date: Option<NaiveDate>) -> Self {
        Self {
            reference_number: Some(reference_number.into()),
            cheque_date,
            ..Self::new(PaymentMethod::Cheque, amount)
        }
    }

    /// Creates a bank-transfer entry.
    #[must_use]
    pub fn bank_transfer(
        amount: Decimal,
        reference_number: impl Into<String>,
        bank_name: impl Into<String>,
    ) -> Self {
        Self {
            reference_number: Some(reference_number.into()),
            bank_name: Some(bank_name.into()),
            ..Self::new(PaymentMethod::BankTransfer, amount)
        }
    }

    /// Returns true if a non-blank reference number is present.
    #[must_use]
    pub fn has_reference(&self) -> bool {
        self.reference_number
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty())
    }
}
