//! Invoice domain types.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use stockflow_shared::types::{InvoiceId, MINOR_UNIT, ShopId, is_settled};

/// Invoice status in the billing lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    /// Invoice is being prepared and is not yet owed.
    Draft,
    /// Invoice is issued and nothing has been paid.
    Pending,
    /// Invoice is partly settled.
    Partial,
    /// Invoice is fully settled.
    Paid,
    /// Invoice is past its due date with a balance outstanding.
    Overdue,
    /// Invoice was cancelled.
    Cancelled,
}

impl InvoiceStatus {
    /// Returns the string representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Partial => "partial",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "pending" => Some(Self::Pending),
            "partial" => Some(Self::Partial),
            "paid" => Some(Self::Paid),
            "overdue" => Some(Self::Overdue),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns true if a settlement may be opened against an invoice in
    /// this status.
    #[must_use]
    pub fn is_settleable(&self) -> bool {
        matches!(self, Self::Pending | Self::Partial | Self::Overdue)
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of an outstanding invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Invoice {
    /// The invoice ID.
    pub id: InvoiceId,
    /// Human-facing invoice number.
    pub invoice_number: String,
    /// The shop billed by this invoice.
    pub shop_id: ShopId,
    /// Display name of the shop.
    #[serde(default)]
    pub shop_name: Option<String>,
    /// Invoice total after discounts and tax.
    pub net_total: Decimal,
    /// Sum of payments and return values applied so far.
    pub paid_amount: Decimal,
    /// Amount still owed.
    pub balance_due: Decimal,
    /// Current status.
    pub status: InvoiceStatus,
    /// Date the invoice was issued.
    #[serde(default)]
    pub invoice_date: Option<NaiveDate>,
    /// Date payment is due.
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

impl Invoice {
    /// Balance implied by the totals: `net_total - paid_amount`.
    #[must_use]
    pub fn derived_balance(&self) -> Decimal {
        self.net_total - self.paid_amount
    }

    /// Returns true if `balance_due` agrees with the totals to within one
    /// minor unit.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        (self.balance_due - self.derived_balance()).abs() < MINOR_UNIT
    }

    /// Returns true if a settlement may be opened against this invoice.
    #[must_use]
    pub fn is_outstanding(&self) -> bool {
        self.status.is_settleable() && self.balance_due >= MINOR_UNIT
    }
}

/// Invoice state returned by the service after a settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InvoiceSummary {
    /// The invoice ID.
    pub id: InvoiceId,
    /// Human-facing invoice number.
    pub invoice_number: String,
    /// Invoice total.
    pub net_total: Decimal,
    /// Sum of everything applied so far.
    pub paid_amount: Decimal,
    /// Amount still owed.
    pub balance_due: Decimal,
    /// Status after the settlement.
    pub status: InvoiceStatus,
}

impl From<&Invoice> for InvoiceSummary {
    fn from(invoice: &Invoice) -> Self {
        Self {
            id: invoice.id,
            invoice_number: invoice.invoice_number.clone(),
            net_total: invoice.net_total,
            paid_amount: invoice.paid_amount,
            balance_due: invoice.balance_due,
            status: invoice.status,
        }
    }
}

/// Outstanding invoices for one shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutstandingInvoices {
    /// Invoices with a balance due.
    pub invoices: Vec<Invoice>,
    /// Sum of the balances due, as reported by the service.
    pub total_outstanding: Decimal,
}

impl OutstandingInvoices {
    /// Sum of the listed balances.
    #[must_use]
    pub fn listed_total(&self) -> Decimal {
        self.invoices.iter().map(|i| i.balance_due).sum()
    }

    /// Returns true if the reported total matches the listed balances.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        (self.total_outstanding - self.listed_total()).abs() < MINOR_UNIT
    }
}

/// Status an invoice takes after `total_settlement` is applied against
/// `balance_due`.
#[must_use]
pub fn status_after_settlement(balance_due: Decimal, total_settlement: Decimal) -> InvoiceStatus {
    if is_settled(balance_due - total_settlement) {
        InvoiceStatus::Paid
    } else {
        InvoiceStatus::Partial
    }
}
