//! Settlement request and response records.
//!
//! One record per endpoint. Unknown fields are rejected so that a
//! service-side schema change surfaces as an error instead of silently
//! dropping data.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stockflow_shared::types::{BatchId, InvoiceId, ProductId, SettlementId};
use uuid::Uuid;

use super::types::ReturnReason;
use crate::invoice::InvoiceSummary;
use crate::payment::{PaymentEntry, PaymentMethod};

/// A validated payment as sent to the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaymentLine {
    /// Payment method.
    pub method: PaymentMethod,
    /// Amount paid.
    pub amount: Decimal,
    /// Cheque number or transfer reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_number: Option<String>,
    /// Bank the transfer came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_name: Option<String>,
    /// Date written on the cheque.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cheque_date: Option<NaiveDate>,
}

impl PaymentLine {
    /// Builds a line from a form entry. Entries without an amount have no
    /// line.
    #[must_use]
    pub fn from_entry(entry: &PaymentEntry) -> Option<Self> {
        Some(Self {
            method: entry.method,
            amount: entry.amount?,
            reference_number: non_blank(entry.reference_number.as_deref()),
            bank_name: non_blank(entry.bank_name.as_deref()),
            cheque_date: entry.cheque_date,
        })
    }
}

/// A validated return as sent to the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReturnLine {
    /// Batch being returned.
    pub batch_id: BatchId,
    /// Product stocked in the batch.
    pub product_id: ProductId,
    /// Units returned.
    pub quantity: u32,
    /// Reason code.
    pub reason: ReturnReason,
    /// Refund value the settlement was computed with.
    pub return_amount: Decimal,
    /// Free-text notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// `POST settle_with_returns` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettleWithReturnsRequest {
    /// Idempotency key.
    pub request_id: Uuid,
    /// Invoice being settled.
    pub invoice_id: InvoiceId,
    /// Payments to apply.
    pub payments: Vec<PaymentLine>,
    /// Returns to apply.
    pub returns: Vec<ReturnLine>,
    /// Notes recorded with the settlement.
    pub settlement_notes: String,
}

/// `POST settle_payments_only` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettlePaymentsOnlyRequest {
    /// Idempotency key.
    pub request_id: Uuid,
    /// Invoice being settled.
    pub invoice_id: InvoiceId,
    /// Payments to apply.
    pub payments: Vec<PaymentLine>,
    /// Notes recorded with the settlement.
    pub notes: String,
}

/// The single request a settlement submits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementPayload {
    /// Payments together with returns.
    WithReturns(SettleWithReturnsRequest),
    /// Payments alone.
    PaymentsOnly(SettlePaymentsOnlyRequest),
}

impl SettlementPayload {
    /// Idempotency key of the request.
    #[must_use]
    pub fn request_id(&self) -> Uuid {
        match self {
            Self::WithReturns(r) => r.request_id,
            Self::PaymentsOnly(r) => r.request_id,
        }
    }

    /// Invoice being settled.
    #[must_use]
    pub fn invoice_id(&self) -> InvoiceId {
        match self {
            Self::WithReturns(r) => r.invoice_id,
            Self::PaymentsOnly(r) => r.invoice_id,
        }
    }

    /// Payments carried by the request.
    #[must_use]
    pub fn payments(&self) -> &[PaymentLine] {
        match self {
            Self::WithReturns(r) => &r.payments,
            Self::PaymentsOnly(r) => &r.payments,
        }
    }

    /// Returns carried by the request.
    #[must_use]
    pub fn returns(&self) -> &[ReturnLine] {
        match self {
            Self::WithReturns(r) => &r.returns,
            Self::PaymentsOnly(_) => &[],
        }
    }

    /// Notes carried by the request.
    #[must_use]
    pub fn notes(&self) -> &str {
        match self {
            Self::WithReturns(r) => &r.settlement_notes,
            Self::PaymentsOnly(r) => &r.notes,
        }
    }

    /// Sum of everything the request applies.
    #[must_use]
    pub fn total(&self) -> Decimal {
        let payments: Decimal = self.payments().iter().map(|p| p.amount).sum();
        let returns: Decimal = self.returns().iter().map(|r| r.return_amount).sum();
        payments + returns
    }
}

/// Service answer to a settlement request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettlementResponse {
    /// The recorded settlement.
    pub settlement_id: SettlementId,
    /// Invoice state after the settlement.
    pub updated_invoice_summary: InvoiceSummary,
    /// Human-readable confirmation.
    pub message: String,
}

/// A settlement as recorded by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettlementTransaction {
    /// The settlement ID.
    pub settlement_id: SettlementId,
    /// Idempotency key the settlement was submitted with.
    pub request_id: Uuid,
    /// Invoice settled.
    pub invoice_id: InvoiceId,
    /// Payments applied.
    pub payments: Vec<PaymentLine>,
    /// Returns applied.
    pub returns: Vec<ReturnLine>,
    /// Notes recorded with the settlement.
    pub notes: String,
    /// When the settlement was applied.
    pub settled_at: DateTime<Utc>,
}

impl SettlementTransaction {
    /// Sum of everything the settlement applied.
    #[must_use]
    pub fn total(&self) -> Decimal {
        let payments: Decimal = self.payments.iter().map(|p| p.amount).sum();
        let returns: Decimal = self.returns.iter().map(|r| r.return_amount).sum();
        payments + returns
    }
}

/// Joins the operator's notes with one line per warning.
#[must_use]
pub fn compose_notes<I, W>(notes: &str, warnings: I) -> String
where
    I: IntoIterator<Item = W>,
    W: std::fmt::Display,
{
    let mut lines: Vec<String> = Vec::new();
    let notes = notes.trim();
    if !notes.is_empty() {
        lines.push(notes.to_string());
    }
    lines.extend(warnings.into_iter().map(|w| format!("Warning: {w}")));
    lines.join("\n")
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}
