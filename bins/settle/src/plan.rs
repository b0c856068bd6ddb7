//! Settlement plans read from JSON.

use anyhow::{Context, bail};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stockflow_core::payment::PaymentEntry;
use stockflow_core::settlement::{ReturnReason, SettlementResponse};
use stockflow_session::SettlementSession;
use stockflow_shared::types::{BatchId, InvoiceId, ShopId};
use tracing::{info, warn};

/// What to settle against one invoice.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettlementPlan {
    /// Shop the invoice belongs to.
    pub shop_id: ShopId,
    /// Invoice to settle.
    pub invoice_id: InvoiceId,
    /// Margin configured on the shop, if any.
    #[serde(default)]
    pub shop_margin: Option<Decimal>,
    /// Returns to apply.
    #[serde(default)]
    pub returns: Vec<PlannedReturn>,
    /// Payments to apply. When empty, one cash payment covers whatever the
    /// returns leave of the balance.
    #[serde(default)]
    pub payments: Vec<PaymentEntry>,
    /// Settlement notes.
    #[serde(default)]
    pub notes: String,
}

/// One planned return.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlannedReturn {
    /// Batch to return.
    pub batch_id: BatchId,
    /// Units to return.
    pub quantity: u32,
    /// Reason code; derived from the batch quality when absent.
    #[serde(default)]
    pub reason: Option<ReturnReason>,
    /// Notes for this return.
    #[serde(default)]
    pub notes: Option<String>,
}

/// Printed result of a run.
#[derive(Debug, Serialize)]
pub struct PlanReport {
    /// Whether the settlement was submitted.
    pub submitted: bool,
    /// Return rows the service or the session refused.
    pub invalid_returns: Vec<String>,
    /// The service's answer, when submitted.
    pub response: Option<SettlementResponse>,
}

impl SettlementPlan {
    /// Parses a plan.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("invalid settlement plan")
    }
}

/// Opens the plan's invoice, fills the form and submits it.
///
/// With `dry_run` the form is validated by the session but nothing is
/// sent; the settlement is cancelled instead.
pub async fn execute(
    session: &mut SettlementSession,
    plan: &SettlementPlan,
    dry_run: bool,
) -> anyhow::Result<PlanReport> {
    let listing = session.outstanding_invoices(plan.shop_id).await?;
    let Some(invoice) = listing
        .invoices
        .into_iter()
        .find(|i| i.id == plan.invoice_id)
    else {
        bail!(
            "invoice {} is not outstanding for shop {}",
            plan.invoice_id,
            plan.shop_id
        );
    };

    session.open(invoice, plan.shop_margin).await?;

    for planned in &plan.returns {
        let handle = session
            .add_return(planned.batch_id, planned.quantity, planned.reason)
            .await?;
        if planned.notes.is_some() {
            session
                .form_mut()?
                .set_return_notes(handle, planned.notes.clone())?;
        }
    }

    let form = session.form_mut()?;
    if !plan.payments.is_empty() {
        let prefilled: Vec<_> = form.payments().iter().map(|(handle, _)| handle).collect();
        for handle in prefilled {
            form.remove_payment(handle)?;
        }
        for entry in &plan.payments {
            form.add_payment(entry.clone());
        }
    }
    form.set_notes(plan.notes.clone());

    let invalid_returns: Vec<String> = form
        .invalid_returns()
        .iter()
        .map(|issue| format!("{}: {}", issue.batch_number, issue.reason))
        .collect();
    let totals = form.totals();
    info!(
        invoice_id = %plan.invoice_id,
        payments = %totals.payments,
        returns = %totals.returns,
        remaining = %totals.remaining_balance,
        "settlement prepared"
    );

    if dry_run {
        session.cancel().await?;
        return Ok(PlanReport {
            submitted: false,
            invalid_returns,
            response: None,
        });
    }

    if !invalid_returns.is_empty() {
        warn!(count = invalid_returns.len(), "plan contains invalid returns");
    }
    let response = session.submit().await?;
    Ok(PlanReport {
        submitted: true,
        invalid_returns,
        response: Some(response),
    })
}
