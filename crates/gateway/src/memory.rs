//! In-process back-office service.
//!
//! Implements the server side of the settlement contract: quantities and
//! balances are re-verified at submission, return values are recomputed,
//! and every settlement is applied to a copy of the state that replaces the
//! original only when the whole settlement succeeded.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use stockflow_core::batch::{BatchInfo, BatchSearchResult, MatchField};
use stockflow_core::invoice::{Invoice, InvoiceSummary, OutstandingInvoices, status_after_settlement};
use stockflow_core::settlement::{
    PaymentLine, ReturnLine, SettlePaymentsOnlyRequest, SettleWithReturnsRequest,
    SettlementResponse, SettlementTransaction,
};
use stockflow_core::valuation::{ReturnCalculation, ReturnValuationEngine, ValuationInput};
use stockflow_shared::types::{
    BatchId, InvoiceId, MINOR_UNIT, MONEY_SCALE, SettlementId, ShopId, display_amount,
    exceeds_by_minor_unit, round_money,
};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::{BackofficeApi, BatchSearchQuery, InvoiceBatches, ReturnCalculationRequest};
use crate::context::RequestContext;
use crate::error::GatewayError;

/// A failure to simulate on the next settlement request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    /// The request never reaches the service.
    Network,
    /// The service fails after applying everything to its working copy
    /// but before committing it.
    AfterApply,
    /// The settlement is committed but the response is lost.
    LostResponse,
}

#[derive(Debug, Clone, Default)]
struct BackofficeState {
    invoices: BTreeMap<InvoiceId, Invoice>,
    lines: BTreeMap<InvoiceId, Vec<BatchInfo>>,
    shop_margins: HashMap<ShopId, Decimal>,
    settlements: Vec<SettlementTransaction>,
    replies: HashMap<Uuid, SettlementResponse>,
    next_settlement_id: i64,
}

/// [`BackofficeApi`] backed by process memory.
#[derive(Debug)]
pub struct InMemoryBackoffice {
    engine: ReturnValuationEngine,
    access_token: Option<String>,
    state: Mutex<BackofficeState>,
    failure: Mutex<Option<InjectedFailure>>,
    calculation_failures: Mutex<u32>,
}

impl InMemoryBackoffice {
    /// Creates an empty service valuing returns with `engine`.
    #[must_use]
    pub fn new(engine: ReturnValuationEngine) -> Self {
        Self {
            engine,
            access_token: None,
            state: Mutex::new(BackofficeState {
                next_settlement_id: 1,
                ..BackofficeState::default()
            }),
            failure: Mutex::new(None),
            calculation_failures: Mutex::new(0),
        }
    }

    /// Requires every request to carry this token.
    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Adds an invoice with the batches on its lines.
    #[must_use]
    pub fn with_invoice(mut self, invoice: Invoice, batches: Vec<BatchInfo>) -> Self {
        let state = self.state.get_mut();
        state.lines.insert(invoice.id, batches);
        state.invoices.insert(invoice.id, invoice);
        self
    }

    /// Configures a shop's margin percentage.
    #[must_use]
    pub fn with_shop_margin(mut self, shop_id: ShopId, margin: Decimal) -> Self {
        self.state.get_mut().shop_margins.insert(shop_id, margin);
        self
    }

    /// Makes the next settlement request fail.
    pub async fn inject_failure(&self, failure: InjectedFailure) {
        *self.failure.lock().await = Some(failure);
    }

    /// Makes the next `count` return calculations fail with a network error.
    pub async fn fail_calculations(&self, count: u32) {
        *self.calculation_failures.lock().await = count;
    }

    /// Current state of an invoice.
    pub async fn invoice(&self, invoice_id: InvoiceId) -> Option<Invoice> {
        self.state.lock().await.invoices.get(&invoice_id).cloned()
    }

    /// Current batch lines of an invoice.
    pub async fn batches(&self, invoice_id: InvoiceId) -> Vec<BatchInfo> {
        self.state
            .lock()
            .await
            .lines
            .get(&invoice_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Every settlement recorded so far.
    pub async fn settlements(&self) -> Vec<SettlementTransaction> {
        self.state.lock().await.settlements.clone()
    }

    /// Applies a payment made outside this subsystem, e.g. from another
    /// session on the same invoice.
    pub async fn record_external_payment(
        &self,
        invoice_id: InvoiceId,
        amount: Decimal,
    ) -> Result<InvoiceSummary, GatewayError> {
        let mut state = self.state.lock().await;
        let invoice = state
            .invoices
            .get_mut(&invoice_id)
            .ok_or_else(|| GatewayError::NotFound(format!("Invoice {invoice_id} not found")))?;
        apply_to_invoice(invoice, amount);
        Ok(InvoiceSummary::from(&*invoice))
    }

    fn authorize(&self, ctx: &RequestContext) -> Result<(), GatewayError> {
        match &self.access_token {
            Some(expected) if ctx.access_token() != Some(expected.as_str()) => Err(
                GatewayError::Unauthorized("Authentication credentials were not provided or are invalid".to_string()),
            ),
            _ => Ok(()),
        }
    }

    /// Values a batch line the way the service sees it: committed returns
    /// only, plus `pending` units of earlier lines in the same request.
    fn value_line(
        &self,
        state: &BackofficeState,
        invoice: &Invoice,
        batch: &BatchInfo,
        quantity: u32,
        pending: u32,
    ) -> Result<ReturnCalculation, GatewayError> {
        let line = effective_line(batch, &self.engine);
        self.engine
            .calculate(ValuationInput {
                invoice_id: invoice.id,
                batch: &line,
                quantity,
                shop_margin: state.shop_margins.get(&invoice.shop_id).copied(),
                pending_quantity: pending,
            })
            .map_err(|e| GatewayError::Rejected(e.to_string()))
    }

    async fn settle(
        &self,
        ctx: &RequestContext,
        request_id: Uuid,
        invoice_id: InvoiceId,
        payments: &[PaymentLine],
        returns: &[ReturnLine],
        notes: &str,
    ) -> Result<SettlementResponse, GatewayError> {
        self.authorize(ctx)?;
        let failure = self.failure.lock().await.take();
        if failure == Some(InjectedFailure::Network) {
            return Err(GatewayError::Network("connection reset by peer".to_string()));
        }

        let mut state = self.state.lock().await;
        if let Some(reply) = state.replies.get(&request_id) {
            let same_request = state
                .settlements
                .iter()
                .find(|t| t.request_id == request_id)
                .is_some_and(|t| {
                    t.invoice_id == invoice_id
                        && t.payments.as_slice() == payments
                        && t.returns.as_slice() == returns
                });
            if !same_request {
                warn!(%request_id, %invoice_id, "request id reused for a different settlement");
                return Err(GatewayError::Conflict(format!(
                    "Request {request_id} was already used for a different settlement"
                )));
            }
            info!(%request_id, %invoice_id, "replaying settlement response");
            return Ok(reply.clone());
        }

        let mut working = state.clone();
        let response = self.apply(&mut working, request_id, invoice_id, payments, returns, notes)?;

        if failure == Some(InjectedFailure::AfterApply) {
            warn!(%invoice_id, "settlement aborted before commit");
            return Err(GatewayError::Server {
                status: 500,
                message: "Settlement could not be recorded".to_string(),
            });
        }

        *state = working;
        info!(
            %invoice_id,
            settlement_id = %response.settlement_id,
            status = %response.updated_invoice_summary.status,
            "settlement committed"
        );

        if failure == Some(InjectedFailure::LostResponse) {
            return Err(GatewayError::Network("response lost".to_string()));
        }
        Ok(response)
    }

    fn apply(
        &self,
        state: &mut BackofficeState,
        request_id: Uuid,
        invoice_id: InvoiceId,
        payments: &[PaymentLine],
        returns: &[ReturnLine],
        notes: &str,
    ) -> Result<SettlementResponse, GatewayError> {
        let invoice = state
            .invoices
            .get(&invoice_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("Invoice {invoice_id} not found")))?;
        if !invoice.status.is_settleable() {
            return Err(GatewayError::Conflict(format!(
                "Invoice {} is {} and cannot be settled",
                invoice.invoice_number, invoice.status
            )));
        }

        for (i, payment) in payments.iter().enumerate() {
            if payment.amount <= Decimal::ZERO {
                return Err(GatewayError::Rejected(format!(
                    "Payment {}: amount must be greater than zero",
                    i + 1
                )));
            }
            if has_sub_minor_units(payment.amount) {
                return Err(GatewayError::Rejected(format!(
                    "Payment {}: amount {} has more than {MONEY_SCALE} decimal places",
                    i + 1,
                    payment.amount
                )));
            }
        }

        let mut claimed: HashMap<BatchId, u32> = HashMap::new();
        for line in returns {
            let batch = state
                .lines
                .get(&invoice_id)
                .and_then(|lines| lines.iter().find(|b| b.batch_id == line.batch_id))
                .ok_or_else(|| {
                    GatewayError::Rejected(format!(
                        "Batch {} is not on invoice {}",
                        line.batch_id, invoice.invoice_number
                    ))
                })?;
            if has_sub_minor_units(line.return_amount) {
                return Err(GatewayError::Rejected(format!(
                    "Return of batch {}: amount {} has more than {MONEY_SCALE} decimal places",
                    batch.batch_number, line.return_amount
                )));
            }
            let pending = claimed.get(&line.batch_id).copied().unwrap_or(0);
            let calculation = self.value_line(state, &invoice, batch, line.quantity, pending)?;

            if !calculation.calculation_valid {
                return Err(GatewayError::Conflict(format!(
                    "Batch {}: {}",
                    batch.batch_number,
                    calculation
                        .invalid_reason
                        .as_deref()
                        .unwrap_or("return quantity is no longer available")
                )));
            }
            if (calculation.total_return_amount - line.return_amount).abs() >= MINOR_UNIT {
                return Err(GatewayError::Conflict(format!(
                    "Return value for batch {} is now {}, not {}",
                    batch.batch_number,
                    display_amount(calculation.total_return_amount),
                    display_amount(line.return_amount)
                )));
            }
            *claimed.entry(line.batch_id).or_insert(0) += line.quantity;
        }

        let total: Decimal = payments.iter().map(|p| p.amount).sum::<Decimal>()
            + returns.iter().map(|r| r.return_amount).sum::<Decimal>();
        if total <= Decimal::ZERO {
            return Err(GatewayError::Rejected(
                "Settlement must apply a positive amount".to_string(),
            ));
        }
        if exceeds_by_minor_unit(total, invoice.balance_due) {
            return Err(GatewayError::Conflict(format!(
                "Settlement total {} exceeds the current balance due {}",
                display_amount(total),
                display_amount(invoice.balance_due)
            )));
        }

        if let Some(lines) = state.lines.get_mut(&invoice_id) {
            for batch in lines.iter_mut() {
                if let Some(quantity) = claimed.get(&batch.batch_id) {
                    batch.already_returned += quantity;
                    batch.max_returnable_quantity = batch.returnable_quantity();
                    batch.can_return = batch.max_returnable_quantity > 0;
                }
            }
        }

        let summary = {
            let stored = state
                .invoices
                .get_mut(&invoice_id)
                .ok_or_else(|| GatewayError::NotFound(format!("Invoice {invoice_id} not found")))?;
            apply_to_invoice(stored, total);
            InvoiceSummary::from(&*stored)
        };

        let settlement_id = SettlementId::new(state.next_settlement_id);
        state.next_settlement_id += 1;
        state.settlements.push(SettlementTransaction {
            settlement_id,
            request_id,
            invoice_id,
            payments: payments.to_vec(),
            returns: returns.to_vec(),
            notes: notes.to_string(),
            settled_at: Utc::now(),
        });

        let response = SettlementResponse {
            settlement_id,
            message: format!(
                "Settled {} against invoice {}; balance due {}",
                display_amount(total),
                summary.invoice_number,
                display_amount(summary.balance_due)
            ),
            updated_invoice_summary: summary,
        };
        state.replies.insert(request_id, response.clone());
        Ok(response)
    }
}

/// Applies `amount` to an invoice's paid amount, balance and status.
///
/// At most the balance due is applied, so `balance_due` stays equal to
/// `net_total - paid_amount`.
fn apply_to_invoice(invoice: &mut Invoice, amount: Decimal) {
    let applied = round_money(amount).min(invoice.balance_due);
    invoice.status = status_after_settlement(invoice.balance_due, applied);
    invoice.paid_amount += applied;
    invoice.balance_due -= applied;
}

fn has_sub_minor_units(amount: Decimal) -> bool {
    amount.normalize().scale() > MONEY_SCALE
}

/// A batch line with its returnable quantity and flag derived from the
/// counts and the quality policy.
fn effective_line(batch: &BatchInfo, engine: &ReturnValuationEngine) -> BatchInfo {
    let mut line = batch.clone();
    line.max_returnable_quantity = line.returnable_quantity();
    line.can_return =
        line.max_returnable_quantity > 0 && engine.policy().allows_return(line.quality_status);
    line
}

#[async_trait]
impl BackofficeApi for InMemoryBackoffice {
    async fn outstanding_invoices(
        &self,
        ctx: &RequestContext,
        shop_id: ShopId,
    ) -> Result<OutstandingInvoices, GatewayError> {
        self.authorize(ctx)?;
        let state = self.state.lock().await;
        let invoices: Vec<Invoice> = state
            .invoices
            .values()
            .filter(|i| i.shop_id == shop_id && i.is_outstanding())
            .cloned()
            .collect();
        let total_outstanding = invoices.iter().map(|i| i.balance_due).sum();
        Ok(OutstandingInvoices {
            invoices,
            total_outstanding,
        })
    }

    async fn invoice_batches(
        &self,
        ctx: &RequestContext,
        invoice_id: InvoiceId,
    ) -> Result<InvoiceBatches, GatewayError> {
        self.authorize(ctx)?;
        let state = self.state.lock().await;
        if !state.invoices.contains_key(&invoice_id) {
            return Err(GatewayError::NotFound(format!("Invoice {invoice_id} not found")));
        }
        let batches = state
            .lines
            .get(&invoice_id)
            .map(|lines| lines.iter().map(|b| effective_line(b, &self.engine)).collect())
            .unwrap_or_default();
        Ok(InvoiceBatches { batches })
    }

    async fn search_batches(
        &self,
        ctx: &RequestContext,
        query: &BatchSearchQuery,
    ) -> Result<Vec<BatchSearchResult>, GatewayError> {
        self.authorize(ctx)?;
        let state = self.state.lock().await;

        let candidates: Vec<(&BatchInfo, bool)> = match query.invoice_id {
            Some(invoice_id) => state
                .lines
                .get(&invoice_id)
                .map(|lines| lines.iter().map(|b| (b, true)).collect())
                .unwrap_or_default(),
            None => {
                let mut seen: BTreeMap<BatchId, &BatchInfo> = BTreeMap::new();
                for batch in state.lines.values().flatten() {
                    seen.entry(batch.batch_id).or_insert(batch);
                }
                seen.into_values().map(|b| (b, false)).collect()
            }
        };

        Ok(candidates
            .into_iter()
            .filter_map(|(batch, scoped)| {
                let matched_on =
                    MatchField::detect(&batch.batch_number, &batch.product_name, &query.query)?;
                Some(BatchSearchResult {
                    batch_id: batch.batch_id,
                    batch_number: batch.batch_number.clone(),
                    product_id: batch.product_id,
                    product_name: batch.product_name.clone(),
                    quality_status: batch.quality_status,
                    matched_on,
                    invoice_line: scoped.then(|| effective_line(batch, &self.engine)),
                })
            })
            .collect())
    }

    async fn return_calculation(
        &self,
        ctx: &RequestContext,
        request: &ReturnCalculationRequest,
    ) -> Result<ReturnCalculation, GatewayError> {
        self.authorize(ctx)?;
        {
            let mut failures = self.calculation_failures.lock().await;
            if *failures > 0 {
                *failures -= 1;
                return Err(GatewayError::Network("calculation request timed out".to_string()));
            }
        }

        let state = self.state.lock().await;
        let invoice = state.invoices.get(&request.invoice_id).ok_or_else(|| {
            GatewayError::NotFound(format!("Invoice {} not found", request.invoice_id))
        })?;
        let batch = state
            .lines
            .get(&request.invoice_id)
            .and_then(|lines| lines.iter().find(|b| b.batch_id == request.batch_id))
            .ok_or_else(|| {
                GatewayError::NotFound(format!(
                    "Batch {} is not on invoice {}",
                    request.batch_id, invoice.invoice_number
                ))
            })?;
        self.value_line(&state, invoice, batch, request.return_quantity, 0)
    }

    async fn settle_with_returns(
        &self,
        ctx: &RequestContext,
        request: &SettleWithReturnsRequest,
    ) -> Result<SettlementResponse, GatewayError> {
        self.settle(
            ctx,
            request.request_id,
            request.invoice_id,
            &request.payments,
            &request.returns,
            &request.settlement_notes,
        )
        .await
    }

    async fn settle_payments_only(
        &self,
        ctx: &RequestContext,
        request: &SettlePaymentsOnlyRequest,
    ) -> Result<SettlementResponse, GatewayError> {
        self.settle(
            ctx,
            request.request_id,
            request.invoice_id,
            &request.payments,
            &[],
            &request.notes,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use stockflow_core::batch::QualityStatus;
    use stockflow_core::invoice::InvoiceStatus;
    use stockflow_core::payment::{PaymentEntry, PaymentMethod};
    use stockflow_core::settlement::ReturnReason;
    use stockflow_core::valuation::{QualityDeductionPolicy, QualityRule};
    use stockflow_shared::types::ProductId;

    fn make_invoice(balance: Decimal) -> Invoice {
        Invoice {
            id: InvoiceId::new(1),
            invoice_number: "INV-0001".to_string(),
            shop_id: ShopId::new(9),
            shop_name: Some("Hill Road Grocers".to_string()),
            net_total: balance,
            paid_amount: Decimal::ZERO,
            balance_due: balance,
            status: InvoiceStatus::Pending,
            invoice_date: None,
            due_date: None,
        }
    }

    fn make_batch(id: i64, number: &str, product: &str, sold: u32, returned: u32) -> BatchInfo {
        BatchInfo {
            batch_id: BatchId::new(id),
            batch_number: number.to_string(),
            product_id: ProductId::new(id),
            product_name: product.to_string(),
            unit_price: dec!(100.00),
            unit_cost: dec!(70.00),
            sold_quantity: sold,
            already_returned: returned,
            max_returnable_quantity: 0,
            quality_status: QualityStatus::Good,
            can_return: false,
        }
    }

    fn backoffice() -> InMemoryBackoffice {
        let engine = ReturnValuationEngine::new(Decimal::ZERO, QualityDeductionPolicy::new()).unwrap();
        InMemoryBackoffice::new(engine)
            .with_invoice(
                make_invoice(dec!(500.00)),
                vec![
                    make_batch(1, "B-2024-001", "Mango Juice 1L", 5, 0),
                    make_batch(2, "B-2024-002", "Rice 5kg", 3, 3),
                ],
            )
            .with_shop_margin(ShopId::new(9), dec!(20))
    }

    fn payment(amount: Decimal) -> PaymentLine {
        PaymentLine::from_entry(&PaymentEntry::new(PaymentMethod::Cash, amount)).unwrap()
    }

    fn return_line(batch: i64, quantity: u32, amount: Decimal) -> ReturnLine {
        ReturnLine {
            batch_id: BatchId::new(batch),
            product_id: ProductId::new(batch),
            quantity,
            reason: ReturnReason::Damaged,
            return_amount: amount,
            notes: None,
        }
    }

    fn with_returns(payments: Vec<PaymentLine>, returns: Vec<ReturnLine>) -> SettleWithReturnsRequest {
        SettleWithReturnsRequest {
            request_id: Uuid::now_v7(),
            invoice_id: InvoiceId::new(1),
            payments,
            returns,
            settlement_notes: String::new(),
        }
    }

    #[tokio::test]
    async fn test_invoice_batches_derive_returnable() {
        let service = backoffice();
        let batches = service
            .invoice_batches(&RequestContext::anonymous(), InvoiceId::new(1))
            .await
            .unwrap()
            .batches;
        assert_eq!(batches[0].max_returnable_quantity, 5);
        assert!(batches[0].can_return);
        assert_eq!(batches[1].max_returnable_quantity, 0);
        assert!(!batches[1].can_return);
    }

    #[tokio::test]
    async fn test_not_returnable_quality_blocks_line() {
        let engine = ReturnValuationEngine::new(
            Decimal::ZERO,
            QualityDeductionPolicy::new()
                .with_rule(QualityStatus::Expired, QualityRule::NotReturnable)
                .unwrap(),
        )
        .unwrap();
        let mut expired = make_batch(1, "B-1", "Milk", 5, 0);
        expired.quality_status = QualityStatus::Expired;
        let service = InMemoryBackoffice::new(engine).with_invoice(make_invoice(dec!(100)), vec![expired]);

        let batches = service
            .invoice_batches(&RequestContext::anonymous(), InvoiceId::new(1))
            .await
            .unwrap()
            .batches;
        assert!(!batches[0].can_return);
        assert_eq!(batches[0].max_returnable_quantity, 5);
    }

    #[tokio::test]
    async fn test_unknown_invoice_not_found() {
        let err = backoffice()
            .invoice_batches(&RequestContext::anonymous(), InvoiceId::new(99))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_search_scoped_and_unscoped() {
        let service = backoffice();
        let ctx = RequestContext::anonymous();

        let results = service
            .search_batches(
                &ctx,
                &BatchSearchQuery {
                    query: "rice".to_string(),
                    invoice_id: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].matched_on, MatchField::ProductName);
        assert!(results[0].invoice_line.is_none());

        let results = service
            .search_batches(
                &ctx,
                &BatchSearchQuery {
                    query: "b-2024".to_string(),
                    invoice_id: Some(InvoiceId::new(1)),
                },
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.matched_on == MatchField::BatchNumber));
        assert!(results[0].is_returnable_on_invoice());
        assert!(!results[1].is_returnable_on_invoice());
    }

    #[tokio::test]
    async fn test_return_calculation_uses_shop_margin() {
        let calc = backoffice()
            .return_calculation(
                &RequestContext::anonymous(),
                &ReturnCalculationRequest {
                    batch_id: BatchId::new(1),
                    return_quantity: 2,
                    invoice_id: InvoiceId::new(1),
                },
            )
            .await
            .unwrap();
        assert_eq!(calc.cost_price_per_unit, dec!(80.00));
        assert_eq!(calc.total_return_amount, dec!(160.00));
        assert!(calc.calculation_valid);
    }

    #[tokio::test]
    async fn test_settlement_applies_everything() {
        let service = backoffice();
        let request = with_returns(vec![payment(dec!(340.00))], vec![return_line(1, 2, dec!(160.00))]);
        let response = service
            .settle_with_returns(&RequestContext::anonymous(), &request)
            .await
            .unwrap();

        assert_eq!(response.updated_invoice_summary.balance_due, Decimal::ZERO);
        assert_eq!(response.updated_invoice_summary.status, InvoiceStatus::Paid);
        let batches = service.batches(InvoiceId::new(1)).await;
        assert_eq!(batches[0].already_returned, 2);
        assert_eq!(service.settlements().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_after_apply_changes_nothing() {
        let service = backoffice();
        service.inject_failure(InjectedFailure::AfterApply).await;
        let request = with_returns(vec![payment(dec!(340.00))], vec![return_line(1, 2, dec!(160.00))]);

        let err = service
            .settle_with_returns(&RequestContext::anonymous(), &request)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "SERVER_ERROR");

        let invoice = service.invoice(InvoiceId::new(1)).await.unwrap();
        assert_eq!(invoice.balance_due, dec!(500.00));
        assert_eq!(invoice.status, InvoiceStatus::Pending);
        assert_eq!(service.batches(InvoiceId::new(1)).await[0].already_returned, 0);
        assert!(service.settlements().await.is_empty());
    }

    #[tokio::test]
    async fn test_rejection_mid_request_changes_nothing() {
        let service = backoffice();
        // The second line asks for units of a fully returned batch.
        let request = with_returns(
            vec![payment(dec!(100.00))],
            vec![return_line(1, 1, dec!(80.00)), return_line(2, 1, dec!(80.00))],
        );
        let err = service
            .settle_with_returns(&RequestContext::anonymous(), &request)
            .await
            .unwrap_err();
        assert!(err.is_stale());
        assert_eq!(service.batches(InvoiceId::new(1)).await[0].already_returned, 0);
        assert_eq!(
            service.invoice(InvoiceId::new(1)).await.unwrap().balance_due,
            dec!(500.00)
        );
    }

    #[tokio::test]
    async fn test_lines_on_same_batch_share_quantity() {
        let service = backoffice();
        let request = with_returns(
            vec![],
            vec![return_line(1, 5, dec!(400.00)), return_line(1, 1, dec!(80.00))],
        );
        let err = service
            .settle_with_returns(&RequestContext::anonymous(), &request)
            .await
            .unwrap_err();
        assert!(err.is_stale());
    }

    #[tokio::test]
    async fn test_changed_return_value_is_stale() {
        let service = backoffice();
        let request = with_returns(vec![payment(dec!(300.00))], vec![return_line(1, 2, dec!(200.00))]);
        let err = service
            .settle_with_returns(&RequestContext::anonymous(), &request)
            .await
            .unwrap_err();
        assert!(err.is_stale());
        assert!(err.message().contains("160.00"));
    }

    #[tokio::test]
    async fn test_balance_rechecked_at_submission() {
        let service = backoffice();
        service
            .record_external_payment(InvoiceId::new(1), dec!(200.00))
            .await
            .unwrap();

        let request = SettlePaymentsOnlyRequest {
            request_id: Uuid::now_v7(),
            invoice_id: InvoiceId::new(1),
            payments: vec![payment(dec!(500.00))],
            notes: String::new(),
        };
        let err = service
            .settle_payments_only(&RequestContext::anonymous(), &request)
            .await
            .unwrap_err();
        assert!(err.is_stale());
        assert_eq!(
            service.invoice(InvoiceId::new(1)).await.unwrap().balance_due,
            dec!(300.00)
        );
    }

    #[tokio::test]
    async fn test_repeated_request_id_replays() {
        let service = backoffice();
        service.inject_failure(InjectedFailure::LostResponse).await;
        let request = SettlePaymentsOnlyRequest {
            request_id: Uuid::now_v7(),
            invoice_id: InvoiceId::new(1),
            payments: vec![payment(dec!(200.00))],
            notes: String::new(),
        };
        let ctx = RequestContext::anonymous();

        assert!(service.settle_payments_only(&ctx, &request).await.unwrap_err().is_transient());
        let replay = service.settle_payments_only(&ctx, &request).await.unwrap();

        assert_eq!(replay.updated_invoice_summary.balance_due, dec!(300.00));
        assert_eq!(replay.updated_invoice_summary.status, InvoiceStatus::Partial);
        assert_eq!(service.settlements().await.len(), 1);
    }

    #[tokio::test]
    async fn test_reused_request_id_for_other_payload_conflicts() {
        let service = backoffice();
        let ctx = RequestContext::anonymous();
        let first = SettlePaymentsOnlyRequest {
            request_id: Uuid::now_v7(),
            invoice_id: InvoiceId::new(1),
            payments: vec![payment(dec!(200.00))],
            notes: String::new(),
        };
        service.settle_payments_only(&ctx, &first).await.unwrap();

        let other = SettlePaymentsOnlyRequest {
            payments: vec![payment(dec!(150.00))],
            ..first.clone()
        };
        let err = service.settle_payments_only(&ctx, &other).await.unwrap_err();

        assert!(err.is_stale());
        assert!(err.message().contains("different settlement"));
        assert_eq!(service.settlements().await.len(), 1);
        assert_eq!(
            service.invoice(InvoiceId::new(1)).await.unwrap().balance_due,
            dec!(300.00)
        );
    }

    #[tokio::test]
    async fn test_sub_minor_unit_lines_rejected() {
        let service = backoffice();
        let ctx = RequestContext::anonymous();
        let request = SettlePaymentsOnlyRequest {
            request_id: Uuid::now_v7(),
            invoice_id: InvoiceId::new(1),
            payments: vec![payment(dec!(500.009))],
            notes: String::new(),
        };
        let err = service.settle_payments_only(&ctx, &request).await.unwrap_err();
        assert_eq!(err.error_code(), "REJECTED");

        let request = with_returns(vec![payment(dec!(340.00))], vec![return_line(1, 2, dec!(159.999))]);
        let err = service.settle_with_returns(&ctx, &request).await.unwrap_err();
        assert_eq!(err.error_code(), "REJECTED");

        let invoice = service.invoice(InvoiceId::new(1)).await.unwrap();
        assert_eq!(invoice.balance_due, dec!(500.00));
        assert!(service.settlements().await.is_empty());
    }

    #[tokio::test]
    async fn test_token_required() {
        let service = backoffice().with_access_token("s3cret");
        let err = service
            .outstanding_invoices(&RequestContext::anonymous(), ShopId::new(9))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "UNAUTHORIZED");

        let outstanding = service
            .outstanding_invoices(&RequestContext::with_token("s3cret"), ShopId::new(9))
            .await
            .unwrap();
        assert_eq!(outstanding.invoices.len(), 1);
        assert_eq!(outstanding.total_outstanding, dec!(500.00));
    }

    #[tokio::test]
    async fn test_injected_calculation_failures() {
        let service = backoffice();
        service.fail_calculations(1).await;
        let request = ReturnCalculationRequest {
            batch_id: BatchId::new(1),
            return_quantity: 1,
            invoice_id: InvoiceId::new(1),
        };
        let ctx = RequestContext::anonymous();
        assert!(service.return_calculation(&ctx, &request).await.unwrap_err().is_transient());
        assert!(service.return_calculation(&ctx, &request).await.is_ok());
    }
}
