//! The back-office service contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stockflow_core::batch::{BatchInfo, BatchSearchResult};
use stockflow_core::invoice::OutstandingInvoices;
use stockflow_core::settlement::{
    SettlePaymentsOnlyRequest, SettleWithReturnsRequest, SettlementPayload, SettlementResponse,
};
use stockflow_core::valuation::ReturnCalculation;
use stockflow_shared::types::{BatchId, InvoiceId, ShopId};

use crate::context::RequestContext;
use crate::error::GatewayError;

/// `GET invoice_batches` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InvoiceBatches {
    /// Batches that contributed to the invoice.
    pub batches: Vec<BatchInfo>,
}

/// `GET batch_search` parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchSearchQuery {
    /// Free text matched against batch numbers and product names.
    pub query: String,
    /// Restricts results to batches of this invoice.
    #[serde(default)]
    pub invoice_id: Option<InvoiceId>,
}

/// `POST return_calculation` body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReturnCalculationRequest {
    /// Batch to value.
    pub batch_id: BatchId,
    /// Units to return.
    pub return_quantity: u32,
    /// Invoice the return is against.
    pub invoice_id: InvoiceId,
}

/// Operations of the invoice and ledger service used by settlements.
#[async_trait]
pub trait BackofficeApi: Send + Sync {
    /// Lists a shop's invoices with a balance due.
    async fn outstanding_invoices(
        &self,
        ctx: &RequestContext,
        shop_id: ShopId,
    ) -> Result<OutstandingInvoices, GatewayError>;

    /// Lists the batches that contributed to an invoice.
    async fn invoice_batches(
        &self,
        ctx: &RequestContext,
        invoice_id: InvoiceId,
    ) -> Result<InvoiceBatches, GatewayError>;

    /// Finds batches by batch number or product name.
    async fn search_batches(
        &self,
        ctx: &RequestContext,
        query: &BatchSearchQuery,
    ) -> Result<Vec<BatchSearchResult>, GatewayError>;

    /// Values a return against committed quantities.
    async fn return_calculation(
        &self,
        ctx: &RequestContext,
        request: &ReturnCalculationRequest,
    ) -> Result<ReturnCalculation, GatewayError>;

    /// Applies payments and returns in one transaction.
    async fn settle_with_returns(
        &self,
        ctx: &RequestContext,
        request: &SettleWithReturnsRequest,
    ) -> Result<SettlementResponse, GatewayError>;

    /// Applies payments in one transaction.
    async fn settle_payments_only(
        &self,
        ctx: &RequestContext,
        request: &SettlePaymentsOnlyRequest,
    ) -> Result<SettlementResponse, GatewayError>;

    /// Sends a settlement payload to the matching endpoint.
    async fn settle(
        &self,
        ctx: &RequestContext,
        payload: &SettlementPayload,
    ) -> Result<SettlementResponse, GatewayError> {
        match payload {
            SettlementPayload::WithReturns(request) => self.settle_with_returns(ctx, request).await,
            SettlementPayload::PaymentsOnly(request) => {
                self.settle_payments_only(ctx, request).await
            }
        }
    }
}
