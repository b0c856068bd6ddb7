//! Mocks and fixtures for unit tests.

use async_trait::async_trait;
use mockall::mock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use stockflow_core::batch::{BatchInfo, BatchSearchResult, MatchField, QualityStatus};
use stockflow_core::invoice::{Invoice, InvoiceStatus, OutstandingInvoices};
use stockflow_core::settlement::{
    SettlePaymentsOnlyRequest, SettleWithReturnsRequest, SettlementResponse,
};
use stockflow_core::valuation::{
    QualityDeductionPolicy, ReturnCalculation, ReturnValuationEngine, ValuationInput,
};
use stockflow_gateway::{
    BackofficeApi, BatchSearchQuery, GatewayError, InvoiceBatches, RequestContext,
    ReturnCalculationRequest,
};
use stockflow_shared::types::{BatchId, InvoiceId, ProductId, ShopId};

mock! {
    pub Backoffice {}

    #[async_trait]
    impl BackofficeApi for Backoffice {
        async fn outstanding_invoices(
            &self,
            ctx: &RequestContext,
            shop_id: ShopId,
        ) -> Result<OutstandingInvoices, GatewayError>;

        async fn invoice_batches(
            &self,
            ctx: &RequestContext,
            invoice_id: InvoiceId,
        ) -> Result<InvoiceBatches, GatewayError>;

        async fn search_batches(
            &self,
            ctx: &RequestContext,
            query: &BatchSearchQuery,
        ) -> Result<Vec<BatchSearchResult>, GatewayError>;

        async fn return_calculation(
            &self,
            ctx: &RequestContext,
            request: &ReturnCalculationRequest,
        ) -> Result<ReturnCalculation, GatewayError>;

        async fn settle_with_returns(
            &self,
            ctx: &RequestContext,
            request: &SettleWithReturnsRequest,
        ) -> Result<SettlementResponse, GatewayError>;

        async fn settle_payments_only(
            &self,
            ctx: &RequestContext,
            request: &SettlePaymentsOnlyRequest,
        ) -> Result<SettlementResponse, GatewayError>;
    }
}

pub fn invoice(balance: Decimal) -> Invoice {
    Invoice {
        id: InvoiceId::new(4),
        invoice_number: "INV-0004".to_string(),
        shop_id: ShopId::new(2),
        shop_name: None,
        net_total: balance,
        paid_amount: Decimal::ZERO,
        balance_due: balance,
        status: InvoiceStatus::Pending,
        invoice_date: None,
        due_date: None,
    }
}

pub fn batch(id: i64, number: &str, sold: u32, returned: u32) -> BatchInfo {
    BatchInfo {
        batch_id: BatchId::new(id),
        batch_number: number.to_string(),
        product_id: ProductId::new(id * 10),
        product_name: format!("Product {id}"),
        unit_price: dec!(100.00),
        unit_cost: dec!(60.00),
        sold_quantity: sold,
        already_returned: returned,
        max_returnable_quantity: sold.saturating_sub(returned),
        quality_status: QualityStatus::Good,
        can_return: sold > returned,
    }
}

pub fn search_hit(id: i64, number: &str, scoped: bool) -> BatchSearchResult {
    let line = batch(id, number, 5, 0);
    BatchSearchResult {
        batch_id: line.batch_id,
        batch_number: line.batch_number.clone(),
        product_id: line.product_id,
        product_name: line.product_name.clone(),
        quality_status: line.quality_status,
        matched_on: MatchField::BatchNumber,
        invoice_line: scoped.then_some(line),
    }
}

pub fn engine() -> ReturnValuationEngine {
    ReturnValuationEngine::new(Decimal::ZERO, QualityDeductionPolicy::new())
        .unwrap()
}

/// Values a request the way the service would, at a 20% shop margin.
pub fn service_calculation(line: &BatchInfo, request: &ReturnCalculationRequest) -> ReturnCalculation {
    engine()
        .calculate(ValuationInput {
            invoice_id: request.invoice_id,
            batch: line,
            quantity: request.return_quantity,
            shop_margin: Some(dec!(20)),
            pending_quantity: 0,
        })
        .unwrap()
}
