//! HTTP client for the back-office service.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use stockflow_core::batch::BatchSearchResult;
use stockflow_core::invoice::OutstandingInvoices;
use stockflow_core::settlement::{
    SettlePaymentsOnlyRequest, SettleWithReturnsRequest, SettlementResponse,
};
use stockflow_core::valuation::ReturnCalculation;
use stockflow_shared::config::GatewayConfig;
use stockflow_shared::types::{InvoiceId, ShopId};
use tracing::{debug, info, warn};

use crate::api::{BackofficeApi, BatchSearchQuery, InvoiceBatches, ReturnCalculationRequest};
use crate::context::RequestContext;
use crate::error::GatewayError;

/// [`BackofficeApi`] over HTTP with JSON bodies.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
}

impl HttpGateway {
    /// Creates a client for the service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| GatewayError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Creates a client from configuration.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        Self::new(&config.base_url, Duration::from_secs(config.timeout_secs))
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(request: RequestBuilder, ctx: &RequestContext) -> RequestBuilder {
        match ctx.bearer() {
            Some(auth) => request.header(reqwest::header::AUTHORIZATION, auth),
            None => request,
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, GatewayError> {
        let request = Self::authorize(self.client.get(self.url(path)).query(query), ctx);
        debug!(path, "GET");
        let response = request.send().await?;
        Self::handle_response(response).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        ctx: &RequestContext,
        path: &str,
        body: &B,
    ) -> Result<T, GatewayError> {
        let request = Self::authorize(self.client.post(self.url(path)).json(body), ctx);
        debug!(path, "POST");
        let response = request.send().await?;
        Self::handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = error_message(&text).unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
            warn!(status = status.as_u16(), %message, "back-office request failed");
            return Err(GatewayError::from_status(status.as_u16(), message));
        }

        serde_json::from_str(&text).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }
}

/// Pulls a human-readable message out of an error body.
///
/// Accepts `{"message": ..}`, `{"error": ..}` or `{"detail": ..}`, and
/// falls back to the raw text.
fn error_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error", "detail"] {
            if let Some(serde_json::Value::String(message)) = map.get(key) {
                return Some(message.clone());
            }
        }
    }
    Some(body.to_string())
}

#[async_trait]
impl BackofficeApi for HttpGateway {
    async fn outstanding_invoices(
        &self,
        ctx: &RequestContext,
        shop_id: ShopId,
    ) -> Result<OutstandingInvoices, GatewayError> {
        self.get(
            ctx,
            "/api/invoices/outstanding/",
            &[("shop_id", shop_id.to_string())],
        )
        .await
    }

    async fn invoice_batches(
        &self,
        ctx: &RequestContext,
        invoice_id: InvoiceId,
    ) -> Result<InvoiceBatches, GatewayError> {
        self.get(ctx, &format!("/api/invoices/{invoice_id}/batches/"), &[])
            .await
    }

    async fn search_batches(
        &self,
        ctx: &RequestContext,
        query: &BatchSearchQuery,
    ) -> Result<Vec<BatchSearchResult>, GatewayError> {
        let mut params = vec![("q", query.query.clone())];
        if let Some(invoice_id) = query.invoice_id {
            params.push(("invoice_id", invoice_id.to_string()));
        }
        self.get(ctx, "/api/batches/search/", &params).await
    }

    async fn return_calculation(
        &self,
        ctx: &RequestContext,
        request: &ReturnCalculationRequest,
    ) -> Result<ReturnCalculation, GatewayError> {
        self.post(ctx, "/api/returns/calculate/", request).await
    }

    async fn settle_with_returns(
        &self,
        ctx: &RequestContext,
        request: &SettleWithReturnsRequest,
    ) -> Result<SettlementResponse, GatewayError> {
        let response: SettlementResponse = self
            .post(
                ctx,
                &format!("/api/invoices/{}/settle-with-returns/", request.invoice_id),
                request,
            )
            .await?;
        info!(
            invoice_id = %request.invoice_id,
            settlement_id = %response.settlement_id,
            returns = request.returns.len(),
            "settlement with returns recorded"
        );
        Ok(response)
    }

    async fn settle_payments_only(
        &self,
        ctx: &RequestContext,
        request: &SettlePaymentsOnlyRequest,
    ) -> Result<SettlementResponse, GatewayError> {
        let response: SettlementResponse = self
            .post(
                ctx,
                &format!("/api/invoices/{}/settle/", request.invoice_id),
                request,
            )
            .await?;
        info!(
            invoice_id = %request.invoice_id,
            settlement_id = %response.settlement_id,
            "payment settlement recorded"
        );
        Ok(response)
    }
}
