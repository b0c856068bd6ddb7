//! Settlement session.
//!
//! Drives a [`SettlementReconciler`] against a back-office service: loads
//! the batch ledger when an invoice is opened, asks the service to value
//! each return row, correlates every response with the row state that
//! caused it, and submits the single settlement request.

use rust_decimal::Decimal;
use std::sync::Arc;
use stockflow_core::batch::BatchSearchResult;
use stockflow_core::invoice::{Invoice, OutstandingInvoices};
use stockflow_core::payment::PaymentValidator;
use stockflow_core::settlement::{
    CalculationOutcome, CalculationTicket, ReturnReason, RowHandle, SettlementError,
    SettlementForm, SettlementReconciler, SettlementResponse, SettlementState, SettlementTotals,
};
use stockflow_core::valuation::{ReturnCalculation, ReturnValuationEngine};
use stockflow_gateway::{BackofficeApi, GatewayError, RequestContext, ReturnCalculationRequest};
use stockflow_shared::AppConfig;
use stockflow_shared::types::{BatchId, InvoiceId, ShopId};
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::reader::BatchLedgerReader;
use crate::refresh::{NoopRefresh, RefreshHooks};

/// Identifies one batch search so that only the newest answer is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTicket {
    sequence: u64,
    query: String,
    invoice_id: Option<InvoiceId>,
}

impl SearchTicket {
    /// Position of this search in the session's sequence.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// The query text.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }
}

/// One operator settling invoices against one service.
pub struct SettlementSession {
    api: Arc<dyn BackofficeApi>,
    reader: BatchLedgerReader,
    hooks: Arc<dyn RefreshHooks>,
    engine: ReturnValuationEngine,
    ctx: RequestContext,
    reconciler: SettlementReconciler,
    refresh_suspended: bool,
    search_sequence: u64,
    search_results: Arc<Vec<BatchSearchResult>>,
}

impl SettlementSession {
    /// Creates an idle session.
    #[must_use]
    pub fn new(
        api: Arc<dyn BackofficeApi>,
        ctx: RequestContext,
        engine: ReturnValuationEngine,
        validator: PaymentValidator,
    ) -> Self {
        Self {
            reader: BatchLedgerReader::new(Arc::clone(&api)),
            api,
            hooks: Arc::new(NoopRefresh),
            engine,
            ctx,
            reconciler: SettlementReconciler::new(validator),
            refresh_suspended: false,
            search_sequence: 0,
            search_results: Arc::new(Vec::new()),
        }
    }

    /// Creates an idle session from configuration.
    pub fn from_config(
        api: Arc<dyn BackofficeApi>,
        ctx: RequestContext,
        config: &AppConfig,
    ) -> Result<Self, SessionError> {
        let engine =
            ReturnValuationEngine::from_config(&config.valuation).map_err(SettlementError::from)?;
        let reader = BatchLedgerReader::with_config(Arc::clone(&api), &config.search);
        Ok(Self::new(
            api,
            ctx,
            engine,
            PaymentValidator::from_config(&config.settlement),
        )
        .with_reader(reader))
    }

    /// Replaces the batch ledger reader.
    #[must_use]
    pub fn with_reader(mut self, reader: BatchLedgerReader) -> Self {
        self.reader = reader;
        self
    }

    /// Installs refresh hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn RefreshHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Current settlement state.
    #[must_use]
    pub fn state(&self) -> SettlementState {
        self.reconciler.state()
    }

    /// The underlying state machine.
    #[must_use]
    pub fn reconciler(&self) -> &SettlementReconciler {
        &self.reconciler
    }

    /// The open form, if any.
    #[must_use]
    pub fn form(&self) -> Option<&SettlementForm> {
        self.reconciler.form()
    }

    /// Mutable access to the open form for payment and note edits.
    pub fn form_mut(&mut self) -> Result<&mut SettlementForm, SessionError> {
        Ok(self.reconciler.form_mut()?)
    }

    /// The newest accepted search results.
    #[must_use]
    pub fn search_results(&self) -> &[BatchSearchResult] {
        &self.search_results
    }

    /// The batch ledger reader.
    #[must_use]
    pub fn reader(&self) -> &BatchLedgerReader {
        &self.reader
    }

    /// Lists a shop's outstanding invoices.
    pub async fn outstanding_invoices(
        &self,
        shop_id: ShopId,
    ) -> Result<OutstandingInvoices, SessionError> {
        let listing = self
            .api
            .outstanding_invoices(&self.ctx, shop_id)
            .await
            .map_err(SessionError::Service)?;
        if !listing.is_consistent() {
            warn!(
                %shop_id,
                reported = %listing.total_outstanding,
                listed = %listing.listed_total(),
                "outstanding total disagrees with the listed balances"
            );
        }
        Ok(listing)
    }

    /// Opens a settlement for an invoice.
    ///
    /// Loads the invoice's batches, pre-fills one cash payment of the full
    /// balance and suspends auto-refresh elsewhere.
    pub async fn open(
        &mut self,
        invoice: Invoice,
        shop_margin: Option<Decimal>,
    ) -> Result<SettlementTotals, SessionError> {
        if !invoice.is_consistent() {
            warn!(
                invoice_id = %invoice.id,
                balance_due = %invoice.balance_due,
                derived = %invoice.derived_balance(),
                "invoice balance disagrees with its totals"
            );
        }
        let ledger = self
            .reader
            .invoice_batches(&self.ctx, invoice.id)
            .await
            .map_err(SessionError::Service)?;

        let invoice_id = invoice.id;
        let form = SettlementForm::new(invoice, ledger, self.engine.clone(), shop_margin)?;
        let totals = form.totals();
        self.reconciler.open(form)?;
        self.search_results = Arc::new(Vec::new());

        if !self.refresh_suspended {
            self.hooks.suspend_auto_refresh().await;
            self.refresh_suspended = true;
        }
        info!(
            %invoice_id,
            operator = self.ctx.operator().unwrap_or("-"),
            "settlement opened"
        );
        Ok(totals)
    }

    /// Adds a return row and asks the service to value it.
    ///
    /// The row is usable at once with a local estimate. A failed service
    /// valuation is recorded on the row and does not fail the call.
    pub async fn add_return(
        &mut self,
        batch_id: BatchId,
        quantity: u32,
        reason: Option<ReturnReason>,
    ) -> Result<RowHandle, SessionError> {
        let handle = self.form_mut()?.add_return(batch_id, quantity, reason)?;
        self.value_quietly(handle).await?;
        Ok(handle)
    }

    /// Adds a return row seeded from a search result.
    pub async fn add_return_from_search(
        &mut self,
        result: &BatchSearchResult,
        quantity: u32,
        reason: Option<ReturnReason>,
    ) -> Result<RowHandle, SessionError> {
        let handle = self
            .form_mut()?
            .add_return_from_search(result, quantity, reason)?;
        self.value_quietly(handle).await?;
        Ok(handle)
    }

    /// Changes a return row's quantity and revalues it.
    pub async fn set_return_quantity(
        &mut self,
        handle: RowHandle,
        quantity: u32,
    ) -> Result<(), SessionError> {
        self.form_mut()?.set_return_quantity(handle, quantity)?;
        self.value_quietly(handle).await
    }

    /// Points a return row at another batch and revalues it.
    pub async fn set_return_batch(
        &mut self,
        handle: RowHandle,
        batch_id: BatchId,
    ) -> Result<(), SessionError> {
        self.form_mut()?.set_return_batch(handle, batch_id)?;
        self.value_quietly(handle).await
    }

    /// Issues a ticket for a service valuation of a row's current state.
    pub fn calculation_request(&self, handle: RowHandle) -> Result<CalculationTicket, SessionError> {
        let form = self.reconciler.form().ok_or(SettlementError::InvalidState {
            state: self.reconciler.state(),
            action: "value a return",
        })?;
        Ok(form.calculation_ticket(handle)?)
    }

    /// Asks the service to value the row state captured in `ticket`.
    ///
    /// Takes `&self` so that several valuations may be in flight; their
    /// answers are applied with [`Self::apply_calculation`] in whatever
    /// order they arrive.
    pub async fn fetch_calculation(
        &self,
        ticket: CalculationTicket,
    ) -> Result<ReturnCalculation, GatewayError> {
        let request = ReturnCalculationRequest {
            batch_id: ticket.batch_id,
            return_quantity: ticket.quantity,
            invoice_id: ticket.invoice_id,
        };
        self.api.return_calculation(&self.ctx, &request).await
    }

    /// Applies the answer to a valuation request.
    ///
    /// Answers for rows that changed since the ticket was issued are
    /// discarded. A failure is recorded on the row, which keeps its local
    /// estimate, and returned as [`SessionError::Service`].
    pub fn apply_calculation(
        &mut self,
        ticket: CalculationTicket,
        result: Result<ReturnCalculation, GatewayError>,
    ) -> Result<CalculationOutcome, SessionError> {
        let form = self.reconciler.form_mut()?;
        match result {
            Ok(calculation) => {
                let outcome = form.apply_calculation(ticket, calculation)?;
                if outcome == CalculationOutcome::Stale {
                    debug!(row = %ticket.row, generation = ticket.generation, "discarded stale valuation");
                }
                Ok(outcome)
            }
            Err(e) => {
                if form.record_calculation_failure(ticket, e.message()) == CalculationOutcome::Stale {
                    return Ok(CalculationOutcome::Stale);
                }
                warn!(
                    row = %ticket.row,
                    batch_id = %ticket.batch_id,
                    error = %e,
                    "return valuation failed"
                );
                Err(SessionError::Service(e))
            }
        }
    }

    /// Requests and applies a service valuation for a row.
    pub async fn refresh_calculation(
        &mut self,
        handle: RowHandle,
    ) -> Result<CalculationOutcome, SessionError> {
        let ticket = self.calculation_request(handle)?;
        let result = self.fetch_calculation(ticket).await;
        self.apply_calculation(ticket, result)
    }

    async fn value_quietly(&mut self, handle: RowHandle) -> Result<(), SessionError> {
        match self.refresh_calculation(handle).await {
            Ok(_) | Err(SessionError::Service(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Starts a batch search, scoped to the open invoice when `scoped`.
    pub fn begin_search(&mut self, query: &str, scoped: bool) -> SearchTicket {
        self.search_sequence += 1;
        let invoice_id = if scoped {
            self.reconciler.form().map(|f| f.invoice().id)
        } else {
            None
        };
        SearchTicket {
            sequence: self.search_sequence,
            query: query.to_string(),
            invoice_id,
        }
    }

    /// Runs the search described by `ticket`.
    pub async fn run_search(
        &self,
        ticket: &SearchTicket,
    ) -> Result<Arc<Vec<BatchSearchResult>>, GatewayError> {
        self.reader
            .search(&self.ctx, &ticket.query, ticket.invoice_id)
            .await
    }

    /// Accepts search results if no newer search was started since.
    ///
    /// Returns false when the results were discarded.
    pub fn finish_search(
        &mut self,
        ticket: &SearchTicket,
        results: Arc<Vec<BatchSearchResult>>,
    ) -> bool {
        if ticket.sequence != self.search_sequence {
            debug!(
                sequence = ticket.sequence,
                latest = self.search_sequence,
                "discarded stale search results"
            );
            return false;
        }
        self.search_results = results;
        true
    }

    /// Searches batches and keeps the results.
    pub async fn search(
        &mut self,
        query: &str,
        scoped: bool,
    ) -> Result<&[BatchSearchResult], SessionError> {
        let ticket = self.begin_search(query, scoped);
        let results = self
            .run_search(&ticket)
            .await
            .map_err(SessionError::Service)?;
        self.finish_search(&ticket, results);
        Ok(&self.search_results)
    }

    /// Validates the form and submits the settlement.
    ///
    /// Validation failures return the form to editing without a request.
    /// A rejected submission leaves the settlement failed with the form and
    /// the service's message kept; nothing was applied.
    pub async fn submit(&mut self) -> Result<SettlementResponse, SessionError> {
        let payload = self.reconciler.prepare_submission()?;
        let invoice_id = payload.invoice_id();
        info!(
            %invoice_id,
            request_id = %payload.request_id(),
            payments = payload.payments().len(),
            returns = payload.returns().len(),
            total = %payload.total(),
            "submitting settlement"
        );

        match self.api.settle(&self.ctx, &payload).await {
            Ok(response) => {
                self.reconciler.record_success(response.clone())?;
                self.reader.invalidate();
                self.hooks
                    .settlement_completed(&response.updated_invoice_summary)
                    .await;
                self.resume_refresh().await;
                info!(
                    %invoice_id,
                    settlement_id = %response.settlement_id,
                    status = %response.updated_invoice_summary.status,
                    balance_due = %response.updated_invoice_summary.balance_due,
                    "settlement applied"
                );
                Ok(response)
            }
            Err(e) => {
                self.reconciler.record_failure(e.message())?;
                warn!(
                    %invoice_id,
                    code = e.error_code(),
                    error = %e,
                    "settlement rejected"
                );
                Err(SessionError::Submission(e))
            }
        }
    }

    /// Discards the open settlement.
    pub async fn cancel(&mut self) -> Result<(), SessionError> {
        self.reconciler.cancel()?;
        self.search_results = Arc::new(Vec::new());
        self.resume_refresh().await;
        Ok(())
    }

    async fn resume_refresh(&mut self) {
        if self.refresh_suspended {
            self.hooks.resume_auto_refresh().await;
            self.refresh_suspended = false;
        }
    }
}

impl std::fmt::Debug for SettlementSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementSession")
            .field("ctx", &self.ctx)
            .field("state", &self.reconciler.state())
            .field("search_sequence", &self.search_sequence)
            .finish_non_exhaustive()
    }
}
