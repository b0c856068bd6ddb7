//! The in-progress settlement form.
//!
//! Holds payment and return rows for one invoice and keeps the derived
//! totals current. Every mutation ends in an explicit [`SettlementForm::recalculate`];
//! return mutations also re-target the first payment so the form stays
//! balanced.

use rust_decimal::Decimal;
use stockflow_shared::types::BatchId;

use super::arena::{RowArena, RowHandle};
use super::error::{ReturnIssue, SettlementError};
use super::types::{
    CalculationOutcome, CalculationSource, CalculationTicket, ReturnReason, ReturnRow,
    SettlementTotals,
};
use crate::batch::{BatchLedger, BatchSearchResult};
use crate::invoice::Invoice;
use crate::payment::{PaymentEntry, total_payments};
use crate::valuation::{ReturnCalculation, ReturnValuationEngine, ShopMargin, ValuationInput};

/// Payments, returns and derived totals of one settlement.
#[derive(Debug, Clone)]
pub struct SettlementForm {
    invoice: Invoice,
    ledger: BatchLedger,
    engine: ReturnValuationEngine,
    shop_margin: Option<Decimal>,
    payments: RowArena<PaymentEntry>,
    returns: RowArena<ReturnRow>,
    notes: String,
    totals: SettlementTotals,
    revision: u64,
}

impl SettlementForm {
    /// Creates a form pre-filled with one cash payment of the full balance.
    ///
    /// # Errors
    ///
    /// Returns an error if the shop margin is out of range.
    pub fn new(
        invoice: Invoice,
        ledger: BatchLedger,
        engine: ReturnValuationEngine,
        shop_margin: Option<Decimal>,
    ) -> Result<Self, SettlementError> {
        ShopMargin::resolve(shop_margin, engine.default_margin())?;

        let mut payments = RowArena::new();
        payments.insert(PaymentEntry::cash(invoice.balance_due));

        let mut form = Self {
            invoice,
            ledger,
            engine,
            shop_margin,
            payments,
            returns: RowArena::new(),
            notes: String::new(),
            totals: SettlementTotals::default(),
            revision: 0,
        };
        form.recalculate();
        Ok(form)
    }

    /// The invoice snapshot taken when the form was opened.
    #[must_use]
    pub fn invoice(&self) -> &Invoice {
        &self.invoice
    }

    /// The batch snapshot of the invoice.
    #[must_use]
    pub fn ledger(&self) -> &BatchLedger {
        &self.ledger
    }

    /// Payment rows.
    #[must_use]
    pub fn payments(&self) -> &RowArena<PaymentEntry> {
        &self.payments
    }

    /// Return rows.
    #[must_use]
    pub fn returns(&self) -> &RowArena<ReturnRow> {
        &self.returns
    }

    /// The operator's settlement notes.
    #[must_use]
    pub fn notes(&self) -> &str {
        &self.notes
    }

    /// Current totals.
    #[must_use]
    pub fn totals(&self) -> SettlementTotals {
        self.totals
    }

    /// Counts mutations; changes whenever anything submitted would change.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Replaces the settlement notes.
    pub fn set_notes(&mut self, notes: impl Into<String>) {
        self.notes = notes.into();
        self.touch();
    }

    /// Adds a payment row.
    pub fn add_payment(&mut self, entry: PaymentEntry) -> RowHandle {
        let handle = self.payments.insert(entry);
        self.touch();
        self.recalculate();
        handle
    }

    /// Replaces a payment row.
    pub fn update_payment(
        &mut self,
        handle: RowHandle,
        entry: PaymentEntry,
    ) -> Result<(), SettlementError> {
        let row = self
            .payments
            .get_mut(handle)
            .ok_or(SettlementError::UnknownRow(handle))?;
        *row = entry;
        self.touch();
        self.recalculate();
        Ok(())
    }

    /// Removes a payment row.
    pub fn remove_payment(&mut self, handle: RowHandle) -> Result<PaymentEntry, SettlementError> {
        let entry = self
            .payments
            .remove(handle)
            .ok_or(SettlementError::UnknownRow(handle))?;
        self.touch();
        self.recalculate();
        Ok(entry)
    }

    /// Adds a return of a batch on the invoice.
    ///
    /// The row is valued locally at once; a service valuation can replace
    /// the estimate through [`Self::apply_calculation`].
    pub fn add_return(
        &mut self,
        batch_id: BatchId,
        quantity: u32,
        reason: Option<ReturnReason>,
    ) -> Result<RowHandle, SettlementError> {
        let batch = self
            .ledger
            .get(batch_id)
            .ok_or(SettlementError::UnknownBatch(batch_id))?;
        let quote = self.estimate(batch_id, quantity)?;
        let reason = reason.unwrap_or_else(|| ReturnReason::for_quality(batch.quality_status));
        let row = ReturnRow::new(batch, quantity, reason, quote);

        let handle = self.returns.insert(row);
        self.after_return_change();
        Ok(handle)
    }

    /// Adds a return seeded from a search result.
    ///
    /// Only results carrying a returnable line on this invoice qualify.
    pub fn add_return_from_search(
        &mut self,
        result: &BatchSearchResult,
        quantity: u32,
        reason: Option<ReturnReason>,
    ) -> Result<RowHandle, SettlementError> {
        let line = result
            .invoice_line
            .as_ref()
            .filter(|_| result.is_returnable_on_invoice())
            .ok_or_else(|| SettlementError::BatchNotReturnable(result.batch_number.clone()))?;
        self.ledger.upsert(line.clone());
        self.add_return(result.batch_id, quantity, reason)
    }

    /// Changes the quantity of a return row.
    pub fn set_return_quantity(
        &mut self,
        handle: RowHandle,
        quantity: u32,
    ) -> Result<(), SettlementError> {
        let batch_id = self.return_row(handle)?.batch_id;
        let quote = self.estimate(batch_id, quantity)?;
        if let Some(row) = self.returns.get_mut(handle) {
            row.quantity = quantity;
            row.reset_quote(quote);
        }
        self.after_return_change();
        Ok(())
    }

    /// Points a return row at a different batch of the invoice.
    pub fn set_return_batch(
        &mut self,
        handle: RowHandle,
        batch_id: BatchId,
    ) -> Result<(), SettlementError> {
        let quantity = self.return_row(handle)?.quantity;
        let batch = self
            .ledger
            .get(batch_id)
            .ok_or(SettlementError::UnknownBatch(batch_id))?;
        let (product_id, batch_number) = (batch.product_id, batch.batch_number.clone());
        let quote = self.estimate(batch_id, quantity)?;
        if let Some(row) = self.returns.get_mut(handle) {
            row.batch_id = batch_id;
            row.product_id = product_id;
            row.batch_number = batch_number;
            row.reset_quote(quote);
        }
        self.after_return_change();
        Ok(())
    }

    /// Changes the reason code of a return row.
    pub fn set_return_reason(
        &mut self,
        handle: RowHandle,
        reason: ReturnReason,
    ) -> Result<(), SettlementError> {
        let row = self
            .returns
            .get_mut(handle)
            .ok_or(SettlementError::UnknownRow(handle))?;
        row.reason = reason;
        self.touch();
        Ok(())
    }

    /// Changes the notes of a return row.
    pub fn set_return_notes(
        &mut self,
        handle: RowHandle,
        notes: Option<String>,
    ) -> Result<(), SettlementError> {
        let row = self
            .returns
            .get_mut(handle)
            .ok_or(SettlementError::UnknownRow(handle))?;
        row.notes = notes.filter(|n| !n.trim().is_empty());
        self.touch();
        Ok(())
    }

    /// Removes a return row.
    pub fn remove_return(&mut self, handle: RowHandle) -> Result<ReturnRow, SettlementError> {
        let row = self
            .returns
            .remove(handle)
            .ok_or(SettlementError::UnknownRow(handle))?;
        self.after_return_change();
        Ok(row)
    }

    /// Issues a ticket for a service valuation of a row's current state.
    pub fn calculation_ticket(&self, handle: RowHandle) -> Result<CalculationTicket, SettlementError> {
        let row = self.return_row(handle)?;
        Ok(CalculationTicket {
            row: handle,
            generation: row.generation,
            invoice_id: self.invoice.id,
            batch_id: row.batch_id,
            quantity: row.quantity,
        })
    }

    /// Applies a service valuation.
    ///
    /// A response for a row that was removed or changed since the ticket
    /// was issued is discarded.
    pub fn apply_calculation(
        &mut self,
        ticket: CalculationTicket,
        calculation: ReturnCalculation,
    ) -> Result<CalculationOutcome, SettlementError> {
        if !self.is_current(ticket) {
            return Ok(CalculationOutcome::Stale);
        }
        if calculation.batch_id != ticket.batch_id
            || calculation.return_quantity != ticket.quantity
            || calculation.invoice_id != ticket.invoice_id
        {
            return Err(SettlementError::MismatchedCalculation {
                batch_id: calculation.batch_id,
            });
        }

        if let Some(row) = self.returns.get_mut(ticket.row) {
            row.quote = calculation;
            row.source = CalculationSource::Remote;
            row.calculation_error = None;
        }
        self.after_return_change();
        Ok(CalculationOutcome::Applied)
    }

    /// Records that a service valuation failed. The row keeps its local
    /// estimate.
    pub fn record_calculation_failure(
        &mut self,
        ticket: CalculationTicket,
        message: impl Into<String>,
    ) -> CalculationOutcome {
        if !self.is_current(ticket) {
            return CalculationOutcome::Stale;
        }
        if let Some(row) = self.returns.get_mut(ticket.row) {
            row.calculation_error = Some(message.into());
        }
        CalculationOutcome::Applied
    }

    /// Re-derives every return row against earlier rows on the same batch
    /// and recomputes the totals.
    pub fn recalculate(&mut self) -> SettlementTotals {
        let allocations = self.ledger.allocate(self.returns.iter().map(|(handle, row)| {
            let requested = if row.quote.calculation_valid {
                row.quantity
            } else {
                0
            };
            (handle, row.batch_id, requested)
        }));

        for (handle, allocation) in allocations {
            let pending = self
                .ledger
                .returnable(allocation.batch_id)
                .saturating_sub(allocation.available);
            if let Some(row) = self.returns.get_mut(handle) {
                row.calculation = row.quote.clone().constrain_to_session(pending);
            }
        }

        let payments = total_payments(self.payments.values());
        let returns = self.returns.values().map(ReturnRow::return_amount).sum();
        self.totals = SettlementTotals::new(self.invoice.balance_due, payments, returns);
        self.totals
    }

    /// Return rows that cannot be submitted.
    #[must_use]
    pub fn invalid_returns(&self) -> Vec<ReturnIssue> {
        self.returns
            .iter()
            .filter(|(_, row)| !row.is_valid())
            .map(|(handle, row)| ReturnIssue {
                row: handle,
                batch_number: row.batch_number.clone(),
                reason: row
                    .calculation
                    .invalid_reason
                    .clone()
                    .unwrap_or_else(|| "return is not valid".to_string()),
            })
            .collect()
    }

    fn return_row(&self, handle: RowHandle) -> Result<&ReturnRow, SettlementError> {
        self.returns
            .get(handle)
            .ok_or(SettlementError::UnknownRow(handle))
    }

    fn is_current(&self, ticket: CalculationTicket) -> bool {
        self.returns.get(ticket.row).is_some_and(|row| {
            row.generation == ticket.generation
                && row.batch_id == ticket.batch_id
                && row.quantity == ticket.quantity
        }) && ticket.invoice_id == self.invoice.id
    }

    fn estimate(&self, batch_id: BatchId, quantity: u32) -> Result<ReturnCalculation, SettlementError> {
        let batch = self
            .ledger
            .get(batch_id)
            .ok_or(SettlementError::UnknownBatch(batch_id))?;
        let calculation = self.engine.calculate(ValuationInput {
            invoice_id: self.invoice.id,
            batch,
            quantity,
            shop_margin: self.shop_margin,
            pending_quantity: 0,
        })?;
        Ok(calculation)
    }

    fn after_return_change(&mut self) {
        self.touch();
        self.recalculate();
        self.retarget_first_payment();
        self.recalculate();
    }

    /// Sets the first payment to whatever the returns and the other
    /// payments leave of the balance, never below zero.
    fn retarget_first_payment(&mut self) {
        let Some((first, _)) = self.payments.first() else {
            return;
        };
        let others: Decimal = total_payments(
            self.payments
                .iter()
                .filter(|(handle, _)| *handle != first)
                .map(|(_, entry)| entry),
        );
        let target = (self.invoice.balance_due - self.totals.returns - others).max(Decimal::ZERO);
        if let Some(entry) = self.payments.get_mut(first) {
            entry.amount = Some(target);
        }
    }

    fn touch(&mut self) {
        self.revision += 1;
    }
}

impl ReturnRow {
    fn reset_quote(&mut self, quote: ReturnCalculation) {
        self.generation += 1;
        self.calculation = quote.clone();
        self.quote = quote;
        self.source = CalculationSource::Local;
        self.calculation_error = None;
    }
}
