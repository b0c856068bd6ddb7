//! Settlement reconciler state machine.
//!
//! Binds the form to the submission lifecycle. The reconciler never talks
//! to the service itself: it hands out one validated payload and is told
//! how the submission ended.

use rust_decimal::Decimal;
use stockflow_shared::types::{exceeds_by_minor_unit, is_settled};
use uuid::Uuid;

use super::error::SettlementError;
use super::form::SettlementForm;
use super::payload::{
    PaymentLine, ReturnLine, SettlePaymentsOnlyRequest, SettleWithReturnsRequest,
    SettlementPayload, SettlementResponse, compose_notes,
};
use super::types::SettlementState;
use crate::payment::{PaymentEntry, PaymentIssue, PaymentValidator};

/// Drives one settlement at a time through its lifecycle.
#[derive(Debug, Clone)]
pub struct SettlementReconciler {
    state: SettlementState,
    validator: PaymentValidator,
    form: Option<SettlementForm>,
    request_key: Option<(u64, Uuid)>,
    last_failure: Option<String>,
    outcome: Option<SettlementResponse>,
}

impl SettlementReconciler {
    /// Creates an idle reconciler.
    #[must_use]
    pub fn new(validator: PaymentValidator) -> Self {
        Self {
            state: SettlementState::Idle,
            validator,
            form: None,
            request_key: None,
            last_failure: None,
            outcome: None,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SettlementState {
        self.state
    }

    /// The open form, if any.
    #[must_use]
    pub fn form(&self) -> Option<&SettlementForm> {
        self.form.as_ref()
    }

    /// The service's rejection reason from the last failed submission.
    #[must_use]
    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }

    /// The service's answer to the last successful submission.
    #[must_use]
    pub fn outcome(&self) -> Option<&SettlementResponse> {
        self.outcome.as_ref()
    }

    /// Opens a settlement (Idle or Settled → Editing).
    ///
    /// # Errors
    ///
    /// Returns an error if another settlement is open, or if the invoice is
    /// not in a settleable status or has nothing outstanding.
    pub fn open(&mut self, form: SettlementForm) -> Result<(), SettlementError> {
        if !matches!(self.state, SettlementState::Idle | SettlementState::Settled) {
            return Err(self.invalid("open a settlement"));
        }
        let invoice = form.invoice();
        if !invoice.status.is_settleable() {
            return Err(SettlementError::InvoiceNotSettleable {
                invoice_number: invoice.invoice_number.clone(),
                status: invoice.status,
            });
        }
        if !invoice.is_outstanding() {
            return Err(SettlementError::NothingOutstanding(
                invoice.invoice_number.clone(),
            ));
        }

        self.form = Some(form);
        self.request_key = None;
        self.last_failure = None;
        self.outcome = None;
        self.state = SettlementState::Editing;
        Ok(())
    }

    /// Gives mutable access to the form (Failed → Editing).
    ///
    /// # Errors
    ///
    /// Returns an error unless the settlement is editing or failed.
    pub fn form_mut(&mut self) -> Result<&mut SettlementForm, SettlementError> {
        if !self.state.is_editable() {
            return Err(self.invalid("edit the form"));
        }
        self.state = SettlementState::Editing;
        self.form
            .as_mut()
            .ok_or(SettlementError::InvalidState {
                state: SettlementState::Idle,
                action: "edit the form",
            })
    }

    /// Validates the form and builds the request to submit
    /// (Editing → Validating → Submitting).
    ///
    /// On a validation failure the state returns to Editing and nothing is
    /// sent. The request ID is kept across attempts as long as the form is
    /// unchanged, so a resubmission after a lost response is recognised by
    /// the service.
    pub fn prepare_submission(&mut self) -> Result<SettlementPayload, SettlementError> {
        if !self.state.is_editable() {
            return Err(self.invalid("submit"));
        }
        self.state = SettlementState::Validating;

        match self.build_payload() {
            Ok(payload) => {
                self.state = SettlementState::Submitting;
                Ok(payload)
            }
            Err(e) => {
                self.state = SettlementState::Editing;
                Err(e)
            }
        }
    }

    /// Records a successful submission (Submitting → Settled). The form is
    /// discarded.
    pub fn record_success(&mut self, response: SettlementResponse) -> Result<(), SettlementError> {
        if self.state != SettlementState::Submitting {
            return Err(self.invalid("record a settlement"));
        }
        self.form = None;
        self.request_key = None;
        self.last_failure = None;
        self.outcome = Some(response);
        self.state = SettlementState::Settled;
        Ok(())
    }

    /// Records a rejected submission (Submitting → Failed). The form is
    /// kept and the reason is stored verbatim.
    pub fn record_failure(&mut self, reason: impl Into<String>) -> Result<(), SettlementError> {
        if self.state != SettlementState::Submitting {
            return Err(self.invalid("record a failure"));
        }
        self.last_failure = Some(reason.into());
        self.state = SettlementState::Failed;
        Ok(())
    }

    /// Discards the open settlement (→ Idle). Not allowed while submitting.
    pub fn cancel(&mut self) -> Result<(), SettlementError> {
        if matches!(
            self.state,
            SettlementState::Validating | SettlementState::Submitting
        ) {
            return Err(self.invalid("cancel"));
        }
        self.form = None;
        self.request_key = None;
        self.last_failure = None;
        self.state = SettlementState::Idle;
        Ok(())
    }

    fn build_payload(&mut self) -> Result<SettlementPayload, SettlementError> {
        let validator = self.validator;
        let form = self.form.as_mut().ok_or(SettlementError::InvalidState {
            state: SettlementState::Idle,
            action: "submit",
        })?;
        let totals = form.recalculate();
        let balance_due = form.invoice().balance_due;

        if totals.total_settlement <= Decimal::ZERO {
            return Err(SettlementError::NothingToSettle {
                total: totals.total_settlement,
            });
        }
        if exceeds_by_minor_unit(totals.total_settlement, balance_due) {
            return Err(SettlementError::ExceedsBalance {
                total: totals.total_settlement,
                balance_due,
            });
        }

        // A balanced form carries no meaning in a zero row; returns alone
        // covering the balance leave the prefilled payment at zero.
        let balanced = is_settled(totals.remaining_balance);
        let entries: Vec<&PaymentEntry> = form
            .payments()
            .values()
            .filter(|entry| !(balanced && entry.amount == Some(Decimal::ZERO)))
            .collect();

        let validation = validator.validate(entries.iter().copied());
        if !validation.is_valid() {
            return Err(SettlementError::InvalidPayments(validation.errors));
        }

        let invalid_returns = form.invalid_returns();
        if !invalid_returns.is_empty() {
            return Err(SettlementError::InvalidReturns(invalid_returns));
        }

        let payments: Vec<PaymentLine> = entries
            .iter()
            .copied()
            .filter_map(PaymentLine::from_entry)
            .collect();
        let returns: Vec<ReturnLine> = form
            .returns()
            .values()
            .map(|row| ReturnLine {
                batch_id: row.batch_id(),
                product_id: row.product_id(),
                quantity: row.quantity(),
                reason: row.reason(),
                return_amount: row.return_amount(),
                notes: row.notes().map(ToString::to_string),
            })
            .collect();
        let notes = compose_notes(form.notes(), validation.warnings.iter().map(PaymentIssue::to_string));
        let invoice_id = form.invoice().id;
        let revision = form.revision();

        let request_id = match self.request_key {
            Some((seen, id)) if seen == revision => id,
            _ => {
                let id = Uuid::now_v7();
                self.request_key = Some((revision, id));
                id
            }
        };

        Ok(if returns.is_empty() {
            SettlementPayload::PaymentsOnly(SettlePaymentsOnlyRequest {
                request_id,
                invoice_id,
                payments,
                notes,
            })
        } else {
            SettlementPayload::WithReturns(SettleWithReturnsRequest {
                request_id,
                invoice_id,
                payments,
                returns,
                settlement_notes: notes,
            })
        })
    }

    fn invalid(&self, action: &'static str) -> SettlementError {
        SettlementError::InvalidState {
            state: self.state,
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{BatchInfo, BatchLedger, QualityStatus};
    use crate::invoice::{Invoice, InvoiceStatus, InvoiceSummary};
    use crate::payment::PaymentEntry;
    use crate::valuation::{QualityDeductionPolicy, ReturnValuationEngine};
    use rust_decimal_macros::dec;
    use stockflow_shared::types::{BatchId, InvoiceId, ProductId, SettlementId, ShopId};

    fn make_invoice(balance: Decimal, status: InvoiceStatus) -> Invoice {
        Invoice {
            id: InvoiceId::new(5),
            invoice_number: "INV-0005".to_string(),
            shop_id: ShopId::new(2),
            shop_name: Some("Lakeside Mart".to_string()),
            net_total: balance,
            paid_amount: Decimal::ZERO,
            balance_due: balance,
            status,
            invoice_date: None,
            due_date: None,
        }
    }

    fn make_form(balance: Decimal, status: InvoiceStatus) -> SettlementForm {
        let batch = BatchInfo {
            batch_id: BatchId::new(1),
            batch_number: "B-001".to_string(),
            product_id: ProductId::new(11),
            product_name: "Rice 5kg".to_string(),
            unit_price: dec!(100.00),
            unit_cost: dec!(70.00),
            sold_quantity: 4,
            already_returned: 1,
            max_returnable_quantity: 3,
            quality_status: QualityStatus::Good,
            can_return: true,
        };
        let engine = ReturnValuationEngine::new(Decimal::ZERO, QualityDeductionPolicy::new()).unwrap();
        SettlementForm::new(
            make_invoice(balance, status),
            BatchLedger::new(InvoiceId::new(5), vec![batch]),
            engine,
            Some(dec!(20)),
        )
        .unwrap()
    }

    fn open(balance: Decimal) -> SettlementReconciler {
        let mut reconciler = SettlementReconciler::new(PaymentValidator::new());
        reconciler
            .open(make_form(balance, InvoiceStatus::Pending))
            .unwrap();
        reconciler
    }

    fn response(balance: Decimal) -> SettlementResponse {
        SettlementResponse {
            settlement_id: SettlementId::new(1),
            updated_invoice_summary: InvoiceSummary {
                id: InvoiceId::new(5),
                invoice_number: "INV-0005".to_string(),
                net_total: dec!(1000.00),
                paid_amount: dec!(1000.00) - balance,
                balance_due: balance,
                status: InvoiceStatus::Paid,
            },
            message: "Settlement recorded".to_string(),
        }
    }

    #[test]
    fn test_full_cash_settlement() {
        let mut reconciler = open(dec!(1000.00));
        assert_eq!(reconciler.state(), SettlementState::Editing);

        let payload = reconciler.prepare_submission().unwrap();
        assert_eq!(reconciler.state(), SettlementState::Submitting);
        assert!(matches!(payload, SettlementPayload::PaymentsOnly(_)));
        assert_eq!(payload.total(), dec!(1000.00));

        reconciler.record_success(response(Decimal::ZERO)).unwrap();
        assert_eq!(reconciler.state(), SettlementState::Settled);
        assert!(reconciler.form().is_none());
        assert!(reconciler.outcome().is_some());
    }

    #[test]
    fn test_with_returns_payload() {
        let mut reconciler = open(dec!(500.00));
        reconciler
            .form_mut()
            .unwrap()
            .add_return(BatchId::new(1), 2, None)
            .unwrap();

        let payload = reconciler.prepare_submission().unwrap();
        let SettlementPayload::WithReturns(request) = &payload else {
            panic!("expected a settlement with returns");
        };
        assert_eq!(request.returns[0].return_amount, dec!(160.00));
        assert_eq!(request.payments[0].amount, dec!(340.00));
        assert_eq!(payload.total(), dec!(500.00));
    }

    #[test]
    fn test_rejects_over_balance() {
        let mut reconciler = open(dec!(500.00));
        reconciler
            .form_mut()
            .unwrap()
            .add_payment(PaymentEntry::cash(dec!(0.01)));

        let err = reconciler.prepare_submission().unwrap_err();
        assert_eq!(err.error_code(), "EXCEEDS_BALANCE");
        assert_eq!(reconciler.state(), SettlementState::Editing);
    }

    #[test]
    fn test_sub_minor_unit_payment_rejected() {
        let mut reconciler = open(dec!(500.00));
        let form = reconciler.form_mut().unwrap();
        let (first, _) = form.payments().first().unwrap();
        form.update_payment(first, PaymentEntry::cash(dec!(500.004))).unwrap();

        let err = reconciler.prepare_submission().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PAYMENTS");
        assert!(err.to_string().contains("more than 2 decimal places"));
        assert_eq!(reconciler.state(), SettlementState::Editing);
    }

    #[test]
    fn test_returns_covering_balance_drop_zero_payment() {
        let mut reconciler = open(dec!(160.00));
        reconciler
            .form_mut()
            .unwrap()
            .add_return(BatchId::new(1), 2, None)
            .unwrap();
        let form = reconciler.form().unwrap();
        assert_eq!(form.payments().first().unwrap().1.amount, Some(Decimal::ZERO));

        let payload = reconciler.prepare_submission().unwrap();
        let SettlementPayload::WithReturns(request) = &payload else {
            panic!("expected a settlement with returns");
        };
        assert!(request.payments.is_empty());
        assert_eq!(payload.total(), dec!(160.00));
    }

    #[test]
    fn test_zero_payment_blocks_unbalanced_form() {
        let mut reconciler = open(dec!(500.00));
        let form = reconciler.form_mut().unwrap();
        let (first, _) = form.payments().first().unwrap();
        form.update_payment(first, PaymentEntry::cash(dec!(300.00))).unwrap();
        form.add_payment(PaymentEntry::cash(Decimal::ZERO));

        let err = reconciler.prepare_submission().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PAYMENTS");
    }

    #[test]
    fn test_rejects_nothing_to_settle() {
        let mut reconciler = open(dec!(500.00));
        let form = reconciler.form_mut().unwrap();
        let (first, _) = form.payments().first().unwrap();
        form.remove_payment(first).unwrap();

        let err = reconciler.prepare_submission().unwrap_err();
        assert_eq!(err, SettlementError::NothingToSettle { total: Decimal::ZERO });
    }

    #[test]
    fn test_rejects_invalid_payment() {
        let mut reconciler = open(dec!(500.00));
        let form = reconciler.form_mut().unwrap();
        let (first, _) = form.payments().first().unwrap();
        form.update_payment(first, PaymentEntry::cash(dec!(400.00))).unwrap();
        form.add_payment(PaymentEntry::cash(dec!(-10.00)));

        let err = reconciler.prepare_submission().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PAYMENTS");
    }

    #[test]
    fn test_rejects_invalid_return_without_request() {
        let mut reconciler = open(dec!(1000.00));
        reconciler
            .form_mut()
            .unwrap()
            .add_return(BatchId::new(1), 4, None)
            .unwrap();

        let err = reconciler.prepare_submission().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_RETURNS");
        assert!(err.to_string().contains("only 3 can be returned"));
        assert_eq!(reconciler.state(), SettlementState::Editing);
    }

    #[test]
    fn test_warnings_go_into_notes() {
        let mut reconciler = open(dec!(500.00));
        let form = reconciler.form_mut().unwrap();
        let (first, _) = form.payments().first().unwrap();
        form.update_payment(first, PaymentEntry::cash(dec!(200.00))).unwrap();
        let mut cheque = PaymentEntry::cheque(dec!(300.00), "", None);
        cheque.reference_number = None;
        form.add_payment(cheque);
        form.set_notes("Collected on route 4");

        let payload = reconciler.prepare_submission().unwrap();
        assert_eq!(
            payload.notes(),
            "Collected on route 4\n\
             Warning: Payment 2: Cheque payment has no reference number\n\
             Warning: Payment 2: cheque has no cheque date"
        );
    }

    #[test]
    fn test_strict_reference_numbers() {
        let mut reconciler = SettlementReconciler::new(PaymentValidator::strict());
        reconciler
            .open(make_form(dec!(500.00), InvoiceStatus::Partial))
            .unwrap();
        let form = reconciler.form_mut().unwrap();
        let (first, _) = form.payments().first().unwrap();
        let mut transfer = PaymentEntry::bank_transfer(dec!(500.00), "", "City Bank");
        transfer.reference_number = None;
        form.update_payment(first, transfer).unwrap();

        assert_eq!(
            reconciler.prepare_submission().unwrap_err().error_code(),
            "INVALID_PAYMENTS"
        );
    }

    #[test]
    fn test_failure_keeps_form_and_request_id() {
        let mut reconciler = open(dec!(1000.00));
        let first = reconciler.prepare_submission().unwrap();
        reconciler.record_failure("Invoice balance changed").unwrap();

        assert_eq!(reconciler.state(), SettlementState::Failed);
        assert_eq!(reconciler.last_failure(), Some("Invoice balance changed"));
        assert!(reconciler.form().is_some());

        let retry = reconciler.prepare_submission().unwrap();
        assert_eq!(retry.request_id(), first.request_id());
    }

    #[test]
    fn test_form_change_regenerates_request_id() {
        let mut reconciler = open(dec!(1000.00));
        let first = reconciler.prepare_submission().unwrap();
        reconciler.record_failure("rejected").unwrap();

        reconciler.form_mut().unwrap().set_notes("second attempt");
        assert_eq!(reconciler.state(), SettlementState::Editing);
        let retry = reconciler.prepare_submission().unwrap();
        assert_ne!(retry.request_id(), first.request_id());
    }

    #[test]
    fn test_cannot_edit_while_submitting() {
        let mut reconciler = open(dec!(1000.00));
        reconciler.prepare_submission().unwrap();
        assert!(matches!(
            reconciler.form_mut(),
            Err(SettlementError::InvalidState { .. })
        ));
        assert!(reconciler.cancel().is_err());
    }

    #[test]
    fn test_cancel_discards_form() {
        let mut reconciler = open(dec!(1000.00));
        reconciler.cancel().unwrap();
        assert_eq!(reconciler.state(), SettlementState::Idle);
        assert!(reconciler.form().is_none());
    }

    #[test]
    fn test_open_rejects_unsettleable_invoice() {
        let mut reconciler = SettlementReconciler::new(PaymentValidator::new());
        let err = reconciler
            .open(make_form(dec!(1000.00), InvoiceStatus::Paid))
            .unwrap_err();
        assert_eq!(err.error_code(), "INVOICE_NOT_SETTLEABLE");

        let err = reconciler
            .open(make_form(Decimal::ZERO, InvoiceStatus::Pending))
            .unwrap_err();
        assert_eq!(err.error_code(), "NOTHING_OUTSTANDING");
        assert_eq!(reconciler.state(), SettlementState::Idle);
    }

    #[test]
    fn test_open_twice_rejected() {
        let mut reconciler = open(dec!(1000.00));
        assert!(
            reconciler
                .open(make_form(dec!(1000.00), InvoiceStatus::Pending))
                .is_err()
        );
    }

    #[test]
    fn test_record_without_submission_rejected() {
        let mut reconciler = open(dec!(1000.00));
        assert!(reconciler.record_failure("x").is_err());
        assert!(reconciler.record_success(response(Decimal::ZERO)).is_err());
    }
}
