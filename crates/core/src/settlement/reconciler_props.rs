//! Property-based tests for settlement reconciliation.

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::HashMap;
use stockflow_shared::types::{BatchId, InvoiceId, MINOR_UNIT, ProductId, ShopId};

use super::form::SettlementForm;
use super::reconciler::SettlementReconciler;
use crate::batch::{BatchInfo, BatchLedger, QualityStatus};
use crate::invoice::{Invoice, InvoiceStatus};
use crate::payment::{PaymentEntry, PaymentValidator};
use crate::valuation::{QualityDeductionPolicy, ReturnValuationEngine};

fn make_batch(id: i64, price_cents: i64, sold: u32, returned: u32) -> BatchInfo {
    BatchInfo {
        batch_id: BatchId::new(id),
        batch_number: format!("B-{id}"),
        product_id: ProductId::new(id),
        product_name: format!("Product {id}"),
        unit_price: Decimal::new(price_cents, 2),
        unit_cost: Decimal::new(price_cents, 2),
        sold_quantity: sold,
        already_returned: returned,
        max_returnable_quantity: sold.saturating_sub(returned),
        quality_status: QualityStatus::Good,
        can_return: true,
    }
}

fn make_form(balance_cents: i64, margin_basis: i64, batches: Vec<BatchInfo>) -> SettlementForm {
    let balance = Decimal::new(balance_cents, 2);
    let invoice = Invoice {
        id: InvoiceId::new(1),
        invoice_number: "INV-1".to_string(),
        shop_id: ShopId::new(1),
        shop_name: None,
        net_total: balance,
        paid_amount: Decimal::ZERO,
        balance_due: balance,
        status: InvoiceStatus::Pending,
        invoice_date: None,
        due_date: None,
    };
    let engine = ReturnValuationEngine::new(Decimal::ZERO, QualityDeductionPolicy::new()).unwrap();
    SettlementForm::new(
        invoice,
        BatchLedger::new(InvoiceId::new(1), batches),
        engine,
        Some(Decimal::new(margin_basis, 2)),
    )
    .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Any payload the reconciler lets through applies at most the balance
    /// due (within one minor unit) and never claims more units of a batch
    /// than it has left.
    #[test]
    fn prop_accepted_payload_within_limits(
        balance_cents in 1i64..500_000,
        margin_basis in 0i64..5_000,
        sold in proptest::collection::vec((1u32..20, 0u32..20, 1i64..50_000), 1..4),
        returns in proptest::collection::vec((0usize..4, 0u32..25), 0..6),
        extra_payments in proptest::collection::vec(-1_000i64..100_000, 0..3),
    ) {
        let batches: Vec<BatchInfo> = sold
            .iter()
            .enumerate()
            .map(|(i, (s, r, price))| make_batch(i as i64 + 1, *price, *s, *r))
            .collect();
        let limits: HashMap<BatchId, u32> = batches
            .iter()
            .map(|b| (b.batch_id, b.returnable_quantity()))
            .collect();

        let mut form = make_form(balance_cents, margin_basis, batches.clone());
        for cents in &extra_payments {
            form.add_payment(PaymentEntry::cash(Decimal::new(*cents, 2)));
        }
        for (index, quantity) in &returns {
            let batch = &batches[index % batches.len()];
            form.add_return(batch.batch_id, *quantity, None).unwrap();
        }

        let balance = form.invoice().balance_due;
        let mut reconciler = SettlementReconciler::new(PaymentValidator::new());
        reconciler.open(form).unwrap();

        if let Ok(payload) = reconciler.prepare_submission() {
            prop_assert!(payload.total() - balance < MINOR_UNIT);
            prop_assert!(payload.total() > Decimal::ZERO);
            prop_assert!(payload.payments().iter().all(|p| p.amount > Decimal::ZERO));

            let mut claimed: HashMap<BatchId, u32> = HashMap::new();
            for line in payload.returns() {
                *claimed.entry(line.batch_id).or_insert(0) += line.quantity;
            }
            for (batch_id, quantity) in claimed {
                prop_assert!(quantity <= limits[&batch_id]);
            }
        }
    }

    /// Totals always equal payments plus valid returns, and the remaining
    /// balance is what they leave of the balance due.
    #[test]
    fn prop_totals_consistent(
        balance_cents in 1i64..500_000,
        quantities in proptest::collection::vec(0u32..8, 0..5),
    ) {
        let mut form = make_form(balance_cents, 1_000, vec![make_batch(1, 2_500, 10, 2)]);
        for quantity in &quantities {
            form.add_return(BatchId::new(1), *quantity, None).unwrap();
        }
        let totals = form.recalculate();
        let returns: Decimal = form.returns().values().map(|r| r.return_amount()).sum();

        prop_assert_eq!(totals.returns, returns);
        prop_assert_eq!(totals.total_settlement, totals.payments + totals.returns);
        prop_assert_eq!(
            totals.remaining_balance,
            form.invoice().balance_due - totals.total_settlement
        );
        let granted: u32 = form
            .returns()
            .values()
            .filter(|r| r.is_valid())
            .map(|r| r.quantity())
            .sum();
        prop_assert!(granted <= 8);
    }
}
