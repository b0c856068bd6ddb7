//! Property-based tests for the in-session batch ledger.

use proptest::prelude::*;
use rust_decimal::Decimal;
use stockflow_shared::types::{BatchId, InvoiceId, ProductId};

use super::ledger::BatchLedger;
use super::types::{BatchInfo, QualityStatus};

fn make_batch(id: i64, sold: u32, returned: u32) -> BatchInfo {
    BatchInfo {
        batch_id: BatchId::new(id),
        batch_number: format!("B-{id}"),
        product_id: ProductId::new(id),
        product_name: format!("Product {id}"),
        unit_price: Decimal::new(10000, 2),
        unit_cost: Decimal::new(7500, 2),
        sold_quantity: sold,
        already_returned: returned,
        max_returnable_quantity: sold.saturating_sub(returned),
        quality_status: QualityStatus::Good,
        can_return: true,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Returnable quantity equals sold minus returned and never goes negative.
    #[test]
    fn prop_returnable_is_sold_minus_returned(sold in 0u32..10_000, returned in 0u32..10_000) {
        let batch = make_batch(1, sold, returned);
        let expected = if returned > sold { 0 } else { sold - returned };
        prop_assert_eq!(batch.returnable_quantity(), expected);
    }

    /// Units granted to valid claims on a batch never exceed its returnable units.
    #[test]
    fn prop_granted_claims_never_exceed_returnable(
        sold in 0u32..50,
        returned in 0u32..50,
        claims in proptest::collection::vec((1i64..4, 0u32..30), 0..12),
    ) {
        let ledger = BatchLedger::new(
            InvoiceId::new(1),
            vec![make_batch(1, sold, returned), make_batch(2, sold, 0), make_batch(3, 5, 5)],
        );

        let allocations = ledger.allocate(
            claims.iter().enumerate().map(|(i, (batch, qty))| (i, BatchId::new(*batch), *qty)),
        );

        for batch_id in [1i64, 2, 3] {
            let batch_id = BatchId::new(batch_id);
            let granted: u32 = allocations
                .iter()
                .filter(|(_, a)| a.batch_id == batch_id && a.is_within_limit())
                .map(|(_, a)| a.requested)
                .sum();
            prop_assert!(granted <= ledger.returnable(batch_id));
        }
    }

    /// A single claim of exactly the remaining units is valid, one more is not.
    #[test]
    fn prop_claim_at_boundary(sold in 1u32..500, returned in 0u32..500) {
        prop_assume!(returned < sold);
        let ledger = BatchLedger::new(InvoiceId::new(1), vec![make_batch(1, sold, returned)]);
        let max = sold - returned;

        let exact = ledger.allocate([((), BatchId::new(1), max)]);
        prop_assert!(exact[0].1.is_within_limit());

        let over = ledger.allocate([((), BatchId::new(1), max + 1)]);
        prop_assert!(!over[0].1.is_within_limit());
    }
}
