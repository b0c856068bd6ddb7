//! Property-based tests for return valuation.

use proptest::prelude::*;
use rust_decimal::Decimal;
use stockflow_shared::types::{BatchId, InvoiceId, ProductId, round_money};

use super::engine::{ReturnValuationEngine, ValuationInput};
use super::policy::{QualityDeductionPolicy, QualityRule};
use crate::batch::{BatchInfo, QualityStatus};

/// Strategy for unit prices from 0.01 to 100,000.00.
fn unit_price() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy for margins from 0.00% to 99.99%.
fn margin() -> impl Strategy<Value = Decimal> {
    (0i64..10_000i64).prop_map(|basis| Decimal::new(basis, 2))
}

fn quality_strategy() -> impl Strategy<Value = QualityStatus> {
    prop_oneof![
        Just(QualityStatus::Good),
        Just(QualityStatus::Defective),
        Just(QualityStatus::Expired),
        Just(QualityStatus::Damaged),
    ]
}

fn make_batch(price: Decimal, sold: u32, returned: u32, quality: QualityStatus) -> BatchInfo {
    BatchInfo {
        batch_id: BatchId::new(1),
        batch_number: "B-1".to_string(),
        product_id: ProductId::new(1),
        product_name: "Product".to_string(),
        unit_price: price,
        unit_cost: price,
        sold_quantity: sold,
        already_returned: returned,
        max_returnable_quantity: sold.saturating_sub(returned),
        quality_status: quality,
        can_return: true,
    }
}

fn engine() -> ReturnValuationEngine {
    ReturnValuationEngine::new(
        Decimal::ZERO,
        QualityDeductionPolicy::new()
            .with_rule(QualityStatus::Damaged, QualityRule::Deduct(Decimal::new(30, 0)))
            .unwrap()
            .with_rule(QualityStatus::Defective, QualityRule::Deduct(Decimal::new(125, 1)))
            .unwrap(),
    )
    .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// total = round(price * (1 - margin/100) * quantity, 2) for GOOD stock.
    #[test]
    fn prop_good_stock_formula(
        price in unit_price(),
        margin in margin(),
        quantity in 1u32..1_000,
    ) {
        let batch = make_batch(price, 1_000, 0, QualityStatus::Good);
        let calc = engine()
            .calculate(ValuationInput {
                invoice_id: InvoiceId::new(1),
                batch: &batch,
                quantity,
                shop_margin: Some(margin),
                pending_quantity: 0,
            })
            .unwrap();

        let expected = round_money(
            price * (Decimal::ONE - margin / Decimal::ONE_HUNDRED) * Decimal::from(quantity),
        );
        prop_assert_eq!(calc.total_return_amount, expected);
        prop_assert_eq!(calc.quality_deduction, Decimal::ZERO);
    }

    /// Deductions never make a return worth more than its gross value or
    /// less than zero.
    #[test]
    fn prop_deduction_bounded(
        price in unit_price(),
        margin in margin(),
        quantity in 1u32..1_000,
        quality in quality_strategy(),
    ) {
        let batch = make_batch(price, 1_000, 0, quality);
        let calc = engine()
            .calculate(ValuationInput {
                invoice_id: InvoiceId::new(1),
                batch: &batch,
                quantity,
                shop_margin: Some(margin),
                pending_quantity: 0,
            })
            .unwrap();

        prop_assert!(calc.total_return_amount <= calc.gross_return_amount);
        prop_assert!(calc.total_return_amount >= Decimal::ZERO);
        prop_assert_eq!(
            calc.gross_return_amount - calc.quality_deduction,
            calc.total_return_amount
        );
    }

    /// calculation_valid is false exactly when the quantity is zero or over
    /// the re-derived maximum.
    #[test]
    fn prop_validity_follows_quantity(
        sold in 0u32..200,
        returned in 0u32..200,
        pending in 0u32..50,
        quantity in 0u32..300,
    ) {
        let batch = make_batch(Decimal::new(1000, 2), sold, returned, QualityStatus::Good);
        let calc = engine()
            .calculate(ValuationInput {
                invoice_id: InvoiceId::new(1),
                batch: &batch,
                quantity,
                shop_margin: None,
                pending_quantity: pending,
            })
            .unwrap();

        let max = sold.saturating_sub(returned).saturating_sub(pending);
        prop_assert_eq!(calc.max_returnable_quantity, max);
        prop_assert_eq!(calc.calculation_valid, quantity >= 1 && quantity <= max);
    }

    /// Same inputs, same calculation.
    #[test]
    fn prop_idempotent(
        price in unit_price(),
        margin in proptest::option::of(margin()),
        quantity in 0u32..100,
        quality in quality_strategy(),
    ) {
        let batch = make_batch(price, 50, 10, quality);
        let engine = engine();
        let input = ValuationInput {
            invoice_id: InvoiceId::new(9),
            batch: &batch,
            quantity,
            shop_margin: margin,
            pending_quantity: 3,
        };

        let first = engine.calculate(input).unwrap();
        let second = engine.calculate(input).unwrap();
        prop_assert_eq!(first, second);
    }
}
