//! Property-based tests for payment validation.

use proptest::prelude::*;
use rust_decimal::Decimal;

use super::types::{PaymentEntry, PaymentMethod};
use super::validation::{IssueKind, PaymentValidator, total_payments};

fn method_strategy() -> impl Strategy<Value = PaymentMethod> {
    prop_oneof![
        Just(PaymentMethod::Cash),
        Just(PaymentMethod::Cheque),
        Just(PaymentMethod::BankTransfer),
        Just(PaymentMethod::BillToBill),
        Just(PaymentMethod::CreditNote),
        Just(PaymentMethod::Return),
    ]
}

/// Amounts from -1,000.00 to 1,000,000.00, or missing.
fn amount_strategy() -> impl Strategy<Value = Option<Decimal>> {
    proptest::option::of((-100_000i64..100_000_000i64).prop_map(|cents| Decimal::new(cents, 2)))
}

fn entry_strategy() -> impl Strategy<Value = PaymentEntry> {
    (
        method_strategy(),
        amount_strategy(),
        proptest::option::of("[A-Z0-9 ]{0,8}"),
    )
        .prop_map(|(method, amount, reference_number)| PaymentEntry {
            method,
            amount,
            reference_number,
            bank_name: None,
            cheque_date: None,
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// The list is valid exactly when every amount is present and positive.
    #[test]
    fn prop_valid_iff_amounts_positive(entries in prop::collection::vec(entry_strategy(), 0..8)) {
        let result = PaymentValidator::new().validate(&entries);
        let all_positive = entries
            .iter()
            .all(|e| e.amount.is_some_and(|a| a > Decimal::ZERO));
        prop_assert_eq!(result.is_valid(), all_positive);
    }

    /// Strict mode only moves reference issues from warnings to errors.
    #[test]
    fn prop_strict_moves_reference_issues(entries in prop::collection::vec(entry_strategy(), 0..8)) {
        let lenient = PaymentValidator::new().validate(&entries);
        let strict = PaymentValidator::strict().validate(&entries);

        let lenient_refs = lenient
            .warnings
            .iter()
            .filter(|w| matches!(w.kind, IssueKind::MissingReference(_)))
            .count();
        let strict_refs = strict
            .errors
            .iter()
            .filter(|e| matches!(e.kind, IssueKind::MissingReference(_)))
            .count();

        prop_assert_eq!(lenient_refs, strict_refs);
        prop_assert_eq!(strict.errors.len(), lenient.errors.len() + lenient_refs);
    }

    /// The total equals the sum of the present amounts.
    #[test]
    fn prop_total_sums_present_amounts(entries in prop::collection::vec(entry_strategy(), 0..8)) {
        let expected: Decimal = entries.iter().map(|e| e.amount.unwrap_or(Decimal::ZERO)).sum();
        prop_assert_eq!(total_payments(&entries), expected);
    }
}
