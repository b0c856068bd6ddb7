//! Money helpers with fixed two-decimal precision.
//!
//! CRITICAL: Never use floating-point for money calculations.
//! Every monetary field in the system is a `rust_decimal::Decimal` with two
//! fractional digits on the wire. Intermediate values may carry more scale;
//! they are rounded only at the points the settlement rules name.

use rust_decimal::{Decimal, RoundingStrategy};

/// Number of fractional digits carried by monetary amounts.
pub const MONEY_SCALE: u32 = 2;

/// Smallest representable currency unit (0.01).
pub const MINOR_UNIT: Decimal = Decimal::from_parts(1, 0, 0, false, MONEY_SCALE);

/// Rounds an amount to two decimal places using Banker's Rounding.
///
/// ```
/// use rust_decimal_macros::dec;
/// use stockflow_shared::types::round_money;
///
/// assert_eq!(round_money(dec!(2.345)), dec!(2.34));
/// assert_eq!(round_money(dec!(2.355)), dec!(2.36));
/// ```
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointNearestEven)
}

/// Returns true if `amount` is larger than `limit` by at least one minor unit.
///
/// Differences smaller than 0.01 come from intermediate rounding and are not
/// an overage.
#[must_use]
pub fn exceeds_by_minor_unit(amount: Decimal, limit: Decimal) -> bool {
    amount - limit >= MINOR_UNIT
}

/// Returns true if a remaining balance is zero at currency precision.
#[must_use]
pub fn is_settled(remaining: Decimal) -> bool {
    remaining.abs() < MINOR_UNIT
}

/// Formats an amount with exactly two decimals, e.g. `1250.5` as `1250.50`.
#[must_use]
pub fn display_amount(amount: Decimal) -> String {
    let mut rounded = round_money(amount);
    rounded.rescale(MONEY_SCALE);
    rounded.to_string()
}
