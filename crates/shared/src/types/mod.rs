//! Common types used across the application.

pub mod id;
pub mod money;

pub use id::*;
pub use money::{MINOR_UNIT, MONEY_SCALE, display_amount, exceeds_by_minor_unit, is_settled, round_money};
