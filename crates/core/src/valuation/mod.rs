//! Return valuation.
//!
//! A returned unit is refunded at cost, not at its sale price: the shop's
//! margin is taken out of the original unit price, and batches in a
//! degraded quality state may lose a further percentage.
//!
//! # Modules
//!
//! - `types` - Margin and calculation result types
//! - `policy` - Quality deduction policy table
//! - `engine` - The valuation engine
//! - `error` - Valuation errors

pub mod engine;
pub mod error;
pub mod policy;
pub mod types;

#[cfg(test)]
mod engine_props;

pub use engine::{ReturnValuationEngine, ValuationInput};
pub use error::ValuationError;
pub use policy::{QualityDeductionPolicy, QualityRule};
pub use types::{MarginSource, ReturnCalculation, ShopMargin};
