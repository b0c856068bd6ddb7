//! Stock batches that contributed to an invoice.
//!
//! This module implements the batch side of return handling:
//! - Batch snapshots with sold and returned quantities
//! - Free-text search results
//! - The in-session ledger that apportions returnable units across
//!   uncommitted return requests

pub mod ledger;
pub mod types;

#[cfg(test)]
mod ledger_props;

pub use ledger::{BatchLedger, ClaimAllocation};
pub use types::{BatchInfo, BatchSearchResult, MatchField, QualityStatus};
