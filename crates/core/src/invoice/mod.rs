//! Invoice snapshots as seen by the settlement subsystem.
//!
//! The invoice is the root of every settlement: its balance due bounds
//! what a settlement may apply, and its status decides whether a
//! settlement may be opened at all.

pub mod types;

pub use types::{
    Invoice, InvoiceStatus, InvoiceSummary, OutstandingInvoices, status_after_settlement,
};
