//! Core settlement logic for Stockflow.
//!
//! This crate contains pure business logic with ZERO network or storage dependencies.
//! All domain types, validation rules, and calculations live here.
//!
//! # Modules
//!
//! - `invoice` - Invoice snapshots and status rules
//! - `batch` - Batch ledger and search results
//! - `valuation` - Return valuation at cost
//! - `payment` - Payment entries and validation
//! - `settlement` - Settlement form and reconciler state machine

pub mod batch;
pub mod invoice;
pub mod payment;
pub mod settlement;
pub mod valuation;
