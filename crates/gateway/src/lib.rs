//! Back-office service boundary for Stockflow.
//!
//! The settlement subsystem consumes the invoice and ledger service only
//! through [`BackofficeApi`]. Two implementations live here:
//!
//! - [`HttpGateway`] - talks to the live service over HTTP
//! - [`InMemoryBackoffice`] - an in-process service with the same
//!   server-side rules, for tests and local runs
//!
//! Every call takes an explicit [`RequestContext`]; nothing reads ambient
//! credentials.

pub mod api;
pub mod context;
pub mod error;
pub mod http;
pub mod memory;

pub use api::{BackofficeApi, BatchSearchQuery, InvoiceBatches, ReturnCalculationRequest};
pub use context::RequestContext;
pub use error::GatewayError;
pub use http::HttpGateway;
pub use memory::{InMemoryBackoffice, InjectedFailure};
