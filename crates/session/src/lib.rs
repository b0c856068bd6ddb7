//! Settlement sessions for Stockflow.
//!
//! Connects the pure settlement logic in `stockflow-core` to a back-office
//! service:
//! - `reader` - Batch ledger reads and cached batch search
//! - `session` - The settlement session and response correlation
//! - `refresh` - Hooks into invoice lists shown elsewhere
//! - `error` - Session errors and their mapping to `AppError`

pub mod error;
pub mod reader;
pub mod refresh;
pub mod session;

#[cfg(test)]
mod testing;

pub use error::SessionError;
pub use reader::BatchLedgerReader;
pub use refresh::{NoopRefresh, RefreshHooks};
pub use session::{SearchTicket, SettlementSession};
