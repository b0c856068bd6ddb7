//! Hooks into the rest of the back office.

use async_trait::async_trait;
use stockflow_core::invoice::InvoiceSummary;

/// Callbacks for collaborators that show invoice data elsewhere.
///
/// Auto-refresh is suspended while a settlement is open so that
/// background reloads cannot disturb the operator's input.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RefreshHooks: Send + Sync {
    /// A settlement form was opened.
    async fn suspend_auto_refresh(&self);

    /// The settlement form was closed.
    async fn resume_auto_refresh(&self);

    /// A settlement was applied; invoice lists and outstanding totals
    /// should be reloaded.
    async fn settlement_completed(&self, summary: &InvoiceSummary);
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRefresh;

#[async_trait]
impl RefreshHooks for NoopRefresh {
    async fn suspend_auto_refresh(&self) {}

    async fn resume_auto_refresh(&self) {}

    async fn settlement_completed(&self, _summary: &InvoiceSummary) {}
}
