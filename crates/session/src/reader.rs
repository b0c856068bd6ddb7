//! Batch ledger reader.
//!
//! Invoice batch lists are always fetched fresh: they carry the returned
//! counts a settlement is validated against. Search results only seed new
//! rows and are cached for a short time.

use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use stockflow_core::batch::{BatchLedger, BatchSearchResult};
use stockflow_gateway::{BackofficeApi, BatchSearchQuery, GatewayError, RequestContext};
use stockflow_shared::config::SearchConfig;
use stockflow_shared::types::InvoiceId;
use tracing::{debug, warn};

/// Reads batch data for settlements.
#[derive(Clone)]
pub struct BatchLedgerReader {
    api: Arc<dyn BackofficeApi>,
    cache: Cache<BatchSearchQuery, Arc<Vec<BatchSearchResult>>>,
    min_query_length: usize,
}

impl BatchLedgerReader {
    /// Creates a reader with default search settings.
    #[must_use]
    pub fn new(api: Arc<dyn BackofficeApi>) -> Self {
        Self::with_config(api, &SearchConfig::default())
    }

    /// Creates a reader with custom search settings.
    #[must_use]
    pub fn with_config(api: Arc<dyn BackofficeApi>, config: &SearchConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.cache_capacity)
            .time_to_live(Duration::from_secs(config.cache_ttl_secs))
            .build();

        Self {
            api,
            cache,
            min_query_length: config.min_query_length,
        }
    }

    /// Fetches the batches on an invoice as a ledger.
    ///
    /// An invoice without batches yields an empty ledger.
    pub async fn invoice_batches(
        &self,
        ctx: &RequestContext,
        invoice_id: InvoiceId,
    ) -> Result<BatchLedger, GatewayError> {
        let batches = self.api.invoice_batches(ctx, invoice_id).await?.batches;
        for batch in batches.iter().filter(|b| !b.is_consistent()) {
            warn!(
                %invoice_id,
                batch_id = %batch.batch_id,
                reported = batch.max_returnable_quantity,
                derived = batch.returnable_quantity(),
                "batch reports a returnable quantity that disagrees with its counts"
            );
        }
        debug!(%invoice_id, count = batches.len(), "loaded invoice batches");
        Ok(BatchLedger::new(invoice_id, batches))
    }

    /// Searches batches by batch number or product name.
    ///
    /// Queries shorter than the configured minimum return nothing without
    /// a request.
    pub async fn search(
        &self,
        ctx: &RequestContext,
        query: &str,
        invoice_id: Option<InvoiceId>,
    ) -> Result<Arc<Vec<BatchSearchResult>>, GatewayError> {
        let query = query.trim();
        if query.chars().count() < self.min_query_length {
            return Ok(Arc::new(Vec::new()));
        }

        let key = BatchSearchQuery {
            query: query.to_string(),
            invoice_id,
        };
        if let Some(cached) = self.cache.get(&key).await {
            debug!(query, "batch search served from cache");
            return Ok(cached);
        }

        let results = Arc::new(self.api.search_batches(ctx, &key).await?);
        self.cache.insert(key, Arc::clone(&results)).await;
        Ok(results)
    }

    /// Drops every cached search result.
    pub fn invalidate(&self) {
        self.cache.invalidate_all();
    }
}

impl std::fmt::Debug for BatchLedgerReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchLedgerReader")
            .field("min_query_length", &self.min_query_length)
            .field("cached", &self.cache.entry_count())
            .finish_non_exhaustive()
    }
}
