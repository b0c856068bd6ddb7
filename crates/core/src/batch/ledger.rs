//! In-session batch ledger.
//!
//! Holds the batch snapshot fetched when a settlement is opened and
//! apportions each batch's returnable units across the return requests of
//! that settlement. Nothing here is persisted; the service re-checks the
//! quantities when the settlement is submitted.

use std::collections::{BTreeMap, HashMap};

use stockflow_shared::types::{BatchId, InvoiceId};

use super::types::BatchInfo;

/// Result of apportioning a batch's returnable units to one claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimAllocation {
    /// The batch claimed against.
    pub batch_id: BatchId,
    /// Units the claim asked for.
    pub requested: u32,
    /// Units still available to this claim after earlier claims.
    pub available: u32,
}

impl ClaimAllocation {
    /// Returns true if the claim requests between 1 and `available` units.
    #[must_use]
    pub fn is_within_limit(&self) -> bool {
        self.requested >= 1 && self.requested <= self.available
    }
}

/// Batch snapshot for one invoice.
#[derive(Debug, Clone, Default)]
pub struct BatchLedger {
    invoice_id: Option<InvoiceId>,
    batches: BTreeMap<BatchId, BatchInfo>,
}

impl BatchLedger {
    /// Creates a ledger from the batches fetched for an invoice.
    #[must_use]
    pub fn new(invoice_id: InvoiceId, batches: Vec<BatchInfo>) -> Self {
        Self {
            invoice_id: Some(invoice_id),
            batches: batches.into_iter().map(|b| (b.batch_id, b)).collect(),
        }
    }

    /// The invoice this snapshot belongs to.
    #[must_use]
    pub fn invoice_id(&self) -> Option<InvoiceId> {
        self.invoice_id
    }

    /// Replaces the snapshot with freshly fetched batches.
    pub fn replace(&mut self, batches: Vec<BatchInfo>) {
        self.batches = batches.into_iter().map(|b| (b.batch_id, b)).collect();
    }

    /// Adds or refreshes a single batch, e.g. one picked from search.
    pub fn upsert(&mut self, batch: BatchInfo) {
        self.batches.insert(batch.batch_id, batch);
    }

    /// Looks up a batch.
    #[must_use]
    pub fn get(&self, batch_id: BatchId) -> Option<&BatchInfo> {
        self.batches.get(&batch_id)
    }

    /// Iterates over the batches in ID order.
    pub fn iter(&self) -> impl Iterator<Item = &BatchInfo> {
        self.batches.values()
    }

    /// Number of batches in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// Returns true if the invoice has no batches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Units of a batch returnable before any claim of this session.
    /// Unknown batches have none.
    #[must_use]
    pub fn returnable(&self, batch_id: BatchId) -> u32 {
        self.batches
            .get(&batch_id)
            .filter(|b| b.can_return)
            .map_or(0, BatchInfo::returnable_quantity)
    }

    /// Apportions returnable units across claims in the given order.
    ///
    /// Each claim sees the batch's returnable units minus everything granted
    /// to earlier claims on the same batch. A claim that exceeds what is left
    /// is granted nothing, so it does not shrink later claims.
    pub fn allocate<K, I>(&self, claims: I) -> Vec<(K, ClaimAllocation)>
    where
        I: IntoIterator<Item = (K, BatchId, u32)>,
    {
        let mut granted: HashMap<BatchId, u32> = HashMap::new();

        claims
            .into_iter()
            .map(|(key, batch_id, requested)| {
                let used = granted.get(&batch_id).copied().unwrap_or(0);
                let available = self.returnable(batch_id).saturating_sub(used);
                let allocation = ClaimAllocation {
                    batch_id,
                    requested,
                    available,
                };
                if allocation.is_within_limit() {
                    *granted.entry(batch_id).or_insert(0) += requested;
                }
                (key, allocation)
            })
            .collect()
    }
}
