//! # Completion Ledger
//!
//! Durable record of which input items have finished or failed.
//!
//! ## Layout
//!
//! - one write-once marker per item under the `DONE` namespace, written by the
//!   work unit that processed the item
//! - one marker per item under the `FAILED` namespace, written by a work unit
//!   whose estimation errored
//! - `DONE/all.TXT`, the append-only list of ids the scheduler has confirmed
//!   and published
//! - `FAILED_all.TXT`, the append-only list of ids whose result could not be
//!   produced
//!
//! Each record line is a single integer id. Markers are keyed per item, so
//! concurrent work units never write the same fact; the aggregate records are
//! written only from the scheduling thread.

pub mod fact_store;

pub use fact_store::{FactStore, FileSystemFactStore, InMemoryFactStore};

use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::constants::layout;
use crate::error::{LedgerError, LedgerResult};
use crate::models::ItemId;

/// Done/failed id sets read at one point in time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerSnapshot {
    pub done: HashSet<ItemId>,
    pub failed: HashSet<ItemId>,
}

impl LedgerSnapshot {
    /// Ids present in both records, sorted
    pub fn overlapping_ids(&self) -> Vec<ItemId> {
        let mut ids: Vec<ItemId> = self.done.intersection(&self.failed).copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[derive(Clone)]
pub struct CompletionLedger {
    store: Arc<dyn FactStore>,
}

impl std::fmt::Debug for CompletionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionLedger").finish_non_exhaustive()
    }
}

impl CompletionLedger {
    pub fn new(store: Arc<dyn FactStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryFactStore::new()))
    }

    /// Create the marker namespaces. Called once at run start.
    pub async fn initialize(&self) -> LedgerResult<()> {
        self.store.ensure_namespace(layout::DONE_NAMESPACE).await?;
        self.store.ensure_namespace(layout::FAILED_NAMESPACE).await
    }

    /// Write the completion marker for an item. Idempotent.
    pub async fn mark_done(&self, item_id: ItemId) -> LedgerResult<()> {
        self.store.put_marker(&layout::marker_key(item_id)).await
    }

    /// Remove stale done and failure markers left by an earlier attempt
    pub async fn clear_marker(&self, item_id: ItemId) -> LedgerResult<()> {
        self.store.remove(&layout::marker_key(item_id)).await?;
        self.store.remove(&layout::failure_marker_key(item_id)).await
    }

    /// Probe the marker written by the work unit itself
    pub async fn is_done(&self, item_id: ItemId) -> LedgerResult<bool> {
        self.store.exists(&layout::marker_key(item_id)).await
    }

    /// Write the failure marker for an item. Work units call this instead of
    /// touching the aggregate failure record.
    pub async fn mark_unit_failed(&self, item_id: ItemId) -> LedgerResult<()> {
        self.store.put_marker(&layout::failure_marker_key(item_id)).await
    }

    /// Probe the failure marker written by a work unit
    pub async fn is_marked_failed(&self, item_id: ItemId) -> LedgerResult<bool> {
        self.store.exists(&layout::failure_marker_key(item_id)).await
    }

    /// Append ids to the failure record. Scheduling thread only.
    pub async fn mark_failed(&self, item_ids: &[ItemId]) -> LedgerResult<()> {
        debug!(count = item_ids.len(), "Recording failed items");
        self.store
            .append_lines(layout::ALL_FAILED_RECORD, &Self::as_lines(item_ids))
            .await
    }

    /// Append ids to the confirmed-done record. Scheduling thread only.
    pub async fn record_done(&self, item_ids: &[ItemId]) -> LedgerResult<()> {
        debug!(count = item_ids.len(), "Recording confirmed items");
        self.store
            .append_lines(layout::ALL_DONE_RECORD, &Self::as_lines(item_ids))
            .await
    }

    pub async fn load_done_ids(&self) -> LedgerResult<HashSet<ItemId>> {
        self.load_ids(layout::ALL_DONE_RECORD).await
    }

    pub async fn load_failed_ids(&self) -> LedgerResult<HashSet<ItemId>> {
        self.load_ids(layout::ALL_FAILED_RECORD).await
    }

    pub async fn snapshot(&self) -> LedgerResult<LedgerSnapshot> {
        Ok(LedgerSnapshot {
            done: self.load_done_ids().await?,
            failed: self.load_failed_ids().await?,
        })
    }

    fn as_lines(item_ids: &[ItemId]) -> Vec<String> {
        item_ids.iter().map(ItemId::to_string).collect()
    }

    async fn load_ids(&self, key: &str) -> LedgerResult<HashSet<ItemId>> {
        let lines = self.store.read_lines(key).await?;
        let mut ids = HashSet::with_capacity(lines.len());
        for (index, line) in lines.iter().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let id = trimmed
                .parse::<ItemId>()
                .map_err(|_| LedgerError::MalformedRecord {
                    key: key.to_string(),
                    line_number: index + 1,
                    content: line.clone(),
                })?;
            ids.insert(id);
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_records_read_as_empty() {
        let ledger = CompletionLedger::in_memory();
        assert!(ledger.load_done_ids().await.unwrap().is_empty());
        assert!(ledger.load_failed_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_marker_is_independent_of_done_record() {
        let ledger = CompletionLedger::in_memory();
        ledger.mark_done(3).await.unwrap();
        ledger.mark_done(3).await.unwrap();

        assert!(ledger.is_done(3).await.unwrap());
        assert!(!ledger.is_done(4).await.unwrap());
        // The marker alone does not confirm the item
        assert!(ledger.load_done_ids().await.unwrap().is_empty());

        ledger.record_done(&[3]).await.unwrap();
        assert_eq!(ledger.load_done_ids().await.unwrap(), HashSet::from([3]));

        ledger.clear_marker(3).await.unwrap();
        assert!(!ledger.is_done(3).await.unwrap());
    }

    #[tokio::test]
    async fn test_failure_marker_stays_out_of_failure_record() {
        let ledger = CompletionLedger::in_memory();
        ledger.mark_unit_failed(4).await.unwrap();

        assert!(ledger.is_marked_failed(4).await.unwrap());
        assert!(!ledger.is_done(4).await.unwrap());
        assert!(ledger.load_failed_ids().await.unwrap().is_empty());

        // A retry starts from a clean slate
        ledger.clear_marker(4).await.unwrap();
        assert!(!ledger.is_marked_failed(4).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_lines_collapse_to_distinct_ids() {
        let ledger = CompletionLedger::in_memory();
        ledger.mark_failed(&[5, 6]).await.unwrap();
        ledger.mark_failed(&[5]).await.unwrap();
        assert_eq!(ledger.load_failed_ids().await.unwrap(), HashSet::from([5, 6]));
    }

    #[tokio::test]
    async fn test_malformed_record_line_is_reported() {
        let store = Arc::new(InMemoryFactStore::new());
        store
            .append_lines(layout::ALL_DONE_RECORD, &["1".to_string(), "two".to_string()])
            .await
            .unwrap();
        let ledger = CompletionLedger::new(store);

        match ledger.load_done_ids().await {
            Err(LedgerError::MalformedRecord { line_number, .. }) => assert_eq!(line_number, 2),
            other => panic!("Expected MalformedRecord, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_snapshot_overlap() {
        let ledger = CompletionLedger::in_memory();
        ledger.record_done(&[1, 2, 3]).await.unwrap();
        ledger.mark_failed(&[3, 9]).await.unwrap();
        let snapshot = ledger.snapshot().await.unwrap();
        assert_eq!(snapshot.overlapping_ids(), vec![3]);
    }
}
