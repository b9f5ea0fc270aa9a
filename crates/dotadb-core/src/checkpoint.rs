//! Checkpoint tracking: how far the crawler and the indexer have progressed.
//!
//! `crawler_height` is the last block whose raw events are durably stored,
//! `indexer_height` the last block whose derived state is fully applied. The
//! storage layer overwrites both unconditionally; [`CheckpointTracker`] is the
//! writer that keeps them monotonic and ordered.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::LedgerError;

/// Progress row for one protocol tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerStatus {
    /// Protocol tag (e.g. `"dot-20"`).
    pub protocol: String,
    pub indexer_height: u64,
    pub crawler_height: u64,
}

impl IndexerStatus {
    pub fn new(protocol: impl Into<String>, indexer_height: u64, crawler_height: u64) -> Self {
        Self {
            protocol: protocol.into(),
            indexer_height,
            crawler_height,
        }
    }
}

/// Persistence for status rows.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Load the status row for a protocol tag, if one was ever written.
    async fn load_status(&self, protocol: &str) -> Result<Option<IndexerStatus>, LedgerError>;

    /// Overwrite both heights for the row's protocol tag.
    async fn save_status(&self, status: IndexerStatus) -> Result<(), LedgerError>;

    /// Remove the status row (e.g. when re-indexing from scratch).
    async fn delete_status(&self, protocol: &str) -> Result<(), LedgerError>;

    /// Writer lock for a protocol tag's row. Every handle onto the same
    /// backing store must return the same lock for the same tag.
    fn writer_lock(&self, protocol: &str) -> Arc<tokio::sync::Mutex<()>>;
}

/// Per-protocol writer locks, shared by every handle of a status store.
#[derive(Debug, Default)]
pub struct StatusLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl StatusLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for `protocol`, created on first use.
    pub fn get(&self, protocol: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(protocol.to_string())
            .or_default()
            .clone()
    }
}

/// Single writer for one protocol tag's status row.
///
/// All ticks of a protocol share the row, so every update takes the store's
/// writer lock for the tag. Trackers built over clones of one store
/// serialize against each other.
pub struct CheckpointTracker {
    store: Box<dyn StatusStore>,
    protocol: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl CheckpointTracker {
    pub fn new(store: Box<dyn StatusStore>, protocol: impl Into<String>) -> Self {
        let protocol = protocol.into();
        let lock = store.writer_lock(&protocol);
        Self { store, protocol, lock }
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Load the saved status (returns `None` before the first write).
    pub async fn load(&self) -> Result<Option<IndexerStatus>, LedgerError> {
        self.store.load_status(&self.protocol).await
    }

    /// First block to fetch when resuming the crawler.
    pub async fn resume_height(&self) -> Result<u64, LedgerError> {
        Ok(self.load().await?.map(|s| s.crawler_height + 1).unwrap_or(0))
    }

    /// Move both heights at once.
    pub async fn advance(&self, indexer_height: u64, crawler_height: u64) -> Result<IndexerStatus, LedgerError> {
        self.transition(|_| (indexer_height, crawler_height)).await
    }

    /// Raw events up to `height` are stored; derived state may lag.
    pub async fn record_crawled(&self, height: u64) -> Result<IndexerStatus, LedgerError> {
        self.transition(|cur| (cur.indexer_height, height)).await
    }

    /// Derived state up to `height` is applied. Raises the crawler height too
    /// when the events were fetched and applied in one step.
    pub async fn record_indexed(&self, height: u64) -> Result<IndexerStatus, LedgerError> {
        self.transition(|cur| (height, cur.crawler_height.max(height))).await
    }

    /// Forget all progress for this protocol tag.
    pub async fn reset(&self) -> Result<(), LedgerError> {
        let _guard = self.lock.lock().await;
        self.store.delete_status(&self.protocol).await?;
        info!(protocol = %self.protocol, "checkpoint reset");
        Ok(())
    }

    async fn transition(
        &self,
        next: impl FnOnce(&IndexerStatus) -> (u64, u64),
    ) -> Result<IndexerStatus, LedgerError> {
        let _guard = self.lock.lock().await;
        let current = self
            .store
            .load_status(&self.protocol)
            .await?
            .unwrap_or_else(|| IndexerStatus::new(self.protocol.clone(), 0, 0));
        let (indexer_height, crawler_height) = next(&current);

        if indexer_height < current.indexer_height
            || crawler_height < current.crawler_height
            || crawler_height < indexer_height
        {
            return Err(LedgerError::CheckpointRegression {
                protocol: self.protocol.clone(),
                from_indexer: current.indexer_height,
                from_crawler: current.crawler_height,
                to_indexer: indexer_height,
                to_crawler: crawler_height,
            });
        }

        let status = IndexerStatus::new(self.protocol.clone(), indexer_height, crawler_height);
        if status != current {
            self.store.save_status(status.clone()).await?;
            info!(
                protocol = %self.protocol,
                indexer_height,
                crawler_height,
                "checkpoint advanced"
            );
        }
        Ok(status)
    }
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

/// In-memory status store for tests and ephemeral pipelines.
#[derive(Default)]
pub struct MemoryStatusStore {
    data: Mutex<HashMap<String, IndexerStatus>>,
    locks: StatusLocks,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn load_status(&self, protocol: &str) -> Result<Option<IndexerStatus>, LedgerError> {
        Ok(self.data.lock().unwrap_or_else(PoisonError::into_inner).get(protocol).cloned())
    }

    async fn save_status(&self, status: IndexerStatus) -> Result<(), LedgerError> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner).insert(status.protocol.clone(), status);
        Ok(())
    }

    async fn delete_status(&self, protocol: &str) -> Result<(), LedgerError> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner).remove(protocol);
        Ok(())
    }

    fn writer_lock(&self, protocol: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks.get(protocol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> CheckpointTracker {
        CheckpointTracker::new(Box::new(MemoryStatusStore::new()), "dot-20")
    }

    #[tokio::test]
    async fn absent_before_first_write() {
        let t = tracker();
        assert!(t.load().await.unwrap().is_none());
        assert_eq!(t.resume_height().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn crawler_runs_ahead_of_indexer() {
        let t = tracker();
        t.record_crawled(100).await.unwrap();
        let s = t.record_indexed(60).await.unwrap();
        assert_eq!((s.indexer_height, s.crawler_height), (60, 100));
        assert_eq!(t.resume_height().await.unwrap(), 101);

        // Indexing past the crawler drags the crawler height along.
        let s = t.record_indexed(120).await.unwrap();
        assert_eq!((s.indexer_height, s.crawler_height), (120, 120));
    }

    #[tokio::test]
    async fn regressions_rejected() {
        let t = tracker();
        t.advance(50, 80).await.unwrap();

        assert!(matches!(
            t.record_indexed(40).await,
            Err(LedgerError::CheckpointRegression { .. })
        ));
        assert!(t.record_crawled(70).await.is_err());
        // crawler below indexer
        assert!(t.advance(90, 85).await.is_err());

        let s = t.load().await.unwrap().unwrap();
        assert_eq!((s.indexer_height, s.crawler_height), (50, 80));
    }

    #[test]
    fn writer_lock_is_shared_per_protocol() {
        let store = MemoryStatusStore::new();
        assert!(Arc::ptr_eq(&store.writer_lock("dot-20"), &store.writer_lock("dot-20")));
        assert!(!Arc::ptr_eq(&store.writer_lock("dot-20"), &store.writer_lock("dot-21")));
    }

    #[tokio::test]
    async fn reset_forgets_progress() {
        let t = tracker();
        t.advance(5, 5).await.unwrap();
        t.reset().await.unwrap();
        assert!(t.load().await.unwrap().is_none());
        // Starting over from zero is allowed after a reset.
        t.advance(1, 1).await.unwrap();
    }
}
