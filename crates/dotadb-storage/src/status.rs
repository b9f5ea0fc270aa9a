//! Indexer status rows in SQLite.
//!
//! The raw operations overwrite both heights unconditionally. Monotonic
//! progress is enforced one level up by [`dotadb_core::CheckpointTracker`],
//! for which [`LedgerStore`] implements [`StatusStore`].

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::Row;
use tracing::debug;

use dotadb_core::{IndexerStatus, LedgerError, StatusStore};

use crate::error::{classify, to_sql_int};
use crate::schema::{INDEXER_STATUS, SELECT_STATUS, UPSERT_STATUS};
use crate::store::LedgerStore;
use crate::unit::Unit;

impl Unit<'_> {
    pub async fn get_status(&mut self, protocol: &str) -> Result<Option<IndexerStatus>, LedgerError> {
        let row = sqlx::query(SELECT_STATUS)
            .bind(protocol)
            .fetch_optional(self.conn())
            .await
            .map_err(|e| classify(INDEXER_STATUS, e))?;

        row.map(|row| -> Result<IndexerStatus, LedgerError> {
            let col = |e: sqlx::Error| classify(INDEXER_STATUS, e);
            let indexer: i64 = row.try_get("indexer_height").map_err(col)?;
            let crawler: i64 = row.try_get("crawler_height").map_err(col)?;
            Ok(IndexerStatus::new(
                row.try_get::<String, _>("p").map_err(col)?,
                indexer as u64,
                crawler as u64,
            ))
        })
        .transpose()
    }

    /// Overwrite the row for `status.protocol`, creating it if absent.
    pub async fn upsert_status(&mut self, status: &IndexerStatus) -> Result<(), LedgerError> {
        sqlx::query(UPSERT_STATUS)
            .bind(&status.protocol)
            .bind(to_sql_int("indexer_height", status.indexer_height)?)
            .bind(to_sql_int("crawler_height", status.crawler_height)?)
            .execute(self.conn())
            .await
            .map_err(|e| classify(INDEXER_STATUS, e))?;

        debug!(
            protocol = %status.protocol,
            indexer_height = status.indexer_height,
            crawler_height = status.crawler_height,
            "status written"
        );
        Ok(())
    }

    pub async fn delete_status(&mut self, protocol: &str) -> Result<(), LedgerError> {
        sqlx::query("DELETE FROM indexer_status WHERE p = ?")
            .bind(protocol)
            .execute(self.conn())
            .await
            .map_err(|e| classify(INDEXER_STATUS, e))?;
        Ok(())
    }
}

impl LedgerStore {
    pub async fn get_status(&self, protocol: &str) -> Result<Option<IndexerStatus>, LedgerError> {
        self.begin().await?.get_status(protocol).await
    }

    pub async fn upsert_status(&self, status: &IndexerStatus) -> Result<(), LedgerError> {
        let mut unit = self.begin().await?;
        unit.upsert_status(status).await?;
        unit.commit().await
    }
}

#[async_trait]
impl StatusStore for LedgerStore {
    async fn load_status(&self, protocol: &str) -> Result<Option<IndexerStatus>, LedgerError> {
        self.get_status(protocol).await
    }

    async fn save_status(&self, status: IndexerStatus) -> Result<(), LedgerError> {
        self.upsert_status(&status).await
    }

    async fn delete_status(&self, protocol: &str) -> Result<(), LedgerError> {
        let mut unit = self.begin().await?;
        unit.delete_status(protocol).await?;
        unit.commit().await
    }

    fn writer_lock(&self, protocol: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.status_locks().get(protocol)
    }
}

#[cfg(test)]
mod tests {
    use dotadb_core::CheckpointTracker;

    use super::*;

    #[tokio::test]
    async fn status_overwrites_unconditionally() {
        let store = LedgerStore::in_memory().await.unwrap();
        assert!(store.get_status("dot-20").await.unwrap().is_none());

        store.upsert_status(&IndexerStatus::new("dot-20", 90, 100)).await.unwrap();
        // The raw write does not guard against moving backwards.
        store.upsert_status(&IndexerStatus::new("dot-20", 10, 20)).await.unwrap();
        assert_eq!(
            store.get_status("dot-20").await.unwrap(),
            Some(IndexerStatus::new("dot-20", 10, 20))
        );
        assert!(store.get_status("dot-21").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn heights_beyond_i64_are_rejected() {
        let store = LedgerStore::in_memory().await.unwrap();
        let err = store
            .upsert_status(&IndexerStatus::new("dot-20", 0, u64::MAX))
            .await
            .unwrap_err();
        assert!(err.is_validation(), "{err}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn trackers_on_store_clones_never_regress() {
        let store = LedgerStore::in_memory().await.unwrap();
        for round in 0..50u64 {
            let base = round * 10;
            let low = CheckpointTracker::new(Box::new(store.clone()), "dot-20");
            let high = CheckpointTracker::new(Box::new(store.clone()), "dot-20");

            let (low_result, high_result) =
                tokio::join!(low.record_indexed(base + 5), high.record_indexed(base + 9));
            high_result.unwrap();
            // The lower height either lands first or is refused.
            if let Err(err) = low_result {
                assert!(matches!(err, LedgerError::CheckpointRegression { .. }), "{err}");
            }

            let status = store.get_status("dot-20").await.unwrap().unwrap();
            assert_eq!(status.indexer_height, base + 9, "round {round}");
        }
    }

    #[tokio::test]
    async fn tracker_persists_through_store() {
        let store = LedgerStore::in_memory().await.unwrap();
        let tracker = CheckpointTracker::new(Box::new(store.clone()), "dot-20");
        tracker.record_crawled(500).await.unwrap();
        tracker.record_indexed(400).await.unwrap();
        assert_eq!(
            store.get_status("dot-20").await.unwrap(),
            Some(IndexerStatus::new("dot-20", 400, 500))
        );

        let err = tracker.record_indexed(300).await.unwrap_err();
        assert!(matches!(err, LedgerError::CheckpointRegression { .. }), "{err}");

        tracker.reset().await.unwrap();
        assert!(store.get_status("dot-20").await.unwrap().is_none());
    }
}
