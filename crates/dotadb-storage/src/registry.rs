//! Schema registry: per-tick relation lifecycle.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, warn};

use dotadb_core::{LedgerError, Tick};

use crate::error::classify;
use crate::schema::{TickSchema, CREATE_DEPLOY, CREATE_INDEXER_STATUS, DEPLOY, INDEXER_STATUS};
use crate::store::LedgerStore;
use crate::unit::Unit;

/// Cache of [`TickSchema`] templates keyed by tick, plus the set of ticks
/// whose relations this process has already provisioned.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: RwLock<HashMap<Tick, Arc<TickSchema>>>,
    ready: RwLock<HashSet<Tick>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The schema template for `tick`, instantiated on first use.
    pub fn schema(&self, tick: &Tick) -> Arc<TickSchema> {
        if let Some(schema) = self.schemas.read().unwrap_or_else(PoisonError::into_inner).get(tick) {
            return schema.clone();
        }
        self.schemas
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(tick.clone())
            .or_insert_with(|| Arc::new(TickSchema::new(tick)))
            .clone()
    }

    /// Ticks provisioned by this process, sorted.
    pub fn provisioned(&self) -> Vec<Tick> {
        let mut ticks: Vec<Tick> = self
            .ready
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        ticks.sort();
        ticks
    }

    fn is_ready(&self, tick: &Tick) -> bool {
        self.ready.read().unwrap_or_else(PoisonError::into_inner).contains(tick)
    }

    fn mark_ready(&self, tick: &Tick) {
        self.ready.write().unwrap_or_else(PoisonError::into_inner).insert(tick.clone());
    }

    fn forget(&self, tick: &Tick) {
        self.ready.write().unwrap_or_else(PoisonError::into_inner).remove(tick);
    }
}

/// Outcome of [`LedgerStore::drop_tick`]. Failures are collected, not raised.
#[derive(Debug, Default)]
pub struct DropReport {
    pub dropped: Vec<String>,
    pub failed: Vec<(String, LedgerError)>,
}

impl DropReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

impl LedgerStore {
    /// Create the tick's five relations and the global relations if absent.
    ///
    /// Idempotent. Must not be called while this task holds an open unit on a
    /// single-connection store.
    pub async fn ensure_tick(&self, tick: &Tick) -> Result<Arc<TickSchema>, LedgerError> {
        let registry = self.registry();
        let schema = registry.schema(tick);
        if registry.is_ready(tick) {
            return Ok(schema);
        }

        let mut tx = self.pool().begin().await.map_err(|e| classify("ensure_tick", e))?;
        for (relation, ddl) in [(DEPLOY, CREATE_DEPLOY), (INDEXER_STATUS, CREATE_INDEXER_STATUS)] {
            sqlx::query(ddl)
                .execute(&mut *tx)
                .await
                .map_err(|e| schema_error(relation, e))?;
        }
        for (relation, ddl) in schema.relations().into_iter().zip(schema.create_statements()) {
            sqlx::query(&ddl)
                .execute(&mut *tx)
                .await
                .map_err(|e| schema_error(relation, e))?;
        }
        tx.commit().await.map_err(|e| classify("ensure_tick", e))?;

        registry.mark_ready(tick);
        info!(tick = %tick, "tick relations ready");
        Ok(schema)
    }

    /// Drop the tick's five relations, best effort.
    ///
    /// Each relation is attempted even if an earlier one failed; failures are
    /// logged and listed in the report. Global relations are left in place.
    pub async fn drop_tick(&self, tick: &Tick) -> DropReport {
        let registry = self.registry();
        let schema = registry.schema(tick);
        registry.forget(tick);

        let mut report = DropReport::default();
        for relation in schema.relations() {
            let result = sqlx::query(&TickSchema::drop_statement(relation))
                .execute(self.pool())
                .await;
            match result {
                Ok(_) => report.dropped.push(relation.to_string()),
                Err(e) => {
                    let err = schema_error(relation, e);
                    warn!(tick = %tick, relation, error = %err, "drop failed, continuing");
                    report.failed.push((relation.to_string(), err));
                }
            }
        }
        debug!(tick = %tick, dropped = report.dropped.len(), failed = report.failed.len(), "tick dropped");
        report
    }

    /// Delete every row belonging to the tick, its deploy row and this
    /// store's status row, atomically. Relations are kept.
    pub async fn purge_tick_data(&self, tick: &Tick) -> Result<(), LedgerError> {
        self.ensure_tick(tick).await?;
        let mut unit = self.begin().await?;
        unit.purge_tick_data(tick).await?;
        unit.commit().await
    }
}

impl Unit<'_> {
    /// Row-level reset of one tick inside this unit. See
    /// [`LedgerStore::purge_tick_data`].
    pub async fn purge_tick_data(&mut self, tick: &Tick) -> Result<(), LedgerError> {
        let schema = self.schema(tick);
        let protocol = self.protocol().to_string();
        let mut sp = self.nested().await?;

        for relation in schema.relations() {
            sqlx::query(&TickSchema::delete_statement(relation))
                .execute(sp.conn())
                .await
                .map_err(|e| classify(relation, e))?;
        }
        sqlx::query("DELETE FROM deploy WHERE tick = ?")
            .bind(tick.as_str())
            .execute(sp.conn())
            .await
            .map_err(|e| classify(DEPLOY, e))?;
        sqlx::query("DELETE FROM indexer_status WHERE p = ?")
            .bind(&protocol)
            .execute(sp.conn())
            .await
            .map_err(|e| classify(INDEXER_STATUS, e))?;

        sp.commit().await?;
        info!(tick = %tick, protocol = %protocol, "tick data purged");
        Ok(())
    }
}

fn schema_error(relation: &str, err: sqlx::Error) -> LedgerError {
    match classify(relation, err) {
        LedgerError::Store(reason) => LedgerError::Schema {
            relation: relation.to_string(),
            reason,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dota() -> Tick {
        Tick::new("dota").unwrap()
    }

    async fn table_count(store: &LedgerStore, like: &str) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name LIKE ?")
            .bind(like)
            .fetch_one(store.pool())
            .await
            .unwrap()
    }

    #[test]
    fn registry_caches_templates() {
        let registry = SchemaRegistry::new();
        let a = registry.schema(&dota());
        let b = registry.schema(&dota());
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn ensure_is_idempotent() {
        let store = LedgerStore::in_memory().await.unwrap();
        store.ensure_tick(&dota()).await.unwrap();
        store.ensure_tick(&dota()).await.unwrap();
        assert_eq!(table_count(&store, "dota_%").await, 5);
        assert_eq!(store.registry().provisioned(), vec![dota()]);
    }

    #[tokio::test]
    async fn drop_removes_only_tick_relations() {
        let store = LedgerStore::in_memory().await.unwrap();
        store.ensure_tick(&dota()).await.unwrap();

        let report = store.drop_tick(&dota()).await;
        assert!(report.is_complete());
        assert_eq!(report.dropped.len(), 5);
        assert_eq!(table_count(&store, "dota_%").await, 0);
        assert_eq!(table_count(&store, "deploy").await, 1);
        assert_eq!(table_count(&store, "indexer_status").await, 1);

        // Dropping again is harmless, and the tick can be provisioned again.
        assert!(store.drop_tick(&dota()).await.is_complete());
        store.ensure_tick(&dota()).await.unwrap();
        assert_eq!(table_count(&store, "dota_%").await, 5);
    }

    #[tokio::test]
    async fn drop_keeps_going_after_a_failure() {
        let store = LedgerStore::in_memory().await.unwrap();
        store.ensure_tick(&dota()).await.unwrap();
        // A view with the currency relation's name cannot be removed by DROP TABLE.
        sqlx::query(r#"DROP TABLE "dota_currency""#).execute(store.pool()).await.unwrap();
        sqlx::query(r#"CREATE VIEW "dota_currency" AS SELECT 1"#)
            .execute(store.pool())
            .await
            .unwrap();

        let report = store.drop_tick(&dota()).await;
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "dota_currency");
        assert_eq!(report.dropped.len(), 4);
        assert_eq!(table_count(&store, "dota_%").await, 0);
    }
}
