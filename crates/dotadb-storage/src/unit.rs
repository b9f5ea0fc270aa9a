//! Units of work: transactions and nested savepoints.
//!
//! An outer unit is a database transaction. [`Unit::nested`] opens a savepoint
//! that borrows its parent, so rolling it back discards only the writes made
//! through it while the parent's earlier writes stay pending. An error that
//! escapes the outer unit discards everything. Dropping an uncommitted unit
//! rolls it back.

use std::sync::Arc;

use futures::future::BoxFuture;
use sqlx::{Connection, Sqlite, SqliteConnection, Transaction};
use tracing::{debug, warn};

use dotadb_core::{LedgerError, Tick};

use crate::error::classify;
use crate::schema::TickSchema;
use crate::store::Shared;

/// An open unit of work. Every ledger operation runs against one.
pub struct Unit<'c> {
    tx: Transaction<'c, Sqlite>,
    shared: Arc<Shared>,
    depth: u32,
}

impl<'c> Unit<'c> {
    pub(crate) fn new(tx: Transaction<'c, Sqlite>, shared: Arc<Shared>) -> Self {
        Self { tx, shared, depth: 0 }
    }

    /// Nesting level: 0 for an outer unit.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn protocol(&self) -> &str {
        &self.shared.protocol
    }

    /// Open a nested unit scoped to this one.
    pub async fn nested(&mut self) -> Result<Unit<'_>, LedgerError> {
        let tx = Connection::begin(&mut *self.tx)
            .await
            .map_err(|e| classify("savepoint", e))?;
        Ok(Unit {
            tx,
            shared: self.shared.clone(),
            depth: self.depth + 1,
        })
    }

    /// Run `f` in a nested unit. On `Err` only the nested writes are undone
    /// and the error is returned; the caller decides whether to re-raise it
    /// past this unit.
    pub async fn with_nested<T, F>(&mut self, f: F) -> Result<T, LedgerError>
    where
        F: for<'n> FnOnce(&'n mut Unit<'_>) -> BoxFuture<'n, Result<T, LedgerError>>,
    {
        let mut nested = self.nested().await?;
        match f(&mut nested).await {
            Ok(value) => {
                nested.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = nested.rollback().await {
                    warn!(error = %rollback_err, "savepoint rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Make this unit's writes permanent (outer) or fold them into the parent
    /// (nested).
    pub async fn commit(self) -> Result<(), LedgerError> {
        let depth = self.depth;
        self.tx.commit().await.map_err(|e| classify("commit", e))?;
        debug!(depth, "unit committed");
        Ok(())
    }

    /// Discard every write made through this unit.
    pub async fn rollback(self) -> Result<(), LedgerError> {
        let depth = self.depth;
        self.tx.rollback().await.map_err(|e| classify("rollback", e))?;
        debug!(depth, "unit rolled back");
        Ok(())
    }

    pub(crate) fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    pub(crate) fn schema(&self, tick: &Tick) -> Arc<TickSchema> {
        self.shared.registry.schema(tick)
    }

    pub(crate) fn default_scan_timeout(&self) -> std::time::Duration {
        self.shared.total_supply_timeout
    }
}
