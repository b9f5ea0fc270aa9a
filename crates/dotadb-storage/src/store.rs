//! SQLite-backed ledger store.
//!
//! Holds the connection pool, the schema registry and the protocol tag. All
//! writes go through a [`Unit`]; the `LedgerStore` methods that write open
//! and commit a unit of their own.
//!
//! # Usage
//! ```rust,no_run
//! use dotadb_storage::LedgerStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = LedgerStore::open("./dotadb.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = LedgerStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use dotadb_core::{LedgerConfig, LedgerError, StatusLocks};

use crate::error::classify;
use crate::registry::SchemaRegistry;
use crate::schema::{CREATE_DEPLOY, CREATE_INDEXER_STATUS, DEPLOY, INDEXER_STATUS};
use crate::unit::Unit;

/// State shared by the store and every unit it opens.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) registry: SchemaRegistry,
    pub(crate) protocol: String,
    pub(crate) total_supply_timeout: Duration,
    pub(crate) status_locks: StatusLocks,
}

/// Handle to the ledger database. Cheap to clone.
#[derive(Clone)]
pub struct LedgerStore {
    pool: SqlitePool,
    shared: Arc<Shared>,
}

impl LedgerStore {
    /// Connect using a full configuration and create the global relations.
    pub async fn connect(config: &LedgerConfig) -> Result<Self, LedgerError> {
        config.validate()?;
        let in_memory = config.is_in_memory();

        let url = if config.database_url.starts_with("sqlite:") {
            config.database_url.clone()
        } else {
            format!("sqlite:{}?mode=rwc", config.database_url)
        };
        let mut options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| LedgerError::Config(format!("database_url: {e}")))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));
        if config.wal && !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // An in-memory database lives exactly as long as its one connection.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(config.max_connections)
        };
        let pool = pool_options
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| classify("connect", e))?;

        let store = Self {
            pool,
            shared: Arc::new(Shared {
                registry: SchemaRegistry::new(),
                protocol: config.protocol.clone(),
                total_supply_timeout: Duration::from_millis(config.total_supply_timeout_ms),
                status_locks: StatusLocks::new(),
            }),
        };
        store.init_schema().await?;
        debug!(url = %config.database_url, protocol = %config.protocol, "ledger store opened");
        Ok(store)
    }

    /// Open (or create) a SQLite database at `path` with default settings.
    ///
    /// The path may be a plain file path (`"./dotadb.db"`) or a full
    /// SQLite URL (`"sqlite:./dotadb.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, LedgerError> {
        Self::connect(&LedgerConfig {
            database_url: path.to_string(),
            ..Default::default()
        })
        .await
    }

    /// Open an in-memory database. All data is lost when the store is dropped.
    pub async fn in_memory() -> Result<Self, LedgerError> {
        Self::connect(&LedgerConfig::in_memory()).await
    }

    async fn init_schema(&self) -> Result<(), LedgerError> {
        for (relation, ddl) in [(DEPLOY, CREATE_DEPLOY), (INDEXER_STATUS, CREATE_INDEXER_STATUS)] {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(|e| classify(relation, e))?;
        }
        Ok(())
    }

    /// Protocol tag whose status row this store reads and writes.
    pub fn protocol(&self) -> &str {
        &self.shared.protocol
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.shared.registry
    }

    pub(crate) fn status_locks(&self) -> &StatusLocks {
        &self.shared.status_locks
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open an outer unit.
    pub async fn begin(&self) -> Result<Unit<'static>, LedgerError> {
        let tx = self.pool.begin().await.map_err(|e| classify("begin", e))?;
        Ok(Unit::new(tx, self.shared.clone()))
    }

    /// Run `f` in a fresh outer unit: commit if it returns `Ok`, roll back
    /// every write it made if it returns `Err`.
    ///
    /// ```rust,no_run
    /// # use dotadb_storage::LedgerStore;
    /// # use dotadb_core::{Balance, Tick};
    /// # async fn example(store: LedgerStore, tick: Tick, balances: Vec<Balance>) -> dotadb_core::Result<()> {
    /// store
    ///     .with_unit(move |unit| Box::pin(async move { unit.upsert_balances(&tick, &balances).await }))
    ///     .await
    /// # }
    /// ```
    pub async fn with_unit<T, F>(&self, f: F) -> Result<T, LedgerError>
    where
        F: for<'u> FnOnce(&'u mut Unit<'static>) -> BoxFuture<'u, Result<T, LedgerError>>,
    {
        let mut unit = self.begin().await?;
        match f(&mut unit).await {
            Ok(value) => {
                unit.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = unit.rollback().await {
                    warn!(error = %rollback_err, "rollback failed after unit error");
                }
                Err(err)
            }
        }
    }

    /// Close all pooled connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
