//! dotadb-core: records, validation and checkpoint tracking for the dot-20
//! ledger store.
//!
//! # Architecture
//!
//! ```text
//! crawler ─ TickBatch ─▶ Ingestor (dotadb-storage)
//!                          ├── SchemaRegistry   (per-tick relation sets)
//!                          ├── Unit / nested     (transactions, savepoints)
//!                          │     ├── event store (deploy, mint, transfer, approve history)
//!                          │     └── ledger      (balances, approvals)
//!                          └── CheckpointTracker (indexer / crawler heights)
//! ```
//!
//! This crate holds everything that does not touch SQL: the record types,
//! [`validate`] rules applied before every write, the [`LedgerError`]
//! taxonomy, configuration and the [`CheckpointTracker`].

pub mod amount;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod telemetry;
pub mod tick;
pub mod types;
pub mod validate;

pub use bigdecimal::BigDecimal;
pub use checkpoint::{CheckpointTracker, IndexerStatus, MemoryStatusStore, StatusLocks, StatusStore};
pub use config::LedgerConfig;
pub use error::{LedgerError, Result};
pub use telemetry::{init_tracing, LogConfig};
pub use tick::Tick;
pub use types::{
    Approval, ApproveRecord, Balance, ChainPosition, Deploy, Mint, Positioned, TickBatch, Transfer,
    TransferKind, DEFAULT_PROTOCOL,
};
pub use validate::{validate_entries, TickEntry};
