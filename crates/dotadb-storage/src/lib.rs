//! dotadb-storage: SQLite persistence for the dot-20 ledger.
//!
//! | Component | Module |
//! |---|---|
//! | Schema registry (`ensure_tick`, `drop_tick`, `purge_tick_data`) | [`registry`] |
//! | Event store (deploy, mint, transfer, approve history) | [`events`] |
//! | Balance ledger (balances, approvals, total supply) | [`ledger`] |
//! | Indexer status rows | [`status`] |
//! | Units of work and savepoints | [`unit`] |
//! | Batch ingestion with checkpointing | [`ingest`] |
//!
//! Every operation is available on a [`Unit`] for callers that group writes,
//! and on [`LedgerStore`] as a self-committing call.

mod error;

pub mod events;
pub mod ingest;
pub mod ledger;
pub mod registry;
pub mod schema;
pub mod status;
pub mod store;
pub mod unit;

pub use ingest::{ApplyReport, Ingestor};
pub use registry::{DropReport, SchemaRegistry};
pub use schema::TickSchema;
pub use store::LedgerStore;
pub use unit::Unit;
