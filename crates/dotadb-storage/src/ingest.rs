//! Batch ingestion: the path from a decoded [`TickBatch`] to committed rows
//! and an advanced checkpoint.
//!
//! For every batch: ensure the tick's relations, open a unit, append events in
//! chain-position order (an event that is already stored counts as replayed),
//! overwrite approvals and balances, commit. Once every batch of a block range
//! is committed the checkpoint moves to the end of the range. A failure before
//! that point leaves the checkpoint untouched, and re-delivering the range is
//! safe.

use std::slice;

use tracing::{debug, info};

use dotadb_core::{validate_entries, CheckpointTracker, LedgerError, Tick, TickBatch};

use crate::store::LedgerStore;
use crate::unit::Unit;

/// What one batch did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub tick: Tick,
    /// Events newly stored.
    pub inserted: usize,
    /// Events that were already stored.
    pub replayed: usize,
    pub approvals: usize,
    pub balances: usize,
}

/// Applies crawler batches and advances the store's checkpoint.
pub struct Ingestor {
    store: LedgerStore,
    tracker: CheckpointTracker,
}

impl Ingestor {
    pub fn new(store: LedgerStore) -> Self {
        let tracker = CheckpointTracker::new(Box::new(store.clone()), store.protocol());
        Self { store, tracker }
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub fn tracker(&self) -> &CheckpointTracker {
        &self.tracker
    }

    /// Apply every batch of a block range, then mark the range indexed.
    ///
    /// A range ending at or below the stored indexer height was already
    /// applied and is skipped; the result is then empty.
    pub async fn apply_range(&self, to_height: u64, batches: Vec<TickBatch>) -> Result<Vec<ApplyReport>, LedgerError> {
        if let Some(status) = self.tracker.load().await? {
            if to_height <= status.indexer_height {
                debug!(to_height, indexer_height = status.indexer_height, "range already indexed, skipping");
                return Ok(vec![]);
            }
        }
        if let Some(batch) = batches.iter().find(|b| b.to_height > to_height) {
            return Err(LedgerError::validation(
                "to_height",
                format!("batch for '{}' ends at {} past range end {to_height}", batch.tick, batch.to_height),
            ));
        }

        let mut reports = Vec::with_capacity(batches.len());
        for batch in batches {
            reports.push(self.apply(batch).await?);
        }
        let status = self.tracker.record_indexed(to_height).await?;

        info!(
            to_height,
            ticks = reports.len(),
            inserted = reports.iter().map(|r| r.inserted).sum::<usize>(),
            replayed = reports.iter().map(|r| r.replayed).sum::<usize>(),
            crawler_height = status.crawler_height,
            "range indexed"
        );
        Ok(reports)
    }

    /// Apply one batch in its own unit. Does not touch the checkpoint.
    pub async fn apply(&self, mut batch: TickBatch) -> Result<ApplyReport, LedgerError> {
        check_batch(&batch)?;
        batch.sort_by_position();

        self.store.ensure_tick(&batch.tick).await?;
        let mut unit = self.store.begin().await?;
        let report = apply_in(&mut unit, &batch).await?;
        unit.commit().await?;

        debug!(
            tick = %report.tick,
            inserted = report.inserted,
            replayed = report.replayed,
            balances = report.balances,
            "batch applied"
        );
        Ok(report)
    }
}

/// Validate the whole batch up front so a rejected batch writes nothing.
fn check_batch(batch: &TickBatch) -> Result<(), LedgerError> {
    if let Some(deploy) = &batch.deploy {
        validate_entries(&batch.tick, slice::from_ref(deploy)).map_err(|e| prefix("deploy", e))?;
    }
    validate_entries(&batch.tick, &batch.mints).map_err(|e| prefix("mints", e))?;
    validate_entries(&batch.tick, &batch.transfers).map_err(|e| prefix("transfers", e))?;
    validate_entries(&batch.tick, &batch.approve_history).map_err(|e| prefix("approve_history", e))?;
    validate_entries(&batch.tick, &batch.approvals).map_err(|e| prefix("approvals", e))?;
    validate_entries(&batch.tick, &batch.balances).map_err(|e| prefix("balances", e))
}

fn prefix(list: &str, err: LedgerError) -> LedgerError {
    match err {
        LedgerError::Validation { field, reason } => LedgerError::validation(format!("{list}{field}"), reason),
        other => other,
    }
}

async fn apply_in(unit: &mut Unit<'_>, batch: &TickBatch) -> Result<ApplyReport, LedgerError> {
    let tick = &batch.tick;
    let mut report = ApplyReport {
        tick: tick.clone(),
        inserted: 0,
        replayed: 0,
        approvals: 0,
        balances: 0,
    };

    if let Some(deploy) = &batch.deploy {
        count(&mut report, unit.record_deploy(deploy).await)?;
    }
    for mint in &batch.mints {
        count(&mut report, unit.record_mint(tick, slice::from_ref(mint)).await)?;
    }
    for transfer in &batch.transfers {
        count(&mut report, unit.record_transfer(tick, slice::from_ref(transfer)).await)?;
    }
    for entry in &batch.approve_history {
        count(&mut report, unit.record_approve_history(tick, slice::from_ref(entry)).await)?;
    }

    unit.upsert_approve(tick, &batch.approvals).await?;
    report.approvals = batch.approvals.len();
    unit.upsert_balances(tick, &batch.balances).await?;
    report.balances = batch.balances.len();

    Ok(report)
}

fn count(report: &mut ApplyReport, result: Result<(), LedgerError>) -> Result<(), LedgerError> {
    match result {
        Ok(()) => report.inserted += 1,
        Err(e) if e.is_conflict() => report.replayed += 1,
        Err(e) => return Err(e),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use dotadb_core::{BigDecimal, Balance, ChainPosition, Deploy, IndexerStatus, Mint};

    use super::*;

    fn dota() -> Tick {
        Tick::new("dota").unwrap()
    }

    fn batch(to_height: u64) -> TickBatch {
        let mut batch = TickBatch::new(dota(), to_height);
        batch.deploy = Some(Deploy::new(dota(), "deployer", ChainPosition::at(1, 0), "0x01", 1));
        batch.mints = vec![
            Mint::new(dota(), "bob", "bob", 40.into(), ChainPosition::at(3, 0)),
            Mint::new(dota(), "alice", "alice", 60.into(), ChainPosition::at(2, 0)),
        ];
        batch.balances = vec![
            Balance::new(dota(), "alice", 60.into()),
            Balance::new(dota(), "bob", 40.into()),
        ];
        batch
    }

    #[tokio::test]
    async fn replayed_batch_counts_as_replayed() {
        let ingestor = Ingestor::new(LedgerStore::in_memory().await.unwrap());
        let first = ingestor.apply(batch(3)).await.unwrap();
        assert_eq!(first.tick, dota());
        assert_eq!((first.inserted, first.replayed, first.balances), (3, 0, 2));

        let again = ingestor.apply(batch(3)).await.unwrap();
        assert_eq!((again.inserted, again.replayed), (0, 3));
        assert_eq!(ingestor.store().count_mints(&dota()).await.unwrap(), 2);
        assert_eq!(ingestor.store().get_total_supply(&dota()).await.unwrap(), BigDecimal::from(100));
    }

    #[tokio::test]
    async fn invalid_batch_writes_nothing() {
        let ingestor = Ingestor::new(LedgerStore::in_memory().await.unwrap());
        let mut bad = batch(3);
        bad.mints.push(Mint::new(dota(), "carol", "carol", 0.into(), ChainPosition::at(3, 1)));

        let err = ingestor.apply(bad).await.unwrap_err();
        match err {
            LedgerError::Validation { field, .. } => assert_eq!(field, "mints[2].lim"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(ingestor.store().get_deploy(&dota()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn range_advances_checkpoint_once() {
        let ingestor = Ingestor::new(LedgerStore::in_memory().await.unwrap());
        let reports = ingestor.apply_range(10, vec![batch(3)]).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(
            ingestor.tracker().load().await.unwrap(),
            Some(IndexerStatus::new("dot-20", 10, 10))
        );

        // Re-delivery of an indexed range is skipped outright.
        assert!(ingestor.apply_range(10, vec![batch(3)]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_past_range_end_is_rejected() {
        let ingestor = Ingestor::new(LedgerStore::in_memory().await.unwrap());
        let err = ingestor.apply_range(2, vec![batch(3)]).await.unwrap_err();
        assert!(err.is_validation(), "{err}");
        assert!(ingestor.tracker().load().await.unwrap().is_none());
    }
}
