//! Event store: append-only deploy, mint, transfer and approve-history rows.
//!
//! Every row is keyed by its chain position. Re-submitting an event that is
//! already stored fails with [`LedgerError::Conflict`], which callers treat as
//! "already applied". Existing rows are never modified here.

use bigdecimal::BigDecimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::debug;

use dotadb_core::amount::{parse_fixed, to_fixed};
use dotadb_core::{
    validate_entries, ApproveRecord, ChainPosition, Deploy, LedgerError, Mint, Tick, TickEntry, Transfer,
};

use crate::error::{classify, to_sql_int};
use crate::schema::{TickSchema, DEPLOY, INSERT_DEPLOY, SELECT_DEPLOY};
use crate::store::LedgerStore;
use crate::unit::Unit;

impl Unit<'_> {
    /// Insert the deploy row for a tick.
    pub async fn record_deploy(&mut self, deploy: &Deploy) -> Result<(), LedgerError> {
        deploy.check()?;
        let p = &deploy.position;
        let mut sp = self.nested().await?;
        sqlx::query(INSERT_DEPLOY)
            .bind(to_sql_int("block_height", p.block_height)?)
            .bind(p.extrinsic_index)
            .bind(p.batchall_index)
            .bind(p.remark_index)
            .bind(deploy.tick.as_str())
            .bind(&deploy.deployer)
            .bind(&deploy.block_hash)
            .bind(&deploy.protocol)
            .bind(&deploy.op)
            .bind(deploy.decimals)
            .bind(&deploy.mode)
            .bind(deploy.amt.as_ref().map(to_fixed))
            .bind(to_sql_int("start", deploy.start)?)
            .bind(deploy.end.map(|end| to_sql_int("end", end)).transpose()?)
            .bind(deploy.max.as_ref().map(to_fixed))
            .bind(deploy.lim.as_ref().map(to_fixed))
            .bind(&deploy.admin)
            .bind(&deploy.memo)
            .execute(sp.conn())
            .await
            .map_err(|e| classify(DEPLOY, e))?;
        sp.commit().await?;

        debug!(tick = %deploy.tick, block = p.block_height, "deploy recorded");
        Ok(())
    }

    /// Append mint rows. All-or-nothing for the call.
    pub async fn record_mint(&mut self, tick: &Tick, mints: &[Mint]) -> Result<(), LedgerError> {
        validate_entries(tick, mints)?;
        if mints.is_empty() {
            return Ok(());
        }
        let schema = self.schema(tick);
        let mut sp = self.nested().await?;
        for mint in mints {
            let p = &mint.position;
            sqlx::query(&schema.insert_mint)
                .bind(&mint.signer)
                .bind(to_sql_int("block_height", p.block_height)?)
                .bind(p.extrinsic_index)
                .bind(p.batchall_index)
                .bind(p.remark_index)
                .bind(&mint.to)
                .bind(&mint.block_hash)
                .bind(&mint.extrinsic_hash)
                .bind(&mint.protocol)
                .bind(&mint.op)
                .bind(tick.as_str())
                .bind(to_fixed(&mint.lim))
                .bind(&mint.memo)
                .execute(sp.conn())
                .await
                .map_err(|e| classify(&schema.mint, e))?;
        }
        sp.commit().await?;

        debug!(tick = %tick, count = mints.len(), "mints recorded");
        Ok(())
    }

    /// Append transfer rows. All-or-nothing for the call.
    pub async fn record_transfer(&mut self, tick: &Tick, transfers: &[Transfer]) -> Result<(), LedgerError> {
        validate_entries(tick, transfers)?;
        if transfers.is_empty() {
            return Ok(());
        }
        let schema = self.schema(tick);
        let mut sp = self.nested().await?;
        for transfer in transfers {
            let p = &transfer.position;
            sqlx::query(&schema.insert_transfer)
                .bind(to_sql_int("block_height", p.block_height)?)
                .bind(p.extrinsic_index)
                .bind(p.batchall_index)
                .bind(p.remark_index)
                .bind(&transfer.from)
                .bind(&transfer.to)
                .bind(&transfer.block_hash)
                .bind(&transfer.extrinsic_hash)
                .bind(&transfer.user)
                .bind(to_fixed(&transfer.amount))
                .bind(tick.as_str())
                .bind(transfer.kind.code())
                .bind(&transfer.memo)
                .execute(sp.conn())
                .await
                .map_err(|e| classify(&schema.transfer, e))?;
        }
        sp.commit().await?;

        debug!(tick = %tick, count = transfers.len(), "transfers recorded");
        Ok(())
    }

    /// Append approve audit rows. All-or-nothing for the call.
    pub async fn record_approve_history(
        &mut self,
        tick: &Tick,
        entries: &[ApproveRecord],
    ) -> Result<(), LedgerError> {
        validate_entries(tick, entries)?;
        if entries.is_empty() {
            return Ok(());
        }
        let schema = self.schema(tick);
        let mut sp = self.nested().await?;
        for entry in entries {
            let p = &entry.position;
            sqlx::query(&schema.insert_approve_history)
                .bind(&entry.user)
                .bind(&entry.from)
                .bind(to_sql_int("block_height", p.block_height)?)
                .bind(p.extrinsic_index)
                .bind(p.batchall_index)
                .bind(p.remark_index)
                .bind(tick.as_str())
                .bind(to_fixed(&entry.amount))
                .bind(&entry.memo)
                .bind(&entry.block_hash)
                .execute(sp.conn())
                .await
                .map_err(|e| classify(&schema.approve_history, e))?;
        }
        sp.commit().await?;

        debug!(tick = %tick, count = entries.len(), "approve history recorded");
        Ok(())
    }

    pub async fn get_deploy(&mut self, tick: &Tick) -> Result<Option<Deploy>, LedgerError> {
        let row = sqlx::query(SELECT_DEPLOY)
            .bind(tick.as_str())
            .fetch_optional(self.conn())
            .await
            .map_err(|e| classify(DEPLOY, e))?;
        row.as_ref().map(deploy_from_row).transpose()
    }

    pub async fn count_mints(&mut self, tick: &Tick) -> Result<u64, LedgerError> {
        let schema = self.schema(tick);
        count_rows(self.conn(), &schema.mint).await
    }

    pub async fn count_transfers(&mut self, tick: &Tick) -> Result<u64, LedgerError> {
        let schema = self.schema(tick);
        count_rows(self.conn(), &schema.transfer).await
    }

    pub async fn count_approve_history(&mut self, tick: &Tick) -> Result<u64, LedgerError> {
        let schema = self.schema(tick);
        count_rows(self.conn(), &schema.approve_history).await
    }
}

impl LedgerStore {
    pub async fn record_deploy(&self, deploy: &Deploy) -> Result<(), LedgerError> {
        let mut unit = self.begin().await?;
        unit.record_deploy(deploy).await?;
        unit.commit().await
    }

    pub async fn record_mint(&self, tick: &Tick, mints: &[Mint]) -> Result<(), LedgerError> {
        let mut unit = self.begin().await?;
        unit.record_mint(tick, mints).await?;
        unit.commit().await
    }

    pub async fn record_transfer(&self, tick: &Tick, transfers: &[Transfer]) -> Result<(), LedgerError> {
        let mut unit = self.begin().await?;
        unit.record_transfer(tick, transfers).await?;
        unit.commit().await
    }

    pub async fn record_approve_history(&self, tick: &Tick, entries: &[ApproveRecord]) -> Result<(), LedgerError> {
        let mut unit = self.begin().await?;
        unit.record_approve_history(tick, entries).await?;
        unit.commit().await
    }

    pub async fn get_deploy(&self, tick: &Tick) -> Result<Option<Deploy>, LedgerError> {
        self.begin().await?.get_deploy(tick).await
    }

    pub async fn count_mints(&self, tick: &Tick) -> Result<u64, LedgerError> {
        self.begin().await?.count_mints(tick).await
    }

    pub async fn count_transfers(&self, tick: &Tick) -> Result<u64, LedgerError> {
        self.begin().await?.count_transfers(tick).await
    }

    pub async fn count_approve_history(&self, tick: &Tick) -> Result<u64, LedgerError> {
        self.begin().await?.count_approve_history(tick).await
    }
}

async fn count_rows(conn: &mut SqliteConnection, relation: &str) -> Result<u64, LedgerError> {
    let count: i64 = sqlx::query_scalar(&TickSchema::count_statement(relation))
        .fetch_one(conn)
        .await
        .map_err(|e| classify(relation, e))?;
    Ok(count as u64)
}

fn deploy_from_row(row: &SqliteRow) -> Result<Deploy, LedgerError> {
    let col = |e: sqlx::Error| classify(DEPLOY, e);
    let amount = |name: &str| -> Result<Option<BigDecimal>, LedgerError> {
        row.try_get::<Option<String>, _>(name)
            .map_err(col)?
            .map(|text| parse_fixed(name, &text))
            .transpose()
    };

    let position = ChainPosition::new(
        row.try_get::<i64, _>("block_height").map_err(col)? as u64,
        row.try_get("extrinsic_index").map_err(col)?,
        row.try_get("batchall_index").map_err(col)?,
        row.try_get("remark_index").map_err(col)?,
    );

    Ok(Deploy {
        tick: Tick::new(row.try_get::<String, _>("tick").map_err(col)?)?,
        deployer: row.try_get("deployer").map_err(col)?,
        position,
        block_hash: row.try_get("block_hash").map_err(col)?,
        protocol: row.try_get("p").map_err(col)?,
        op: row.try_get("op").map_err(col)?,
        decimals: row.try_get("decimal").map_err(col)?,
        mode: row.try_get("mode").map_err(col)?,
        amt: amount("amt")?,
        start: row.try_get::<i64, _>("start").map_err(col)? as u64,
        end: row.try_get::<Option<i64>, _>("end").map_err(col)?.map(|end| end as u64),
        max: amount("max")?,
        lim: amount("lim")?,
        admin: row.try_get("admin").map_err(col)?,
        memo: row.try_get("memo").map_err(col)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dotadb_core::TransferKind;

    fn dota() -> Tick {
        Tick::new("dota").unwrap()
    }

    async fn store() -> LedgerStore {
        let store = LedgerStore::in_memory().await.unwrap();
        store.ensure_tick(&dota()).await.unwrap();
        store
    }

    fn mint(height: u64, lim: i64) -> Mint {
        Mint::new(dota(), "alice", "alice", lim.into(), ChainPosition::at(height, 1))
            .with_hashes(format!("0xb{height}"), format!("0xe{height}"))
    }

    #[tokio::test]
    async fn deploy_reads_back() {
        let store = store().await;
        let mut deploy = Deploy::new(dota(), "deployer", ChainPosition::at(7, 2), "0xb7", 7);
        deploy.amt = Some(BigDecimal::from(21_000_000));
        deploy.lim = Some("1000.5".parse().unwrap());
        deploy.end = Some(99);
        deploy.memo = Some("hello".into());
        store.record_deploy(&deploy).await.unwrap();

        let loaded = store.get_deploy(&dota()).await.unwrap().unwrap();
        assert_eq!(loaded, deploy);
        assert!(store.get_deploy(&Tick::new("none").unwrap()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn second_deploy_for_tick_conflicts() {
        let store = store().await;
        store
            .record_deploy(&Deploy::new(dota(), "a", ChainPosition::at(1, 0), "0x1", 1))
            .await
            .unwrap();
        let err = store
            .record_deploy(&Deploy::new(dota(), "b", ChainPosition::at(2, 0), "0x2", 2))
            .await
            .unwrap_err();
        assert!(err.is_conflict(), "{err}");
    }

    #[tokio::test]
    async fn replayed_mint_conflicts_and_batch_is_atomic() {
        let store = store().await;
        store.record_mint(&dota(), &[mint(1, 50)]).await.unwrap();

        // The second entry collides with the stored one, so the first is undone too.
        let err = store
            .record_mint(&dota(), &[mint(2, 50), mint(1, 50)])
            .await
            .unwrap_err();
        assert!(err.is_conflict(), "{err}");
        assert_eq!(store.count_mints(&dota()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn invalid_entry_rejects_whole_call() {
        let store = store().await;
        let err = store
            .record_mint(&dota(), &[mint(1, 50), mint(2, 0)])
            .await
            .unwrap_err();
        assert!(err.is_validation(), "{err}");
        assert_eq!(store.count_mints(&dota()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn transfers_and_history_append() {
        let store = store().await;
        let transfers = vec![
            Transfer::new(dota(), "alice", "bob", 10.into(), ChainPosition::at(3, 0)),
            Transfer::new(dota(), "alice", "carol", 5.into(), ChainPosition::at(3, 1)).delegated("bob"),
        ];
        store.record_transfer(&dota(), &transfers).await.unwrap();
        store
            .record_approve_history(
                &dota(),
                &[ApproveRecord::new(dota(), "bob", "alice", 20.into(), ChainPosition::at(2, 0))],
            )
            .await
            .unwrap();

        assert_eq!(store.count_transfers(&dota()).await.unwrap(), 2);
        assert_eq!(store.count_approve_history(&dota()).await.unwrap(), 1);

        let kind: i64 = sqlx::query_scalar(r#"SELECT "type" FROM "dota_transfer" WHERE "to" = 'carol'"#)
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(TransferKind::from_code(kind), Some(TransferKind::TransferFrom));
    }

    #[tokio::test]
    async fn empty_call_is_a_no_op() {
        let store = store().await;
        store.record_mint(&dota(), &[]).await.unwrap();
        store.record_transfer(&dota(), &[]).await.unwrap();
        assert_eq!(store.count_mints(&dota()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_relations_surface_as_schema_error() {
        let store = LedgerStore::in_memory().await.unwrap();
        let err = store.record_mint(&dota(), &[mint(1, 50)]).await.unwrap_err();
        assert!(matches!(err, LedgerError::Schema { .. }), "{err}");
    }

    #[tokio::test]
    async fn replayed_transfer_conflicts() {
        let store = store().await;
        let sent = Transfer::new(dota(), "alice", "bob", 10.into(), ChainPosition::at(4, 0));
        store.record_transfer(&dota(), &[sent.clone()]).await.unwrap();

        let fresh = Transfer::new(dota(), "bob", "carol", 1.into(), ChainPosition::at(5, 0));
        let err = store.record_transfer(&dota(), &[fresh, sent]).await.unwrap_err();
        assert!(err.is_conflict(), "{err}");
        assert_eq!(store.count_transfers(&dota()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn replayed_approve_history_conflicts() {
        let store = store().await;
        let entry = ApproveRecord::new(dota(), "bob", "alice", 20.into(), ChainPosition::at(6, 0));
        store.record_approve_history(&dota(), &[entry.clone()]).await.unwrap();

        let err = store.record_approve_history(&dota(), &[entry]).await.unwrap_err();
        assert!(err.is_conflict(), "{err}");
        assert_eq!(store.count_approve_history(&dota()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn transfer_for_another_tick_is_rejected() {
        let store = store().await;
        let other = Tick::new("dotb").unwrap();
        let err = store
            .record_transfer(
                &dota(),
                &[Transfer::new(other, "alice", "bob", 10.into(), ChainPosition::at(4, 0))],
            )
            .await
            .unwrap_err();
        match err {
            LedgerError::Validation { field, .. } => assert_eq!(field, "[0].tick"),
            other => panic!("expected Validation, got {other}"),
        }
        assert_eq!(store.count_transfers(&dota()).await.unwrap(), 0);
    }
}
