//! Balance ledger: current balances and approvals, overwritten by key.
//!
//! Balances are computed by the caller and stored as the authoritative value;
//! nothing here adds deltas. Total supply is the decimal sum of every stored
//! balance for a tick.

use std::time::Duration;

use bigdecimal::{BigDecimal, Zero};
use futures::TryStreamExt;
use tracing::debug;

use dotadb_core::amount::{parse_fixed, to_fixed};
use dotadb_core::{validate_entries, Approval, Balance, LedgerError, Tick};

use crate::error::classify;
use crate::store::LedgerStore;
use crate::unit::Unit;

impl Unit<'_> {
    /// Insert or overwrite balances by `(user, tick)`. Last value wins.
    pub async fn upsert_balances(&mut self, tick: &Tick, balances: &[Balance]) -> Result<(), LedgerError> {
        validate_entries(tick, balances)?;
        if balances.is_empty() {
            return Ok(());
        }
        let schema = self.schema(tick);
        let mut sp = self.nested().await?;
        for entry in balances {
            sqlx::query(&schema.upsert_balance)
                .bind(&entry.user)
                .bind(tick.as_str())
                .bind(to_fixed(&entry.balance))
                .execute(sp.conn())
                .await
                .map_err(|e| classify(&schema.currency, e))?;
        }
        sp.commit().await?;

        debug!(tick = %tick, count = balances.len(), "balances upserted");
        Ok(())
    }

    /// Insert or overwrite allowances by `(user, from_address)`.
    pub async fn upsert_approve(&mut self, tick: &Tick, approvals: &[Approval]) -> Result<(), LedgerError> {
        validate_entries(tick, approvals)?;
        if approvals.is_empty() {
            return Ok(());
        }
        let schema = self.schema(tick);
        let mut sp = self.nested().await?;
        for entry in approvals {
            sqlx::query(&schema.upsert_approve)
                .bind(&entry.user)
                .bind(&entry.from_address)
                .bind(tick.as_str())
                .bind(to_fixed(&entry.amount))
                .execute(sp.conn())
                .await
                .map_err(|e| classify(&schema.approve, e))?;
        }
        sp.commit().await?;

        debug!(tick = %tick, count = approvals.len(), "approvals upserted");
        Ok(())
    }

    pub async fn get_balance(&mut self, tick: &Tick, user: &str) -> Result<Option<BigDecimal>, LedgerError> {
        let schema = self.schema(tick);
        let stored: Option<String> = sqlx::query_scalar(&schema.select_balance)
            .bind(user)
            .bind(tick.as_str())
            .fetch_optional(self.conn())
            .await
            .map_err(|e| classify(&schema.currency, e))?;
        stored.map(|text| parse_fixed(&schema.currency, &text)).transpose()
    }

    pub async fn get_approval(
        &mut self,
        tick: &Tick,
        user: &str,
        from_address: &str,
    ) -> Result<Option<BigDecimal>, LedgerError> {
        let schema = self.schema(tick);
        let stored: Option<String> = sqlx::query_scalar(&schema.select_approval)
            .bind(user)
            .bind(from_address)
            .fetch_optional(self.conn())
            .await
            .map_err(|e| classify(&schema.approve, e))?;
        stored.map(|text| parse_fixed(&schema.approve, &text)).transpose()
    }

    /// Sum of all balances of the tick; zero when it has none.
    pub async fn get_total_supply(&mut self, tick: &Tick) -> Result<BigDecimal, LedgerError> {
        let timeout = self.default_scan_timeout();
        self.get_total_supply_with_timeout(tick, timeout).await
    }

    /// [`Unit::get_total_supply`] with an explicit bound on the scan.
    pub async fn get_total_supply_with_timeout(
        &mut self,
        tick: &Tick,
        timeout: Duration,
    ) -> Result<BigDecimal, LedgerError> {
        let elapsed = || LedgerError::Timeout {
            operation: format!("total supply of '{tick}'"),
            millis: timeout.as_millis() as u64,
        };
        // A zero deadline has passed before the scan starts.
        if timeout.is_zero() {
            return Err(elapsed());
        }
        tokio::time::timeout(timeout, self.sum_balances(tick))
            .await
            .map_err(|_| elapsed())?
    }

    async fn sum_balances(&mut self, tick: &Tick) -> Result<BigDecimal, LedgerError> {
        let schema = self.schema(tick);
        let mut rows = sqlx::query_scalar::<_, String>(&schema.select_balances)
            .bind(tick.as_str())
            .fetch(self.conn());

        let mut total = BigDecimal::zero();
        let mut count = 0usize;
        while let Some(text) = rows.try_next().await.map_err(|e| classify(&schema.currency, e))? {
            total += parse_fixed(&schema.currency, &text)?;
            count += 1;
        }
        debug!(tick = %tick, holders = count, total = %total, "total supply computed");
        Ok(total)
    }
}

impl LedgerStore {
    pub async fn upsert_balances(&self, tick: &Tick, balances: &[Balance]) -> Result<(), LedgerError> {
        let mut unit = self.begin().await?;
        unit.upsert_balances(tick, balances).await?;
        unit.commit().await
    }

    pub async fn upsert_approve(&self, tick: &Tick, approvals: &[Approval]) -> Result<(), LedgerError> {
        let mut unit = self.begin().await?;
        unit.upsert_approve(tick, approvals).await?;
        unit.commit().await
    }

    pub async fn get_balance(&self, tick: &Tick, user: &str) -> Result<Option<BigDecimal>, LedgerError> {
        self.begin().await?.get_balance(tick, user).await
    }

    pub async fn get_approval(
        &self,
        tick: &Tick,
        user: &str,
        from_address: &str,
    ) -> Result<Option<BigDecimal>, LedgerError> {
        self.begin().await?.get_approval(tick, user, from_address).await
    }

    pub async fn get_total_supply(&self, tick: &Tick) -> Result<BigDecimal, LedgerError> {
        self.begin().await?.get_total_supply(tick).await
    }

    pub async fn get_total_supply_with_timeout(
        &self,
        tick: &Tick,
        timeout: Duration,
    ) -> Result<BigDecimal, LedgerError> {
        self.begin().await?.get_total_supply_with_timeout(tick, timeout).await
    }
}
