//! Relation definitions.
//!
//! Global relations (`deploy`, `indexer_status`) are fixed. Per-tick relations
//! are produced by [`TickSchema`], a template instantiated once per tick that
//! carries the tick's relation names and every statement run against them.

use dotadb_core::Tick;

pub const DEPLOY: &str = "deploy";
pub const INDEXER_STATUS: &str = "indexer_status";

pub(crate) const CREATE_DEPLOY: &str = r#"
CREATE TABLE IF NOT EXISTS deploy (
    block_height    INTEGER NOT NULL,
    extrinsic_index INTEGER NOT NULL,
    batchall_index  INTEGER NOT NULL,
    remark_index    INTEGER NOT NULL,
    tick            TEXT    NOT NULL,
    deployer        TEXT    NOT NULL,
    block_hash      TEXT    NOT NULL,
    p               TEXT    NOT NULL DEFAULT 'dot-20',
    op              TEXT    NOT NULL DEFAULT 'deploy',
    "decimal"       INTEGER NOT NULL DEFAULT 18,
    mode            TEXT    NOT NULL DEFAULT 'fair',
    amt             TEXT,
    "start"         INTEGER NOT NULL,
    "end"           INTEGER,
    "max"           TEXT,
    lim             TEXT,
    admin           TEXT,
    memo            TEXT,
    PRIMARY KEY (block_height, extrinsic_index, batchall_index, remark_index, tick),
    UNIQUE (block_height, extrinsic_index, batchall_index, remark_index),
    UNIQUE (tick)
);"#;

pub(crate) const CREATE_INDEXER_STATUS: &str = r#"
CREATE TABLE IF NOT EXISTS indexer_status (
    p              TEXT    NOT NULL PRIMARY KEY,
    indexer_height INTEGER NOT NULL,
    crawler_height INTEGER NOT NULL
);"#;

pub(crate) const INSERT_DEPLOY: &str = r#"
INSERT INTO deploy (
    block_height, extrinsic_index, batchall_index, remark_index, tick, deployer, block_hash,
    p, op, "decimal", mode, amt, "start", "end", "max", lim, admin, memo
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#;

pub(crate) const SELECT_DEPLOY: &str = r#"
SELECT block_height, extrinsic_index, batchall_index, remark_index, tick, deployer, block_hash,
       p, op, "decimal", mode, amt, "start", "end", "max", lim, admin, memo
FROM deploy WHERE tick = ?"#;

pub(crate) const UPSERT_STATUS: &str = r#"
INSERT INTO indexer_status (p, indexer_height, crawler_height) VALUES (?, ?, ?)
ON CONFLICT (p) DO UPDATE SET
    indexer_height = excluded.indexer_height,
    crawler_height = excluded.crawler_height"#;

pub(crate) const SELECT_STATUS: &str =
    "SELECT p, indexer_height, crawler_height FROM indexer_status WHERE p = ?";

/// Relation names and statements for one tick.
#[derive(Debug, Clone)]
pub struct TickSchema {
    pub tick: Tick,
    pub currency: String,
    pub mint: String,
    pub transfer: String,
    pub approve: String,
    pub approve_history: String,

    pub(crate) insert_mint: String,
    pub(crate) insert_transfer: String,
    pub(crate) insert_approve_history: String,
    pub(crate) upsert_balance: String,
    pub(crate) upsert_approve: String,
    pub(crate) select_balance: String,
    pub(crate) select_balances: String,
    pub(crate) select_approval: String,
}

impl TickSchema {
    pub fn new(tick: &Tick) -> Self {
        let currency = format!("{tick}_currency");
        let mint = format!("{tick}_mint");
        let transfer = format!("{tick}_transfer");
        let approve = format!("{tick}_approve");
        let approve_history = format!("{tick}_approve_history");

        Self {
            insert_mint: format!(
                r#"INSERT INTO "{mint}" (
                    signer, block_height, extrinsic_index, batchall_index, remark_index, "to",
                    block_hash, extrinsic_hash, p, op, tick, lim, memo
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#
            ),
            insert_transfer: format!(
                r#"INSERT INTO "{transfer}" (
                    block_height, extrinsic_index, batchall_index, remark_index, "from", "to",
                    block_hash, extrinsic_hash, "user", amount, tick, "type", memo
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#
            ),
            insert_approve_history: format!(
                r#"INSERT INTO "{approve_history}" (
                    "user", "from", block_height, extrinsic_index, batchall_index, remark_index,
                    tick, amount, memo, block_hash
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#
            ),
            upsert_balance: format!(
                r#"INSERT INTO "{currency}" ("user", tick, balance) VALUES (?, ?, ?)
                ON CONFLICT ("user", tick) DO UPDATE SET balance = excluded.balance"#
            ),
            upsert_approve: format!(
                r#"INSERT INTO "{approve}" ("user", from_address, tick, amount) VALUES (?, ?, ?, ?)
                ON CONFLICT ("user", from_address) DO UPDATE SET
                    tick = excluded.tick,
                    amount = excluded.amount"#
            ),
            select_balance: format!(r#"SELECT balance FROM "{currency}" WHERE "user" = ? AND tick = ?"#),
            select_balances: format!(r#"SELECT balance FROM "{currency}" WHERE tick = ?"#),
            select_approval: format!(
                r#"SELECT amount FROM "{approve}" WHERE "user" = ? AND from_address = ?"#
            ),
            tick: tick.clone(),
            currency,
            mint,
            transfer,
            approve,
            approve_history,
        }
    }

    /// The five per-tick relations, in creation order.
    pub fn relations(&self) -> [&str; 5] {
        [
            &self.currency,
            &self.mint,
            &self.transfer,
            &self.approve,
            &self.approve_history,
        ]
    }

    pub(crate) fn create_statements(&self) -> [String; 5] {
        let Self {
            currency,
            mint,
            transfer,
            approve,
            approve_history,
            ..
        } = self;
        [
            format!(
                r#"CREATE TABLE IF NOT EXISTS "{currency}" (
                    "user"  TEXT NOT NULL,
                    tick    TEXT NOT NULL,
                    balance TEXT NOT NULL,
                    PRIMARY KEY ("user", tick)
                )"#
            ),
            format!(
                r#"CREATE TABLE IF NOT EXISTS "{mint}" (
                    signer          TEXT    NOT NULL,
                    block_height    INTEGER NOT NULL,
                    extrinsic_index INTEGER NOT NULL,
                    batchall_index  INTEGER NOT NULL DEFAULT 0,
                    remark_index    INTEGER NOT NULL DEFAULT 0,
                    "to"            TEXT    NOT NULL,
                    block_hash      TEXT    NOT NULL,
                    extrinsic_hash  TEXT    NOT NULL,
                    p               TEXT    NOT NULL DEFAULT 'dot-20',
                    op              TEXT    NOT NULL DEFAULT 'mint',
                    tick            TEXT    NOT NULL,
                    lim             TEXT    NOT NULL,
                    memo            TEXT,
                    PRIMARY KEY (signer, block_height, extrinsic_index, batchall_index, remark_index, "to"),
                    UNIQUE (block_height, extrinsic_index, batchall_index, remark_index)
                )"#
            ),
            format!(
                r#"CREATE TABLE IF NOT EXISTS "{transfer}" (
                    block_height    INTEGER NOT NULL,
                    extrinsic_index INTEGER NOT NULL,
                    batchall_index  INTEGER NOT NULL,
                    remark_index    INTEGER NOT NULL,
                    "from"          TEXT    NOT NULL,
                    "to"            TEXT    NOT NULL,
                    block_hash      TEXT    NOT NULL,
                    extrinsic_hash  TEXT    NOT NULL,
                    "user"          TEXT    NOT NULL,
                    amount          TEXT    NOT NULL,
                    tick            TEXT    NOT NULL,
                    "type"          INTEGER NOT NULL DEFAULT 0,
                    memo            TEXT,
                    PRIMARY KEY (block_height, extrinsic_index, batchall_index, remark_index, "from", "to"),
                    UNIQUE (block_height, extrinsic_index, batchall_index, remark_index)
                )"#
            ),
            format!(
                r#"CREATE TABLE IF NOT EXISTS "{approve}" (
                    "user"       TEXT NOT NULL,
                    from_address TEXT NOT NULL,
                    tick         TEXT NOT NULL,
                    amount       TEXT NOT NULL,
                    PRIMARY KEY ("user", from_address)
                )"#
            ),
            format!(
                r#"CREATE TABLE IF NOT EXISTS "{approve_history}" (
                    "user"          TEXT    NOT NULL,
                    "from"          TEXT    NOT NULL,
                    block_height    INTEGER NOT NULL,
                    extrinsic_index INTEGER NOT NULL,
                    batchall_index  INTEGER NOT NULL,
                    remark_index    INTEGER NOT NULL,
                    tick            TEXT    NOT NULL,
                    amount          TEXT    NOT NULL,
                    memo            TEXT,
                    block_hash      TEXT    NOT NULL,
                    PRIMARY KEY ("user", "from", block_height, extrinsic_index, batchall_index, remark_index),
                    UNIQUE (block_height, extrinsic_index, batchall_index, remark_index)
                )"#
            ),
        ]
    }

    pub(crate) fn count_statement(relation: &str) -> String {
        format!(r#"SELECT COUNT(*) FROM "{relation}""#)
    }

    pub(crate) fn delete_statement(relation: &str) -> String {
        format!(r#"DELETE FROM "{relation}""#)
    }

    pub(crate) fn drop_statement(relation: &str) -> String {
        format!(r#"DROP TABLE IF EXISTS "{relation}""#)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relation_names_follow_tick() {
        let schema = TickSchema::new(&Tick::new("DOTA").unwrap());
        assert_eq!(
            schema.relations(),
            ["dota_currency", "dota_mint", "dota_transfer", "dota_approve", "dota_approve_history"]
        );
    }

    #[test]
    fn statements_quote_relation_names() {
        // Ticks may start with a digit, which is only valid as a quoted identifier.
        let schema = TickSchema::new(&Tick::new("1inch").unwrap());
        assert!(schema.insert_mint.contains(r#""1inch_mint""#));
        assert!(schema.create_statements()[0].contains(r#""1inch_currency""#));
    }
}
