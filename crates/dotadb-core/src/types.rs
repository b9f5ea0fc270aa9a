//! Event and state records exchanged with the store.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::tick::Tick;

/// Protocol tag stamped on records when the producer does not set one.
pub const DEFAULT_PROTOCOL: &str = "dot-20";

// ─── ChainPosition ────────────────────────────────────────────────────────────

/// Where an event sits on chain. Unique per event and used as its dedup key.
///
/// Ordering is lexicographic over the fields, which is the order events must
/// be applied in.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ChainPosition {
    pub block_height: u64,
    pub extrinsic_index: u32,
    pub batchall_index: u32,
    pub remark_index: u32,
}

impl ChainPosition {
    pub fn new(block_height: u64, extrinsic_index: u32, batchall_index: u32, remark_index: u32) -> Self {
        Self {
            block_height,
            extrinsic_index,
            batchall_index,
            remark_index,
        }
    }

    /// Position of the first remark in a block's extrinsic.
    pub fn at(block_height: u64, extrinsic_index: u32) -> Self {
        Self::new(block_height, extrinsic_index, 0, 0)
    }
}

/// Records that occupy a chain position.
pub trait Positioned {
    fn position(&self) -> ChainPosition;
}

// ─── Deploy ───────────────────────────────────────────────────────────────────

/// The deploy of a tick. One per tick, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deploy {
    pub tick: Tick,
    pub deployer: String,
    pub position: ChainPosition,
    pub block_hash: String,
    pub protocol: String,
    pub op: String,
    pub decimals: u32,
    /// Mint mode, e.g. `fair`.
    pub mode: String,
    pub amt: Option<BigDecimal>,
    /// First block of the mint window.
    pub start: u64,
    /// Last block of the mint window, if bounded.
    pub end: Option<u64>,
    pub max: Option<BigDecimal>,
    /// Per-mint limit.
    pub lim: Option<BigDecimal>,
    pub admin: Option<String>,
    pub memo: Option<String>,
}

impl Deploy {
    /// A `fair` mode deploy with protocol defaults and no supply fields set.
    pub fn new(
        tick: Tick,
        deployer: impl Into<String>,
        position: ChainPosition,
        block_hash: impl Into<String>,
        start: u64,
    ) -> Self {
        Self {
            tick,
            deployer: deployer.into(),
            position,
            block_hash: block_hash.into(),
            protocol: DEFAULT_PROTOCOL.into(),
            op: "deploy".into(),
            decimals: 18,
            mode: "fair".into(),
            amt: None,
            start,
            end: None,
            max: None,
            lim: None,
            admin: None,
            memo: None,
        }
    }
}

// ─── Mint ─────────────────────────────────────────────────────────────────────

/// A claim against a tick's mint allowance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mint {
    pub tick: Tick,
    pub signer: String,
    pub to: String,
    pub lim: BigDecimal,
    pub position: ChainPosition,
    pub block_hash: String,
    pub extrinsic_hash: String,
    pub protocol: String,
    pub op: String,
    pub memo: Option<String>,
}

impl Mint {
    pub fn new(
        tick: Tick,
        signer: impl Into<String>,
        to: impl Into<String>,
        lim: BigDecimal,
        position: ChainPosition,
    ) -> Self {
        Self {
            tick,
            signer: signer.into(),
            to: to.into(),
            lim,
            position,
            block_hash: String::new(),
            extrinsic_hash: String::new(),
            protocol: DEFAULT_PROTOCOL.into(),
            op: "mint".into(),
            memo: None,
        }
    }

    pub fn with_hashes(mut self, block_hash: impl Into<String>, extrinsic_hash: impl Into<String>) -> Self {
        self.block_hash = block_hash.into();
        self.extrinsic_hash = extrinsic_hash.into();
        self
    }
}

impl Positioned for Mint {
    fn position(&self) -> ChainPosition {
        self.position
    }
}

// ─── Transfer ─────────────────────────────────────────────────────────────────

/// Whether value moved by the owner or by an approved spender.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    #[default]
    Transfer,
    TransferFrom,
}

impl TransferKind {
    /// Value of the `type` column.
    pub fn code(self) -> i64 {
        match self {
            Self::Transfer => 0,
            Self::TransferFrom => 1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Transfer),
            1 => Some(Self::TransferFrom),
            _ => None,
        }
    }
}

/// A value movement between two accounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub tick: Tick,
    /// Account that signed the extrinsic.
    pub user: String,
    pub from: String,
    pub to: String,
    pub amount: BigDecimal,
    pub kind: TransferKind,
    pub position: ChainPosition,
    pub block_hash: String,
    pub extrinsic_hash: String,
    pub memo: Option<String>,
}

impl Transfer {
    pub fn new(
        tick: Tick,
        from: impl Into<String>,
        to: impl Into<String>,
        amount: BigDecimal,
        position: ChainPosition,
    ) -> Self {
        let from = from.into();
        Self {
            tick,
            user: from.clone(),
            from,
            to: to.into(),
            amount,
            kind: TransferKind::Transfer,
            position,
            block_hash: String::new(),
            extrinsic_hash: String::new(),
            memo: None,
        }
    }

    /// A spend by `spender` out of `from`'s allowance.
    pub fn delegated(mut self, spender: impl Into<String>) -> Self {
        self.user = spender.into();
        self.kind = TransferKind::TransferFrom;
        self
    }
}

impl Positioned for Transfer {
    fn position(&self) -> ChainPosition {
        self.position
    }
}

// ─── Approvals ────────────────────────────────────────────────────────────────

/// Current allowance that `from_address` granted to `user`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approval {
    pub tick: Tick,
    pub user: String,
    pub from_address: String,
    pub amount: BigDecimal,
}

impl Approval {
    pub fn new(tick: Tick, user: impl Into<String>, from_address: impl Into<String>, amount: BigDecimal) -> Self {
        Self {
            tick,
            user: user.into(),
            from_address: from_address.into(),
            amount,
        }
    }
}

/// One approve event in the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApproveRecord {
    pub tick: Tick,
    pub user: String,
    pub from: String,
    pub amount: BigDecimal,
    pub position: ChainPosition,
    pub block_hash: String,
    pub memo: Option<String>,
}

impl ApproveRecord {
    pub fn new(
        tick: Tick,
        user: impl Into<String>,
        from: impl Into<String>,
        amount: BigDecimal,
        position: ChainPosition,
    ) -> Self {
        Self {
            tick,
            user: user.into(),
            from: from.into(),
            amount,
            position,
            block_hash: String::new(),
            memo: None,
        }
    }
}

impl Positioned for ApproveRecord {
    fn position(&self) -> ChainPosition {
        self.position
    }
}

// ─── Balance ──────────────────────────────────────────────────────────────────

/// Authoritative balance of `user` after the latest applied event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub tick: Tick,
    pub user: String,
    pub balance: BigDecimal,
}

impl Balance {
    pub fn new(tick: Tick, user: impl Into<String>, balance: BigDecimal) -> Self {
        Self {
            tick,
            user: user.into(),
            balance,
        }
    }
}

// ─── TickBatch ────────────────────────────────────────────────────────────────

/// Decoded events and recomputed state for one tick over a block range,
/// as handed over by the crawler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickBatch {
    pub tick: Tick,
    /// Last block covered by this batch.
    pub to_height: u64,
    pub deploy: Option<Deploy>,
    #[serde(default)]
    pub mints: Vec<Mint>,
    #[serde(default)]
    pub transfers: Vec<Transfer>,
    #[serde(default)]
    pub approve_history: Vec<ApproveRecord>,
    #[serde(default)]
    pub approvals: Vec<Approval>,
    #[serde(default)]
    pub balances: Vec<Balance>,
}

impl TickBatch {
    pub fn new(tick: Tick, to_height: u64) -> Self {
        Self {
            tick,
            to_height,
            deploy: None,
            mints: vec![],
            transfers: vec![],
            approve_history: vec![],
            approvals: vec![],
            balances: vec![],
        }
    }

    /// Sort every event list by chain position.
    pub fn sort_by_position(&mut self) {
        self.mints.sort_by_key(Positioned::position);
        self.transfers.sort_by_key(Positioned::position);
        self.approve_history.sort_by_key(Positioned::position);
    }

    pub fn event_count(&self) -> usize {
        usize::from(self.deploy.is_some())
            + self.mints.len()
            + self.transfers.len()
            + self.approve_history.len()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn dota() -> Tick {
        Tick::new("dota").unwrap()
    }

    #[test]
    fn positions_order_lexicographically() {
        let a = ChainPosition::new(10, 2, 0, 5);
        let b = ChainPosition::new(10, 3, 0, 0);
        let c = ChainPosition::new(11, 0, 0, 0);
        assert!(a < b && b < c);
        assert_eq!(ChainPosition::at(10, 2), ChainPosition::new(10, 2, 0, 0));
    }

    #[test]
    fn transfer_kind_codes() {
        assert_eq!(TransferKind::Transfer.code(), 0);
        assert_eq!(TransferKind::from_code(1), Some(TransferKind::TransferFrom));
        assert_eq!(TransferKind::from_code(7), None);
    }

    #[test]
    fn delegated_transfer_records_spender() {
        let t = Transfer::new(dota(), "alice", "bob", 5.into(), ChainPosition::at(1, 0)).delegated("carol");
        assert_eq!(t.user, "carol");
        assert_eq!(t.from, "alice");
        assert_eq!(t.kind, TransferKind::TransferFrom);
    }

    #[test]
    fn batch_sorts_events() {
        let mut batch = TickBatch::new(dota(), 20);
        batch.mints.push(Mint::new(dota(), "s", "b", 1.into(), ChainPosition::at(20, 1)));
        batch.mints.push(Mint::new(dota(), "s", "a", 1.into(), ChainPosition::at(19, 4)));
        batch.sort_by_position();
        assert_eq!(batch.mints[0].to, "a");
        assert_eq!(batch.event_count(), 2);
    }
}
