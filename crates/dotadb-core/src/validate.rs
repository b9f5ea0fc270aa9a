//! Entry validation shared by every write path.
//!
//! Bulk writes validate all entries before touching the store, so a rejected
//! call never leaves a partial write behind.

use crate::amount::{check_non_negative, check_nonzero};
use crate::error::LedgerError;
use crate::tick::Tick;
use crate::types::{Approval, ApproveRecord, Balance, Deploy, Mint, Transfer};

pub const MAX_ADDRESS_LEN: usize = 64;
pub const MAX_HASH_LEN: usize = 66;
pub const MAX_PROTOCOL_LEN: usize = 8;
pub const MAX_TAG_LEN: usize = 16;

/// A record that belongs to exactly one tick.
pub trait TickEntry {
    fn tick(&self) -> &Tick;

    /// Field-level checks, independent of the target tick.
    fn check(&self) -> Result<(), LedgerError>;
}

/// Validate a bulk call: every entry must belong to `tick` and pass its own
/// checks. The first failure rejects the whole call.
pub fn validate_entries<E: TickEntry>(tick: &Tick, entries: &[E]) -> Result<(), LedgerError> {
    for (i, entry) in entries.iter().enumerate() {
        if entry.tick() != tick {
            return Err(LedgerError::validation(
                format!("[{i}].tick"),
                format!("entry tick '{}' does not match '{tick}'", entry.tick()),
            ));
        }
        entry.check().map_err(|e| match e {
            LedgerError::Validation { field, reason } => {
                LedgerError::validation(format!("[{i}].{field}"), reason)
            }
            other => other,
        })?;
    }
    Ok(())
}

pub fn check_len(field: &str, value: &str, max: usize) -> Result<(), LedgerError> {
    if value.len() > max {
        return Err(LedgerError::validation(
            field,
            format!("{} characters exceeds limit of {max}", value.len()),
        ));
    }
    Ok(())
}

fn check_account(field: &str, value: &str) -> Result<(), LedgerError> {
    if value.is_empty() {
        return Err(LedgerError::validation(field, "must not be empty"));
    }
    check_len(field, value, MAX_ADDRESS_LEN)
}

impl TickEntry for Deploy {
    fn tick(&self) -> &Tick {
        &self.tick
    }

    fn check(&self) -> Result<(), LedgerError> {
        check_account("deployer", &self.deployer)?;
        check_len("block_hash", &self.block_hash, MAX_HASH_LEN)?;
        check_len("p", &self.protocol, MAX_PROTOCOL_LEN)?;
        check_len("op", &self.op, MAX_TAG_LEN)?;
        check_len("mode", &self.mode, MAX_TAG_LEN)?;
        if let Some(admin) = &self.admin {
            check_account("admin", admin)?;
        }
        for (field, value) in [("amt", &self.amt), ("max", &self.max), ("lim", &self.lim)] {
            if let Some(value) = value {
                check_non_negative(field, value)?;
            }
        }
        if let Some(end) = self.end {
            if end < self.start {
                return Err(LedgerError::validation(
                    "end",
                    format!("mint window ends ({end}) before it starts ({})", self.start),
                ));
            }
        }
        Ok(())
    }
}

impl TickEntry for Mint {
    fn tick(&self) -> &Tick {
        &self.tick
    }

    fn check(&self) -> Result<(), LedgerError> {
        check_nonzero("lim", &self.lim)?;
        check_account("signer", &self.signer)?;
        check_account("to", &self.to)?;
        check_len("block_hash", &self.block_hash, MAX_HASH_LEN)?;
        check_len("extrinsic_hash", &self.extrinsic_hash, MAX_HASH_LEN)?;
        check_len("p", &self.protocol, MAX_PROTOCOL_LEN)?;
        check_len("op", &self.op, MAX_TAG_LEN)
    }
}

impl TickEntry for Transfer {
    fn tick(&self) -> &Tick {
        &self.tick
    }

    fn check(&self) -> Result<(), LedgerError> {
        check_nonzero("amount", &self.amount)?;
        check_account("user", &self.user)?;
        check_account("from", &self.from)?;
        check_account("to", &self.to)?;
        check_len("block_hash", &self.block_hash, MAX_HASH_LEN)?;
        check_len("extrinsic_hash", &self.extrinsic_hash, MAX_HASH_LEN)
    }
}

impl TickEntry for ApproveRecord {
    fn tick(&self) -> &Tick {
        &self.tick
    }

    fn check(&self) -> Result<(), LedgerError> {
        check_non_negative("amount", &self.amount)?;
        check_account("user", &self.user)?;
        check_account("from", &self.from)?;
        check_len("block_hash", &self.block_hash, MAX_HASH_LEN)
    }
}

impl TickEntry for Approval {
    fn tick(&self) -> &Tick {
        &self.tick
    }

    fn check(&self) -> Result<(), LedgerError> {
        check_non_negative("amount", &self.amount)?;
        check_account("user", &self.user)?;
        check_account("from_address", &self.from_address)
    }
}

impl TickEntry for Balance {
    fn tick(&self) -> &Tick {
        &self.tick
    }

    fn check(&self) -> Result<(), LedgerError> {
        check_non_negative("balance", &self.balance)?;
        check_account("user", &self.user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChainPosition;

    fn tick(s: &str) -> Tick {
        Tick::new(s).unwrap()
    }

    fn mint(t: &str, lim: i64) -> Mint {
        Mint::new(tick(t), "signer", "alice", lim.into(), ChainPosition::at(1, 0))
    }

    #[test]
    fn tick_mismatch_names_the_entry() {
        let err = validate_entries(&tick("dota"), &[mint("dota", 50), mint("dotb", 50)]).unwrap_err();
        match err {
            LedgerError::Validation { field, .. } => assert_eq!(field, "[1].tick"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn zero_lim_rejected() {
        let err = validate_entries(&tick("dota"), &[mint("dota", 50), mint("dota", 0)]).unwrap_err();
        match err {
            LedgerError::Validation { field, reason } => {
                assert_eq!(field, "[1].lim");
                assert_eq!(reason, "must be nonzero");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn zero_transfer_rejected() {
        let t = Transfer::new(tick("dota"), "a", "b", 0.into(), ChainPosition::at(1, 0));
        assert!(validate_entries(&tick("dota"), &[t]).is_err());
    }

    #[test]
    fn zero_balance_and_approval_allowed() {
        let b = Balance::new(tick("dota"), "alice", 0.into());
        let a = Approval::new(tick("dota"), "bob", "alice", 0.into());
        assert!(validate_entries(&tick("dota"), &[b]).is_ok());
        assert!(validate_entries(&tick("dota"), &[a]).is_ok());
    }

    #[test]
    fn oversized_address_rejected() {
        let b = Balance::new(tick("dota"), "x".repeat(65), 1.into());
        assert!(validate_entries(&tick("dota"), &[b]).is_err());
    }

    #[test]
    fn deploy_window_checked() {
        let mut d = Deploy::new(tick("dota"), "deployer", ChainPosition::at(1, 0), "0xabc", 100);
        d.end = Some(50);
        assert!(d.check().is_err());
        d.end = Some(1000);
        assert!(d.check().is_ok());
    }
}
