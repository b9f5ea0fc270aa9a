//! Error taxonomy for the ledger store.

use thiserror::Error;

/// Errors surfaced by every ledger operation.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// An entry failed validation. Raised before anything is written.
    #[error("validation failed on '{field}': {reason}")]
    Validation { field: String, reason: String },

    #[error("invalid tick '{0}': expected 1-8 ASCII alphanumeric characters")]
    InvalidTick(String),

    /// A uniqueness constraint rejected the write. For event rows this means
    /// the event was already applied.
    #[error("conflict in '{relation}': {detail}")]
    Conflict { relation: String, detail: String },

    /// Connectivity, lock contention or pool exhaustion. Retry the whole unit.
    #[error("storage error: {0}")]
    Store(String),

    #[error("schema error on '{relation}': {reason}")]
    Schema { relation: String, reason: String },

    #[error("{operation} timed out after {millis} ms")]
    Timeout { operation: String, millis: u64 },

    #[error(
        "checkpoint for '{protocol}' cannot move from (indexer {from_indexer}, crawler {from_crawler}) \
         to (indexer {to_indexer}, crawler {to_crawler})"
    )]
    CheckpointRegression {
        protocol: String,
        from_indexer: u64,
        from_crawler: u64,
        to_indexer: u64,
        to_crawler: u64,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if a uniqueness constraint rejected the write.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns `true` if the input itself was rejected.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::InvalidTick(_))
    }

    /// Returns `true` if retrying the same unit may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_helpers() {
        let conflict = LedgerError::Conflict {
            relation: "dota_mint".into(),
            detail: "UNIQUE constraint failed".into(),
        };
        assert!(conflict.is_conflict());
        assert!(!conflict.is_retryable());

        assert!(LedgerError::Store("database is locked".into()).is_retryable());
        assert!(LedgerError::validation("lim", "must be nonzero").is_validation());
        assert!(LedgerError::InvalidTick("d-ta".into()).is_validation());
    }

    #[test]
    fn messages_name_the_relation() {
        let err = LedgerError::Schema {
            relation: "dota_currency".into(),
            reason: "no such table".into(),
        };
        assert_eq!(err.to_string(), "schema error on 'dota_currency': no such table");
    }
}
