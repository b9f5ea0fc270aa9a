//! Mapping of `sqlx` failures onto the ledger error taxonomy.

use dotadb_core::LedgerError;

// Extended result codes for SQLITE_CONSTRAINT_PRIMARYKEY / SQLITE_CONSTRAINT_UNIQUE.
const SQLITE_CONSTRAINT_PRIMARYKEY: &str = "1555";
const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";

/// Classify a driver error raised while working on `relation`.
///
/// Uniqueness violations become [`LedgerError::Conflict`], a missing relation
/// becomes [`LedgerError::Schema`] and everything else is treated as a
/// transient [`LedgerError::Store`] failure.
pub(crate) fn classify(relation: &str, err: sqlx::Error) -> LedgerError {
    if let sqlx::Error::Database(db) = &err {
        let code = db.code();
        if db.is_unique_violation()
            || matches!(code.as_deref(), Some(SQLITE_CONSTRAINT_PRIMARYKEY | SQLITE_CONSTRAINT_UNIQUE))
        {
            return LedgerError::Conflict {
                relation: relation.to_string(),
                detail: db.message().to_string(),
            };
        }
        if db.message().contains("no such table") {
            return LedgerError::Schema {
                relation: relation.to_string(),
                reason: db.message().to_string(),
            };
        }
    }
    LedgerError::Store(format!("{relation}: {err}"))
}

/// Heights are unsigned on chain but SQLite integers are signed.
pub(crate) fn to_sql_int(field: &str, value: u64) -> Result<i64, LedgerError> {
    i64::try_from(value).map_err(|_| LedgerError::validation(field, format!("{value} exceeds i64::MAX")))
}
