//! Store configuration.

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::telemetry::LogConfig;
use crate::types::DEFAULT_PROTOCOL;
use crate::validate::MAX_PROTOCOL_LEN;

/// Configuration for a ledger store instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// SQLite URL or plain file path. `sqlite::memory:` for an ephemeral store.
    pub database_url: String,
    /// Protocol tag owning the status row (e.g. `"dot-20"`).
    pub protocol: String,
    /// Maximum pooled connections. In-memory stores always use one.
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout_ms: u64,
    /// Enable WAL journaling for file databases.
    pub wal: bool,
    /// Default deadline for total-supply scans.
    pub total_supply_timeout_ms: u64,
    pub log: LogConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:./dotadb.db?mode=rwc".into(),
            protocol: DEFAULT_PROTOCOL.into(),
            max_connections: 5,
            connect_timeout_secs: 30,
            busy_timeout_ms: 5_000,
            wal: true,
            total_supply_timeout_ms: 10_000,
            log: LogConfig::default(),
        }
    }
}

impl LedgerConfig {
    /// An ephemeral single-connection store, for tests.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".into(),
            max_connections: 1,
            wal: false,
            ..Default::default()
        }
    }

    /// Parse a JSON document; omitted fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, LedgerError> {
        let config: Self = serde_json::from_str(json).map_err(|e| LedgerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.database_url.is_empty() {
            return Err(LedgerError::Config("database_url is empty".into()));
        }
        if self.protocol.is_empty() || self.protocol.len() > MAX_PROTOCOL_LEN {
            return Err(LedgerError::Config(format!(
                "protocol tag must be 1-{MAX_PROTOCOL_LEN} characters, got '{}'",
                self.protocol
            )));
        }
        if self.max_connections == 0 {
            return Err(LedgerError::Config("max_connections must be at least 1".into()));
        }
        if self.total_supply_timeout_ms == 0 {
            return Err(LedgerError::Config("total_supply_timeout_ms must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_overrides_defaults() {
        let cfg = LedgerConfig::from_json(r#"{ "database_url": "sqlite:/var/lib/dota.db", "busy_timeout_ms": 100 }"#)
            .unwrap();
        assert_eq!(cfg.database_url, "sqlite:/var/lib/dota.db");
        assert_eq!(cfg.busy_timeout_ms, 100);
        assert_eq!(cfg.protocol, "dot-20");
        assert!(cfg.wal);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(LedgerConfig::from_json(r#"{ "protocol": "much-too-long" }"#).is_err());
        assert!(LedgerConfig::from_json(r#"{ "max_connections": 0 }"#).is_err());
        assert!(LedgerConfig::from_json("not json").is_err());
    }

    #[test]
    fn in_memory_detection() {
        assert!(LedgerConfig::in_memory().is_in_memory());
        assert!(!LedgerConfig::default().is_in_memory());
    }
}
