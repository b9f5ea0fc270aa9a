//! Log subscriber setup for binaries embedding the store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::LedgerError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default level: "trace" | "debug" | "info" | "warn" | "error"
    pub level: String,
    /// Per-target overrides, e.g. `dotadb_storage = "debug"`.
    pub targets: BTreeMap<String, String>,
    /// JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            targets: BTreeMap::new(),
            json: false,
        }
    }
}

impl LogConfig {
    /// `EnvFilter` directive string, e.g. `info,dotadb_storage=debug`.
    pub fn directives(&self) -> String {
        let mut directives = self.level.clone();
        for (target, level) in &self.targets {
            directives.push_str(&format!(",{}={}", target.replace('-', "_"), level));
        }
        directives
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the config when set.
///
/// Fails if the directives do not parse or a subscriber is already installed.
pub fn init_tracing(config: &LogConfig) -> Result<(), LedgerError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.directives())
            .map_err(|e| LedgerError::Config(format!("log directives: {e}")))?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
    installed.map_err(|e| LedgerError::Config(format!("tracing subscriber: {e}")))
}
