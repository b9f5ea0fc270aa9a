//! Token symbols.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Longest tick symbol the protocol accepts.
pub const MAX_TICK_LEN: usize = 8;

/// A validated, lower-cased token symbol (e.g. `dota`).
///
/// dot-20 ticks are case-insensitive, so `DOTA` and `dota` name the same
/// token. Only ASCII alphanumerics are accepted, which also makes a tick safe
/// to embed in relation names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tick(String);

impl Tick {
    pub fn new(symbol: impl AsRef<str>) -> Result<Self, LedgerError> {
        let symbol = symbol.as_ref();
        if symbol.is_empty()
            || symbol.len() > MAX_TICK_LEN
            || !symbol.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(LedgerError::InvalidTick(symbol.to_string()));
        }
        Ok(Self(symbol.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Tick {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Tick {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Tick> for String {
    fn from(tick: Tick) -> Self {
        tick.0
    }
}

impl AsRef<str> for Tick {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_are_case_insensitive() {
        assert_eq!(Tick::new("DOTA").unwrap(), Tick::new("dota").unwrap());
        assert_eq!(Tick::new("DoTa").unwrap().as_str(), "dota");
    }

    #[test]
    fn rejects_unsafe_symbols() {
        assert!(Tick::new("").is_err());
        assert!(Tick::new("toolongtick").is_err());
        assert!(Tick::new("do ta").is_err());
        assert!(Tick::new("x\";drop").is_err());
        assert!(Tick::new("dota_").is_err());
    }

    #[test]
    fn serde_goes_through_validation() {
        let tick: Tick = serde_json::from_str("\"DOTA\"").unwrap();
        assert_eq!(tick.as_str(), "dota");
        assert!(serde_json::from_str::<Tick>("\"d-o\"").is_err());
    }
}
