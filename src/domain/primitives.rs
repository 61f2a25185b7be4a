//! Domain primitives: TimeMs, Address, InstrumentId, TournamentId, Phase, TxHash.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Time in milliseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    /// Create a TimeMs from milliseconds.
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(chrono::Utc::now().timestamp_millis())
    }

    /// Get the underlying milliseconds value.
    pub fn as_ms(&self) -> i64 {
        self.0
    }
}

/// Wallet address as reported by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    /// Create an Address from a string.
    pub fn new(addr: String) -> Self {
        Address(addr)
    }

    /// Get the address as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressParseError {
    #[error("address is empty")]
    Empty,
    #[error("address contains whitespace")]
    Whitespace,
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(AddressParseError::Empty);
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(AddressParseError::Whitespace);
        }
        Ok(Address(trimmed.to_string()))
    }
}

/// Identifier of a fungible instrument (one per player, plus the base token).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(pub String);

impl InstrumentId {
    pub fn new(id: String) -> Self {
        InstrumentId(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TournamentId(pub String);

impl TournamentId {
    pub fn new(id: String) -> Self {
        TournamentId(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TournamentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ledger transaction hash returned by a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl TxHash {
    pub fn new(hash: String) -> Self {
        TxHash(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TxHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Point in time a snapshot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    PreMatch,
    PostMatch,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::PreMatch => "PRE_MATCH",
            Phase::PostMatch => "POST_MATCH",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "PRE_MATCH" => Ok(Phase::PreMatch),
            "POST_MATCH" => Ok(Phase::PostMatch),
            other => Err(format!("unknown phase: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_parse_is_case_insensitive() {
        assert_eq!(Phase::from_str("pre_match").unwrap(), Phase::PreMatch);
        assert_eq!(Phase::from_str("POST_MATCH").unwrap(), Phase::PostMatch);
        assert_eq!(Phase::from_str("post-match").unwrap(), Phase::PostMatch);
        assert!(Phase::from_str("halftime").is_err());
    }

    #[test]
    fn test_phase_serialization() {
        let json = serde_json::to_string(&Phase::PreMatch).unwrap();
        assert_eq!(json, "\"PRE_MATCH\"");
        let phase: Phase = serde_json::from_str("\"POST_MATCH\"").unwrap();
        assert_eq!(phase, Phase::PostMatch);
    }

    #[test]
    fn test_address_parse() {
        assert_eq!(
            Address::from_str("  0xabc ").unwrap(),
            Address::new("0xabc".to_string())
        );
        assert_eq!(Address::from_str("   "), Err(AddressParseError::Empty));
        assert_eq!(Address::from_str("0x a"), Err(AddressParseError::Whitespace));
    }

    #[test]
    fn test_address_ordering_is_lexicographic() {
        let a = Address::new("0xaaa".to_string());
        let b = Address::new("0xbbb".to_string());
        assert!(a < b);
    }

    #[test]
    fn test_transparent_serialization() {
        let id = InstrumentId::new("P1".to_string());
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"P1\"");
    }
}
