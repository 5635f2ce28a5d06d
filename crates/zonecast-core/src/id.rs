// ── Connection and zone identifiers ──
//
// Zone identity is case-insensitive on the wire; everything inside the
// manager keys on the upper-cased form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Normalized zone identifier (trimmed, upper-cased, non-empty).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ZoneKey(String);

impl ZoneKey {
    pub fn new(raw: &str) -> Result<Self, CoreError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidZone { raw: raw.into() });
        }
        Ok(Self(trimmed.to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ZoneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ZoneKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ZoneKey {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<ZoneKey> for String {
    fn from(key: ZoneKey) -> Self {
        key.0
    }
}

/// Key for all per-connection state: the shared main stream, or one
/// dedicated zone stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConnectionId {
    Main,
    Zone(ZoneKey),
}

impl ConnectionId {
    pub const MAIN: &'static str = "main";

    pub fn zone(&self) -> Option<&ZoneKey> {
        match self {
            Self::Main => None,
            Self::Zone(key) => Some(key),
        }
    }

    pub fn is_main(&self) -> bool {
        matches!(self, Self::Main)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => f.write_str(Self::MAIN),
            Self::Zone(key) => key.fmt(f),
        }
    }
}

impl FromStr for ConnectionId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case(Self::MAIN) {
            Ok(Self::Main)
        } else {
            ZoneKey::new(s).map(Self::Zone)
        }
    }
}

impl From<ZoneKey> for ConnectionId {
    fn from(key: ZoneKey) -> Self {
        Self::Zone(key)
    }
}
