//! Domain primitives: TimeMs, ids, Address, Tier, LegSide.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

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

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Member (tree node) identifier.
    MemberId
);
id_type!(
    /// Order identifier; also the idempotency key for commission computation.
    OrderId
);
id_type!(
    /// Commission row identifier.
    CommissionId
);

/// Settlement (wallet) address.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    pub fn new(addr: String) -> Self {
        Address(addr)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when parsing an enum-like primitive from its string form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Commission-eligibility tier. Ordered: `None < Tier1 < Tier2`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    None,
    Tier1,
    Tier2,
}

impl Tier {
    /// Tiers that carry a commission config, lowest first.
    pub const PAID: [Tier; 2] = [Tier::Tier1, Tier::Tier2];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::None => "none",
            Tier::Tier1 => "tier1",
            Tier::Tier2 => "tier2",
        }
    }

    pub fn is_active(&self) -> bool {
        *self != Tier::None
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Tier::None),
            "tier1" => Ok(Tier::Tier1),
            "tier2" => Ok(Tier::Tier2),
            other => Err(ParseEnumError::new("tier", other)),
        }
    }
}

/// Leg of a binary tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegSide {
    Left,
    Right,
}

impl LegSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            LegSide::Left => "left",
            LegSide::Right => "right",
        }
    }

    pub fn opposite(&self) -> LegSide {
        match self {
            LegSide::Left => LegSide::Right,
            LegSide::Right => LegSide::Left,
        }
    }
}

impl fmt::Display for LegSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LegSide {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(LegSide::Left),
            "right" => Ok(LegSide::Right),
            other => Err(ParseEnumError::new("side", other)),
        }
    }
}
