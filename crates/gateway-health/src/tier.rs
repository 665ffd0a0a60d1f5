//! Health check tiers.

use gateway_core::GatewayError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Escalating level of health check cost and accuracy
///
/// Ordered by ordinal: a higher tier is a more expensive, more trustworthy
/// signal. Escalation always walks tiers upward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Tier {
    /// Cheap credential check (e.g. list models)
    KeyValidation = 1,
    /// Connectivity and protocol handshake
    Handshake = 2,
    /// Real micro-request against the inference API
    RealRequest = 3,
}

impl Tier {
    /// All tiers, lowest first
    pub const ALL: [Self; 3] = [Self::KeyValidation, Self::Handshake, Self::RealRequest];

    /// Lowest tier
    pub const MIN: Self = Self::KeyValidation;

    /// Highest tier
    pub const MAX: Self = Self::RealRequest;

    /// Ordinal rank (1-based)
    #[must_use]
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Tiers from the lowest up to and including `self`
    pub fn up_to(self) -> impl Iterator<Item = Self> {
        Self::ALL.into_iter().filter(move |t| *t <= self)
    }

    /// Stable snake_case name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::KeyValidation => "key_validation",
            Self::Handshake => "handshake",
            Self::RealRequest => "real_request",
        }
    }
}

impl TryFrom<u8> for Tier {
    type Error = GatewayError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::KeyValidation),
            2 => Ok(Self::Handshake),
            3 => Ok(Self::RealRequest),
            tier => Err(GatewayError::InvalidTier { tier }),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
