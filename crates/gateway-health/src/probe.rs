//! Probe results and the prober contract.
//!
//! A [`Prober`] performs the actual tier-specific check against one upstream
//! provider. The engine is polymorphic over this trait and never inspects the
//! concrete vendor behind it.

use crate::tier::Tier;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gateway_core::GatewayResult;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

/// Health of a provider as observed by one probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Provider answered as expected
    Ok,
    /// Ambiguous signal, worth escalating
    Suspect,
    /// Operational but impaired (slow, rate limited)
    Degraded,
    /// Provider unusable
    Down,
}

impl HealthStatus {
    /// Rank by goodness: `Ok > Degraded > Suspect > Down`
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Ok => 3,
            Self::Degraded => 2,
            Self::Suspect => 1,
            Self::Down => 0,
        }
    }

    /// Check if this is the `Ok` status
    #[must_use]
    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Better of two statuses
    #[must_use]
    pub fn best(self, other: Self) -> Self {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }

    /// Stable lowercase name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Suspect => "suspect",
            Self::Degraded => "degraded",
            Self::Down => "down",
        }
    }
}

impl PartialOrd for HealthStatus {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HealthStatus {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot of one health check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Provider name
    pub provider: String,
    /// Tier that produced this result
    pub tier: Tier,
    /// Observed status
    pub status: HealthStatus,
    /// Free-text detail
    pub detail: String,
    /// When the check completed
    pub checked_at: DateTime<Utc>,
    /// Cache lifetime suggested by the prober
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Observed latency of the check
    #[serde(with = "humantime_serde")]
    pub latency: Duration,
    /// Remaining upstream rate-limit budget, if reported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_remaining: Option<u32>,
    /// Transport status code, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl ProbeResult {
    /// Create a result; timing fields are stamped by the engine
    pub fn new(
        provider: impl Into<String>,
        tier: Tier,
        status: HealthStatus,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            tier,
            status,
            detail: detail.into(),
            checked_at: Utc::now(),
            ttl: Duration::ZERO,
            latency: Duration::ZERO,
            rate_limit_remaining: None,
            status_code: None,
        }
    }

    /// Set the transport status code
    #[must_use]
    pub fn with_status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    /// Set the remaining upstream rate-limit budget
    #[must_use]
    pub fn with_rate_limit_remaining(mut self, remaining: Option<u32>) -> Self {
        self.rate_limit_remaining = remaining;
        self
    }

    /// Set the observed latency
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

/// Contract implemented by every upstream-specific health check
#[async_trait]
pub trait Prober: Send + Sync {
    /// Stable identifier used as the provider key everywhere
    fn name(&self) -> &str;

    /// Run the check for `tier`
    ///
    /// Low tiers must be cheap and safe to call repeatedly; higher tiers may
    /// have real side effects and are reserved for escalation.
    async fn check(&self, tier: Tier) -> GatewayResult<ProbeResult>;

    /// Advisory cache TTL for a result of `tier`
    fn healthy_hint(&self, tier: Tier) -> Duration;
}
