//! Health query facade for the route layer.
//!
//! Bundles the engine and scheduler behind the operations the HTTP layer
//! exposes: single-provider checks, the all-providers report, the
//! `Retry-After` hint, and scheduler introspection.

use crate::engine::{HealthEngine, ProviderHealth};
use crate::probe::{HealthStatus, ProbeResult};
use crate::scheduler::{HealthScheduler, SchedulerStatus};
use crate::tier::Tier;
use gateway_core::{GatewayError, GatewayResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Coarse process-wide status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    /// Every provider is `ok`
    Ok,
    /// Some but not all providers are `ok`
    Degraded,
    /// No provider is `ok`
    Down,
}

/// Number of providers per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    /// Providers reporting `ok`
    pub ok: usize,
    /// Providers reporting `degraded`
    pub degraded: usize,
    /// Providers reporting `suspect`
    pub suspect: usize,
    /// Providers reporting `down`
    pub down: usize,
}

impl StatusCounts {
    /// Count one provider
    pub fn record(&mut self, status: HealthStatus) {
        match status {
            HealthStatus::Ok => self.ok += 1,
            HealthStatus::Degraded => self.degraded += 1,
            HealthStatus::Suspect => self.suspect += 1,
            HealthStatus::Down => self.down += 1,
        }
    }

    /// Providers counted
    #[must_use]
    pub fn total(&self) -> usize {
        self.ok + self.degraded + self.suspect + self.down
    }

    /// Coarse status derived from the counts
    #[must_use]
    pub fn overall(&self) -> OverallStatus {
        if self.ok == self.total() {
            OverallStatus::Ok
        } else if self.ok > 0 {
            OverallStatus::Degraded
        } else {
            OverallStatus::Down
        }
    }
}

/// All-providers health report
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Coarse status
    pub overall: OverallStatus,
    /// Providers per status
    pub summary: StatusCounts,
    /// Result per provider
    pub providers: BTreeMap<String, ProbeResult>,
    /// Suggested `Retry-After` in whole seconds, when some provider is not ok
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

/// Health query facade
#[derive(Debug, Clone)]
pub struct HealthService {
    engine: Arc<HealthEngine>,
    scheduler: Arc<HealthScheduler>,
}

impl HealthService {
    /// Create a service over a shared engine and scheduler
    #[must_use]
    pub fn new(engine: Arc<HealthEngine>, scheduler: Arc<HealthScheduler>) -> Self {
        Self { engine, scheduler }
    }

    /// Underlying engine
    #[must_use]
    pub fn engine(&self) -> &Arc<HealthEngine> {
        &self.engine
    }

    /// Underlying scheduler
    #[must_use]
    pub fn scheduler(&self) -> &Arc<HealthScheduler> {
        &self.scheduler
    }

    /// Check one provider, escalating up to `tier` when asked
    ///
    /// # Errors
    /// Returns `GatewayError::UnknownProvider` for an unregistered provider
    pub async fn check(
        &self,
        provider: &str,
        tier: Tier,
        escalate: bool,
        force: bool,
    ) -> GatewayResult<ProbeResult> {
        if escalate {
            self.engine.check_with_escalation(provider, tier, force).await
        } else {
            self.engine.check(provider, tier, force).await
        }
    }

    /// Check one provider with a raw tier ordinal from the request
    ///
    /// # Errors
    /// Returns `GatewayError::InvalidTier` for an ordinal outside 1..=3, or
    /// `GatewayError::UnknownProvider` for an unregistered provider
    pub async fn check_ordinal(
        &self,
        provider: &str,
        tier: u8,
        escalate: bool,
        force: bool,
    ) -> GatewayResult<ProbeResult> {
        let tier = Tier::try_from(tier)?;
        self.check(provider, tier, escalate, force).await
    }

    /// Check every registered provider and aggregate
    pub async fn check_all(&self, tier: Tier, escalate: bool, force: bool) -> HealthReport {
        let checks = self.engine.providers().into_iter().map(|provider| async move {
            let outcome = self.check(&provider, tier, escalate, force).await;
            (provider, outcome)
        });

        let mut providers = BTreeMap::new();
        let mut summary = StatusCounts::default();
        for (provider, outcome) in futures::future::join_all(checks).await {
            let result = match outcome {
                Ok(result) => result,
                Err(GatewayError::UnknownProvider { .. }) => {
                    debug!(provider = %provider, "Provider unregistered during sweep");
                    continue;
                }
                Err(e) => {
                    warn!(provider = %provider, error = %e, "Health check failed");
                    ProbeResult::new(&provider, tier, HealthStatus::Down, e.to_string())
                }
            };
            summary.record(result.status);
            providers.insert(provider, result);
        }

        HealthReport {
            overall: summary.overall(),
            summary,
            providers,
            retry_after_secs: self.retry_after().map(ceil_secs),
        }
    }

    /// Aggregated cached status of one provider
    ///
    /// # Errors
    /// Returns `GatewayError::UnknownProvider` for an unregistered provider
    pub fn provider_status(&self, provider: &str) -> GatewayResult<ProviderHealth> {
        self.engine.provider_status(provider)
    }

    /// Invalidate one provider's cached results
    ///
    /// # Errors
    /// Returns `GatewayError::UnknownProvider` for an unregistered provider
    pub fn clear_cache(&self, provider: &str) -> GatewayResult<usize> {
        if !self.engine.registry().contains(provider) {
            return Err(GatewayError::unknown_provider(provider));
        }
        Ok(self.engine.clear_cache(provider))
    }

    /// Shortest remaining TTL among cached results that are not `ok`
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        self.engine
            .cache()
            .snapshot()
            .into_iter()
            .filter(|cached| !cached.value.status.is_ok())
            .map(|cached| cached.remaining)
            .min()
    }

    /// Scheduler introspection
    #[must_use]
    pub fn scheduler_status(&self) -> SchedulerStatus {
        self.scheduler.status()
    }

    /// Operator-triggered forced sweep of every provider and tier
    pub async fn force_check_all(&self) -> Vec<ProbeResult> {
        self.scheduler.force_check().await
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
