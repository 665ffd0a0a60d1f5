//! Tiered health probe engine.
//!
//! The engine answers "how healthy is this provider at this tier" using the
//! TTL cache when it holds a valid result and the registered [`Prober`]
//! otherwise. Fresh results are stored with a jittered TTL so that many
//! providers probed together do not all expire in the same instant.
//!
//! [`Prober`]: crate::probe::Prober

use crate::probe::{HealthStatus, ProbeResult};
use crate::registry::ProberRegistry;
use crate::store::{CacheStats, ProbeCache};
use crate::tier::Tier;
use chrono::Utc;
use gateway_core::{GatewayError, GatewayResult};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Hints at or below this duration are stored without jitter
const JITTER_FLOOR: Duration = Duration::from_secs(1);

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum symmetric TTL perturbation
    pub ttl_jitter: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ttl_jitter: Duration::from_millis(400),
        }
    }
}

/// Aggregated health of one provider across cached tiers
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    /// Provider name
    pub provider: String,
    /// Best status among cached tiers; `None` when nothing is cached
    pub status: Option<HealthStatus>,
    /// Cached results, lowest tier first
    pub tiers: Vec<ProbeResult>,
}

/// Health probe engine
pub struct HealthEngine {
    registry: Arc<ProberRegistry>,
    cache: ProbeCache<ProbeResult>,
    config: EngineConfig,
}

impl HealthEngine {
    /// Create an engine over an injected registry
    #[must_use]
    pub fn new(registry: Arc<ProberRegistry>, config: EngineConfig) -> Self {
        Self {
            registry,
            cache: ProbeCache::new(),
            config,
        }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults(registry: Arc<ProberRegistry>) -> Self {
        Self::new(registry, EngineConfig::default())
    }

    /// The registry this engine probes through
    #[must_use]
    pub fn registry(&self) -> &Arc<ProberRegistry> {
        &self.registry
    }

    /// The result cache
    #[must_use]
    pub fn cache(&self) -> &ProbeCache<ProbeResult> {
        &self.cache
    }

    /// Registered provider names, sorted
    #[must_use]
    pub fn providers(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Check one provider at one tier
    ///
    /// Unless `force` is set, a valid cached result is returned without
    /// calling the prober. Prober failures are folded into a `Down` result
    /// rather than returned as errors.
    ///
    /// # Errors
    /// Returns `GatewayError::UnknownProvider` if no prober is registered
    pub async fn check(&self, provider: &str, tier: Tier, force: bool) -> GatewayResult<ProbeResult> {
        let prober = self
            .registry
            .get(provider)
            .ok_or_else(|| GatewayError::unknown_provider(provider))?;

        if !force {
            if let Some(cached) = self.cache.get(provider, tier) {
                debug!(provider = %provider, tier = %tier, status = %cached.status, "Health cache hit");
                return Ok(cached);
            }
        }

        let started = Instant::now();
        let outcome = prober.check(tier).await;
        let latency = started.elapsed();

        let mut result = match outcome {
            Ok(result) => result,
            Err(error) => {
                warn!(
                    provider = %provider,
                    tier = %tier,
                    error = %error,
                    "Probe failed, reporting provider down"
                );
                ProbeResult::new(provider, tier, HealthStatus::Down, error.to_string())
            }
        };

        let ttl = jittered_ttl(prober.healthy_hint(tier), self.config.ttl_jitter);
        result.provider = provider.to_string();
        result.tier = tier;
        result.latency = latency;
        result.checked_at = Utc::now();
        result.ttl = ttl;

        debug!(
            provider = %provider,
            tier = %tier,
            status = %result.status,
            latency_ms = latency.as_millis() as u64,
            ttl_ms = ttl.as_millis() as u64,
            "Probe completed"
        );

        self.cache.set(provider, tier, result.clone(), ttl);
        Ok(result)
    }

    /// Walk tiers upward until one reports `Ok` or `max_tier` is reached
    ///
    /// # Errors
    /// Returns the first error raised by [`HealthEngine::check`]
    pub async fn check_with_escalation(
        &self,
        provider: &str,
        max_tier: Tier,
        force: bool,
    ) -> GatewayResult<ProbeResult> {
        let mut last = None;
        for tier in max_tier.up_to() {
            let result = self.check(provider, tier, force).await?;
            if result.status.is_ok() {
                return Ok(result);
            }
            if tier < max_tier {
                debug!(
                    provider = %provider,
                    tier = %tier,
                    status = %result.status,
                    "Ambiguous result, escalating"
                );
            }
            last = Some(result);
        }
        last.ok_or_else(|| GatewayError::internal("escalation visited no tier"))
    }

    /// Best cached status across all tiers of one provider
    ///
    /// Tiers with no valid cache entry are left out of the aggregate.
    ///
    /// # Errors
    /// Returns `GatewayError::UnknownProvider` if no prober is registered
    pub fn provider_status(&self, provider: &str) -> GatewayResult<ProviderHealth> {
        if !self.registry.contains(provider) {
            return Err(GatewayError::unknown_provider(provider));
        }

        let tiers: Vec<ProbeResult> = Tier::ALL
            .into_iter()
            .filter_map(|tier| self.cache.get(provider, tier))
            .collect();
        let status = tiers.iter().map(|result| result.status).max();

        Ok(ProviderHealth {
            provider: provider.to_string(),
            status,
            tiers,
        })
    }

    /// Invalidate every cached tier of one provider
    pub fn clear_cache(&self, provider: &str) -> usize {
        let removed = self.cache.clear_provider(provider);
        debug!(provider = %provider, removed = removed, "Health cache cleared");
        removed
    }

    /// Cache statistics
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

impl std::fmt::Debug for HealthEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthEngine")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Perturb a TTL hint by up to `max_jitter` in either direction
///
/// Hints of one second or less are returned unchanged.
#[must_use]
pub fn jittered_ttl(base: Duration, max_jitter: Duration) -> Duration {
    if base <= JITTER_FLOOR || max_jitter.is_zero() {
        return base;
    }

    let jitter_ms = i64::try_from(max_jitter.as_millis()).unwrap_or(i64::MAX);
    let offset = rand::thread_rng().gen_range(-jitter_ms..=jitter_ms);
    let jittered = if offset >= 0 {
        base.saturating_add(Duration::from_millis(offset.unsigned_abs()))
    } else {
        base.saturating_sub(Duration::from_millis(offset.unsigned_abs()))
    };
    jittered.max(Duration::from_millis(1))
}
