//! Resilience middleware for outbound provider calls.
//!
//! Every guarded call passes, in order, the provider's token bucket, its
//! circuit breaker, and the retry policy. A call rejected by the rate limiter
//! never touches the breaker, and a call rejected by the breaker never runs.
//! Each executed call records exactly one outcome to the breaker and the
//! uptime tracker.

use crate::circuit_breaker::{
    CircuitBreakerConfig, CircuitBreakerManager, CircuitBreakerStats, CircuitState,
};
use crate::rate_limiter::{RateLimiterConfig, RateLimiterManager};
use crate::retry::{RetryConfig, RetryPolicy};
use crate::uptime::{UptimeConfig, UptimeSnapshot, UptimeTracker};
use gateway_core::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Admission and breaker settings for one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderPolicy {
    /// Token bucket capacity
    pub capacity: u32,
    /// Tokens refilled per second
    pub refill_rate: u32,
    /// Consecutive failures before the circuit opens
    pub max_failures: u32,
    /// Time since last failure before a half-open probe
    #[serde(with = "humantime_serde")]
    pub reset_timeout: Duration,
    /// Half-open successes needed to close the circuit
    pub success_threshold: u32,
}

impl Default for ProviderPolicy {
    fn default() -> Self {
        let limiter = RateLimiterConfig::default();
        let breaker = CircuitBreakerConfig::default();
        Self {
            capacity: limiter.capacity,
            refill_rate: limiter.refill_rate,
            max_failures: breaker.failure_threshold,
            reset_timeout: breaker.reset_timeout,
            success_threshold: breaker.success_threshold,
        }
    }
}

impl ProviderPolicy {
    /// Token bucket part of the policy
    #[must_use]
    pub fn rate_limiter(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            capacity: self.capacity,
            refill_rate: self.refill_rate,
        }
    }

    /// Circuit breaker part of the policy
    #[must_use]
    pub fn circuit_breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.max_failures,
            success_threshold: self.success_threshold,
            reset_timeout: self.reset_timeout,
        }
    }
}

/// Resilience view of one provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderResilienceStatus {
    /// Provider name
    pub provider: String,
    /// Breaker state; `closed` when no breaker exists yet
    pub circuit_state: CircuitState,
    /// Breaker counters, once a breaker exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit: Option<CircuitBreakerStats>,
    /// Tokens left, when the provider has a bucket
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_tokens: Option<u32>,
    /// Recent traffic outcomes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<UptimeSnapshot>,
}

/// Rate limiter, circuit breaker, retry, and uptime tracking composed
#[derive(Debug)]
pub struct ResilienceMiddleware {
    rate_limiters: RateLimiterManager,
    circuit_breakers: CircuitBreakerManager,
    retry_policy: RetryPolicy,
    uptime: UptimeTracker,
    shutdown: CancellationToken,
}

impl ResilienceMiddleware {
    /// Create a middleware; unregistered providers get `default_policy`'s
    /// breaker and no rate limit
    #[must_use]
    pub fn new(
        default_policy: &ProviderPolicy,
        retry: RetryConfig,
        uptime: UptimeConfig,
    ) -> Self {
        Self {
            rate_limiters: RateLimiterManager::new(),
            circuit_breakers: CircuitBreakerManager::new(default_policy.circuit_breaker()),
            retry_policy: RetryPolicy::new(retry),
            uptime: UptimeTracker::new(uptime),
            shutdown: CancellationToken::new(),
        }
    }

    /// Create with default settings
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(
            &ProviderPolicy::default(),
            RetryConfig::default(),
            UptimeConfig::default(),
        )
    }

    /// Register a provider, replacing any earlier bucket and breaker
    pub fn register_provider(&self, provider: &str, policy: &ProviderPolicy) {
        self.rate_limiters.configure(provider, policy.rate_limiter());
        self.circuit_breakers
            .configure(provider, policy.circuit_breaker());
        info!(
            provider = %provider,
            capacity = policy.capacity,
            refill_rate = policy.refill_rate,
            max_failures = policy.max_failures,
            "Provider registered with resilience middleware"
        );
    }

    /// Run `operation` against `provider` under full protection
    ///
    /// Backoff sleeps are aborted by [`Self::shutdown`].
    ///
    /// # Errors
    /// `RateLimited` or `CircuitOpen` when rejected locally, `Cancelled` on
    /// shutdown, otherwise `OperationFailed` wrapping the last error
    pub async fn execute<F, Fut, T>(&self, provider: &str, operation: F) -> GatewayResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let cancel = self.shutdown.child_token();
        self.execute_with_cancel(provider, &cancel, operation).await
    }

    /// Run `operation` with a caller-owned cancellation token
    ///
    /// Derive the token from [`Self::cancellation_token`] so that shutdown
    /// still reaches it.
    ///
    /// # Errors
    /// Same as [`Self::execute`]
    pub async fn execute_with_cancel<F, Fut, T>(
        &self,
        provider: &str,
        cancel: &CancellationToken,
        operation: F,
    ) -> GatewayResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        if !self.rate_limiters.allow(provider) {
            warn!(provider = %provider, "Request rate limited");
            return Err(GatewayError::rate_limited(provider));
        }

        let breaker = self.circuit_breakers.get(provider);
        if let Err(e) = breaker.allow() {
            debug!(provider = %provider, "Request rejected by open circuit");
            return Err(e);
        }

        let start = Instant::now();
        let result = self.retry_policy.execute_with_cancel(cancel, operation).await;
        let latency = start.elapsed();

        match &result {
            Ok(_) => {
                breaker.record_success();
                self.uptime.record(provider, true, latency);
            }
            Err(GatewayError::Cancelled) => {
                debug!(provider = %provider, "Guarded call cancelled");
            }
            Err(e) => {
                breaker.record_failure();
                let status = self.uptime.record(provider, false, latency);
                warn!(
                    provider = %provider,
                    error = %e,
                    status = %status,
                    latency_ms = latency.as_millis(),
                    "Guarded call failed"
                );
            }
        }

        result
    }

    /// Token for per-call cancellation that also fires on shutdown
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    /// Abort every pending retry backoff; new calls fail with `Cancelled`
    pub fn shutdown(&self) {
        info!("Resilience middleware shutting down");
        self.shutdown.cancel();
    }

    /// Check if shutdown has been requested
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resilience view of one provider
    #[must_use]
    pub fn provider_status(&self, provider: &str) -> ProviderResilienceStatus {
        let circuit = self
            .circuit_breakers
            .get_existing(provider)
            .map(|breaker| breaker.stats());

        ProviderResilienceStatus {
            provider: provider.to_string(),
            circuit_state: circuit.as_ref().map_or(CircuitState::Closed, |s| s.state),
            circuit,
            available_tokens: self
                .rate_limiters
                .get(provider)
                .map(|bucket| bucket.available_tokens()),
            uptime: self.uptime.snapshot(provider),
        }
    }

    /// Per-provider token buckets
    #[must_use]
    pub fn rate_limiters(&self) -> &RateLimiterManager {
        &self.rate_limiters
    }

    /// Per-provider circuit breakers
    #[must_use]
    pub fn circuit_breakers(&self) -> &CircuitBreakerManager {
        &self.circuit_breakers
    }

    /// Retry policy applied to every guarded call
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Uptime tracker fed by guarded calls
    #[must_use]
    pub fn uptime(&self) -> &UptimeTracker {
        &self.uptime
    }
}
