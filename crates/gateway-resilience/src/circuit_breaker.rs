//! Circuit breaker pattern implementation.
//!
//! The circuit breaker prevents cascading failures by stopping requests
//! to a failing provider and allowing it time to recover.
//!
//! `Closed` opens after `failure_threshold` consecutive failures. `Open`
//! rejects until `reset_timeout` has passed since the last failure; the next
//! admission check then moves it to `HalfOpen`, where every request is let
//! through and `success_threshold` consecutive successes close it again. Any
//! failure in `HalfOpen` reopens the circuit.

use dashmap::DashMap;
use gateway_core::{GatewayError, GatewayResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally
    Closed,
    /// Circuit is open, requests are rejected
    Open,
    /// Circuit is half-open, testing if the provider recovered
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Consecutive half-open successes required to close the circuit
    pub success_threshold: u32,
    /// Time since the last failure before a recovery probe is let through
    #[serde(with = "humantime_serde")]
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure: Option<Instant>,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure: None,
        }
    }
}

/// Circuit breaker for a single provider
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Provider identifier
    provider_id: String,
    /// Configuration
    config: CircuitBreakerConfig,
    /// State, counters and last failure instant, guarded together
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    #[must_use]
    pub fn new(provider_id: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            provider_id: provider_id.into(),
            config,
            inner: Mutex::new(BreakerState::closed()),
        }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults(provider_id: impl Into<String>) -> Self {
        Self::new(provider_id, CircuitBreakerConfig::default())
    }

    /// Get the provider ID
    #[must_use]
    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get the current state
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Check if the circuit allows a request
    ///
    /// In `Open`, the first call after the reset timeout moves the breaker
    /// to `HalfOpen` and is admitted.
    ///
    /// # Errors
    /// Returns `GatewayError::CircuitOpen` if the circuit is open
    pub fn allow(&self) -> GatewayResult<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let timeout_elapsed = inner
                    .last_failure
                    .map_or(true, |at| at.elapsed() >= self.config.reset_timeout);

                if timeout_elapsed {
                    inner.state = CircuitState::HalfOpen;
                    inner.consecutive_successes = 0;
                    info!(
                        provider = %self.provider_id,
                        "Circuit breaker half-open, testing"
                    );
                    Ok(())
                } else {
                    Err(GatewayError::circuit_open(&self.provider_id))
                }
            }
        }
    }

    /// Record a successful request
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                debug!(
                    provider = %self.provider_id,
                    successes = inner.consecutive_successes,
                    threshold = self.config.success_threshold,
                    "Circuit breaker half-open success"
                );

                if inner.consecutive_successes >= self.config.success_threshold {
                    *inner = BreakerState::closed();
                    info!(provider = %self.provider_id, "Circuit breaker closed");
                }
            }
            CircuitState::Open => {
                // Late result of a request admitted before the circuit opened
            }
        }
    }

    /// Record a failed request
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.last_failure = Some(Instant::now());

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    warn!(
                        provider = %self.provider_id,
                        failures = inner.consecutive_failures,
                        threshold = self.config.failure_threshold,
                        "Circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.consecutive_successes = 0;
                warn!(
                    provider = %self.provider_id,
                    "Circuit breaker half-open failure, reopening"
                );
            }
            CircuitState::Open => {
                inner.consecutive_failures += 1;
            }
        }
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        *self.inner.lock() = BreakerState::closed();
        info!(provider = %self.provider_id, "Circuit breaker reset");
    }

    /// Force the circuit open (manual intervention)
    pub fn force_open(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Open;
        inner.consecutive_successes = 0;
        inner.last_failure = Some(Instant::now());
        warn!(provider = %self.provider_id, "Circuit breaker forced open");
    }

    /// Get current statistics
    #[must_use]
    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.lock();
        CircuitBreakerStats {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            since_last_failure: inner.last_failure.map(|at| at.elapsed()),
        }
    }
}

/// Circuit breaker statistics
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    /// Current state
    pub state: CircuitState,
    /// Consecutive failures
    pub consecutive_failures: u32,
    /// Consecutive successes while half-open
    pub consecutive_successes: u32,
    /// Time since the last recorded failure
    #[serde(skip)]
    pub since_last_failure: Option<Duration>,
}

/// Per-provider circuit breakers, created lazily
#[derive(Debug, Default)]
pub struct CircuitBreakerManager {
    default_config: CircuitBreakerConfig,
    configs: DashMap<String, CircuitBreakerConfig>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerManager {
    /// Create a manager whose unconfigured providers use `default_config`
    #[must_use]
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            default_config,
            configs: DashMap::new(),
            breakers: DashMap::new(),
        }
    }

    /// Set a provider's configuration and (re)create its breaker closed
    pub fn configure(&self, provider: &str, config: CircuitBreakerConfig) {
        self.configs.insert(provider.to_string(), config.clone());
        self.breakers
            .insert(provider.to_string(), Arc::new(CircuitBreaker::new(provider, config)));
    }

    /// Get the provider's breaker, creating it on first use
    #[must_use]
    pub fn get(&self, provider: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(provider) {
            return Arc::clone(breaker.value());
        }

        let config = self
            .configs
            .get(provider)
            .map_or_else(|| self.default_config.clone(), |c| c.value().clone());
        let breaker = self
            .breakers
            .entry(provider.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(provider, config)));
        Arc::clone(breaker.value())
    }

    /// Get the provider's breaker only if one exists
    #[must_use]
    pub fn get_existing(&self, provider: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(provider).map(|b| Arc::clone(b.value()))
    }

    /// Current state of every breaker, sorted by provider
    #[must_use]
    pub fn states(&self) -> Vec<(String, CircuitState)> {
        let mut states: Vec<(String, CircuitState)> = self
            .breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }
}
