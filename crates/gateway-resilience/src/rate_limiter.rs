//! Token bucket rate limiting.
//!
//! Buckets start full and refill lazily on each admission check by
//! `floor(elapsed_seconds) * refill_rate` tokens, capped at capacity. There
//! is no background refill task.

use dashmap::DashMap;
use gateway_core::{GatewayError, GatewayResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Token bucket configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// Maximum tokens held, also the initial level
    pub capacity: u32,
    /// Tokens added per whole elapsed second
    pub refill_rate: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            capacity: 60,
            refill_rate: 1,
        }
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: u32,
    last_refill: Instant,
}

/// Token bucket for a single provider
#[derive(Debug)]
pub struct TokenBucket {
    provider_id: String,
    config: RateLimiterConfig,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket
    #[must_use]
    pub fn new(provider_id: impl Into<String>, config: RateLimiterConfig) -> Self {
        Self {
            provider_id: provider_id.into(),
            config,
            state: Mutex::new(BucketState {
                tokens: config.capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Get the provider ID
    #[must_use]
    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> RateLimiterConfig {
        self.config
    }

    /// Take one token if available
    pub fn allow(&self) -> bool {
        let mut state = self.state.lock();
        self.refill(&mut state);

        if state.tokens == 0 {
            debug!(provider = %self.provider_id, "Token bucket empty");
            return false;
        }
        state.tokens -= 1;
        true
    }

    /// Tokens currently available, after refilling
    #[must_use]
    pub fn available_tokens(&self) -> u32 {
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.tokens
    }

    /// Get current statistics
    #[must_use]
    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            capacity: self.config.capacity,
            refill_rate: self.config.refill_rate,
            available: self.available_tokens(),
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let whole_secs = state.last_refill.elapsed().as_secs();
        if whole_secs == 0 {
            return;
        }

        let added = whole_secs.saturating_mul(u64::from(self.config.refill_rate));
        let tokens = (u64::from(state.tokens) + added).min(u64::from(self.config.capacity));
        state.tokens = tokens as u32;
        // Keep the fractional second so partial progress is not lost
        state.last_refill += Duration::from_secs(whole_secs);
    }
}

/// Token bucket statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimiterStats {
    /// Bucket capacity
    pub capacity: u32,
    /// Tokens per second
    pub refill_rate: u32,
    /// Tokens available now
    pub available: u32,
}

/// Per-provider token buckets
///
/// Providers without a bucket are always admitted.
#[derive(Debug, Default)]
pub struct RateLimiterManager {
    buckets: DashMap<String, Arc<TokenBucket>>,
}

impl RateLimiterManager {
    /// Create an empty manager
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a fresh, full bucket for a provider
    pub fn configure(&self, provider: &str, config: RateLimiterConfig) {
        info!(
            provider = %provider,
            capacity = config.capacity,
            refill_rate = config.refill_rate,
            "Rate limiter configured"
        );
        self.buckets
            .insert(provider.to_string(), Arc::new(TokenBucket::new(provider, config)));
    }

    /// Admission check; unconfigured providers are allowed
    pub fn allow(&self, provider: &str) -> bool {
        self.buckets
            .get(provider)
            .map_or(true, |bucket| bucket.allow())
    }

    /// Admission check as a result
    ///
    /// # Errors
    /// Returns `GatewayError::RateLimited` if the provider's bucket is empty
    pub fn check(&self, provider: &str) -> GatewayResult<()> {
        if self.allow(provider) {
            Ok(())
        } else {
            Err(GatewayError::rate_limited(provider))
        }
    }

    /// Get a provider's bucket
    #[must_use]
    pub fn get(&self, provider: &str) -> Option<Arc<TokenBucket>> {
        self.buckets.get(provider).map(|b| Arc::clone(b.value()))
    }

    /// Drop a provider's bucket, returning it to fail-open admission
    pub fn remove(&self, provider: &str) -> bool {
        self.buckets.remove(provider).is_some()
    }
}
