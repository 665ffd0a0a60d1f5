//! # Gateway Resilience
//!
//! Resilience patterns guarding outbound provider calls:
//! - Token bucket rate limiting with lazy refill
//! - Circuit breaker for preventing cascading failures
//! - Retry policy with exponential, cancellable backoff
//! - Uptime tracking over a rolling window of real traffic
//! - A middleware composing all of the above in a fixed order

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod circuit_breaker;
pub mod middleware;
pub mod rate_limiter;
pub mod retry;
pub mod uptime;

// Re-export main types
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerManager, CircuitBreakerStats, CircuitState,
};
pub use middleware::{ProviderPolicy, ProviderResilienceStatus, ResilienceMiddleware};
pub use rate_limiter::{RateLimiterConfig, RateLimiterManager, RateLimiterStats, TokenBucket};
pub use retry::{RetryConfig, RetryPolicy, RetryPolicyBuilder};
pub use uptime::{UptimeConfig, UptimeSnapshot, UptimeStatus, UptimeTracker};
