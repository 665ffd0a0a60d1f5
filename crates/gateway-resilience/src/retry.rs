//! Retry policy with exponential backoff.
//!
//! Delays grow as `min(base_delay * multiplier^attempt, max_delay)`. The
//! backoff sleep is cancellable; an operation already in flight is not.

use gateway_core::{GatewayError, GatewayResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Base delay between retries
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Maximum delay between retries
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Backoff multiplier
    pub multiplier: f64,
    /// Jitter factor (0.0 - 1.0)
    pub jitter: f64,
    /// HTTP status codes to retry on
    pub retry_on_status: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.0,
            retry_on_status: vec![429, 500, 502, 503, 504],
        }
    }
}

/// Retry policy implementation
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new retry policy with the given configuration
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Create a policy with custom max retries
    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self::new(RetryConfig {
            max_retries,
            ..Default::default()
        })
    }

    /// Calculate delay for a given attempt (0-indexed)
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.config.base_delay.as_millis() as f64;
        let delay = base * self.config.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let delay = delay.min(self.config.max_delay.as_millis() as f64);

        if self.config.jitter <= 0.0 {
            return Duration::from_millis(delay as u64);
        }

        let jitter_range = delay * self.config.jitter;
        let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
        let final_delay = (delay + jitter).max(0.0);

        Duration::from_millis(final_delay as u64)
    }

    /// Check if an error is retryable
    #[must_use]
    pub fn is_retryable(&self, error: &GatewayError) -> bool {
        match error {
            GatewayError::Provider {
                retryable,
                status_code,
                ..
            } => {
                if *retryable {
                    return true;
                }
                status_code.is_some_and(|code| self.config.retry_on_status.contains(&code))
            }
            GatewayError::OperationFailed { source, .. } => self.is_retryable(source),
            _ => error.is_retryable(),
        }
    }

    /// Execute an operation with retry logic
    ///
    /// # Errors
    /// Returns `GatewayError::OperationFailed` wrapping the last error once
    /// retries are exhausted or a non-retryable error occurs
    pub async fn execute<F, Fut, T>(&self, operation: F) -> GatewayResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        self.execute_with_cancel(&CancellationToken::new(), operation)
            .await
    }

    /// Execute an operation with retry logic, aborting the backoff on cancel
    ///
    /// Cancellation is observed before each attempt and during every
    /// backoff sleep.
    ///
    /// # Errors
    /// Returns `GatewayError::Cancelled` if `cancel` fires, otherwise
    /// `GatewayError::OperationFailed` wrapping the last error
    pub async fn execute_with_cancel<F, Fut, T>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> GatewayResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let mut attempts: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(GatewayError::Cancelled);
            }

            attempts += 1;
            let error = match operation().await {
                Ok(result) => {
                    if attempts > 1 {
                        debug!(attempts = attempts, "Retry succeeded");
                    }
                    return Ok(result);
                }
                Err(GatewayError::Cancelled) => return Err(GatewayError::Cancelled),
                Err(error) => error,
            };

            if !self.is_retryable(&error) || attempts > self.config.max_retries {
                return Err(GatewayError::operation_failed(attempts, error));
            }

            let delay = self.delay_for_attempt(attempts - 1);
            warn!(
                attempt = attempts,
                max_retries = self.config.max_retries,
                delay_ms = delay.as_millis(),
                error = %error,
                "Retrying after error"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(attempts = attempts, "Retry cancelled during backoff");
                    return Err(GatewayError::Cancelled);
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

/// Builder for retry policy
#[derive(Debug, Default)]
pub struct RetryPolicyBuilder {
    config: RetryConfig,
}

impl RetryPolicyBuilder {
    /// Create a new builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max retries
    #[must_use]
    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    /// Set base delay
    #[must_use]
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.base_delay = delay;
        self
    }

    /// Set max delay
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    /// Set backoff multiplier
    #[must_use]
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.config.multiplier = multiplier;
        self
    }

    /// Set jitter factor
    #[must_use]
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.config.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Set status codes to retry on
    #[must_use]
    pub fn retry_on_status(mut self, codes: Vec<u16>) -> Self {
        self.config.retry_on_status = codes;
        self
    }

    /// Build the policy
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        RetryPolicy::new(self.config)
    }
}
