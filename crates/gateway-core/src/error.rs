//! Error taxonomy shared by the health and resilience crates.
//!
//! Every failure the gateway can report about an upstream provider is one
//! variant of [`GatewayError`]. Callers classify errors through
//! [`GatewayError::kind`] rather than matching on display strings.

use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the gateway crates.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Gateway error type
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No prober or policy is registered under this provider name
    #[error("Unknown provider: {provider}")]
    UnknownProvider {
        /// Provider name that was looked up
        provider: String,
    },

    /// Tier ordinal outside the supported range
    #[error("Invalid health check tier: {tier}")]
    InvalidTier {
        /// The rejected ordinal
        tier: u8,
    },

    /// A prober's underlying transport call failed
    #[error("Probe transport error for {provider}: {message}")]
    ProbeTransport {
        /// Provider being probed
        provider: String,
        /// Transport failure description
        message: String,
    },

    /// An upstream provider call failed
    #[error("Provider error from {provider}: {message}")]
    Provider {
        /// Provider that returned the error
        provider: String,
        /// Error message
        message: String,
        /// Upstream HTTP status code, if any
        status_code: Option<u16>,
        /// Whether the upstream marked the failure as transient
        retryable: bool,
    },

    /// An upstream call exceeded its deadline
    #[error("Operation timed out after {timeout:?}")]
    Timeout {
        /// The deadline that was exceeded
        timeout: Duration,
    },

    /// Local token bucket rejected the call
    #[error("Rate limit exceeded for provider {provider}")]
    RateLimited {
        /// Provider whose bucket is empty
        provider: String,
    },

    /// Circuit breaker rejected the call
    #[error("Circuit breaker open for provider {provider}")]
    CircuitOpen {
        /// Provider whose breaker is open
        provider: String,
    },

    /// The guarded operation failed after exhausting its retries
    #[error("Operation failed after {attempts} attempt(s): {source}")]
    OperationFailed {
        /// Number of attempts performed
        attempts: u32,
        /// The last underlying failure
        #[source]
        source: Box<GatewayError>,
    },

    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Configuration {
        /// What is wrong with the configuration
        message: String,
    },

    /// Unexpected internal failure
    #[error("Internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },
}

impl GatewayError {
    /// Create an unknown provider error
    pub fn unknown_provider(provider: impl Into<String>) -> Self {
        Self::UnknownProvider {
            provider: provider.into(),
        }
    }

    /// Create a probe transport error
    pub fn probe_transport(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProbeTransport {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a provider error
    pub fn provider(
        provider: impl Into<String>,
        message: impl Into<String>,
        status_code: Option<u16>,
        retryable: bool,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            status_code,
            retryable,
        }
    }

    /// Create a timeout error
    #[must_use]
    pub fn timeout(timeout: Duration) -> Self {
        Self::Timeout { timeout }
    }

    /// Create a rate limited error
    pub fn rate_limited(provider: impl Into<String>) -> Self {
        Self::RateLimited {
            provider: provider.into(),
        }
    }

    /// Create a circuit open error
    pub fn circuit_open(provider: impl Into<String>) -> Self {
        Self::CircuitOpen {
            provider: provider.into(),
        }
    }

    /// Wrap the last failure of a retried operation
    #[must_use]
    pub fn operation_failed(attempts: u32, last_error: Self) -> Self {
        Self::OperationFailed {
            attempts,
            source: Box::new(last_error),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable machine-readable classification of this error
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownProvider { .. } => "unknown_provider",
            Self::InvalidTier { .. } => "invalid_tier",
            Self::ProbeTransport { .. } => "probe_transport",
            Self::Provider { .. } => "provider_error",
            Self::Timeout { .. } => "timeout",
            Self::RateLimited { .. } => "rate_limited",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::OperationFailed { .. } => "operation_failed",
            Self::Cancelled => "cancelled",
            Self::Configuration { .. } => "configuration_error",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Check if a retry of the same call could succeed
    ///
    /// Caller input errors and local admission rejections are never retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider {
                retryable,
                status_code,
                ..
            } => *retryable || matches!(status_code, Some(429 | 500 | 502 | 503 | 504)),
            Self::Timeout { .. } | Self::ProbeTransport { .. } => true,
            Self::OperationFailed { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Check if this is a local admission-control rejection
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::CircuitOpen { .. })
    }

    /// Get HTTP status code the route layer should answer with
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::UnknownProvider { .. } => 404,
            Self::InvalidTier { .. } => 400,
            Self::RateLimited { .. } => 429,
            Self::CircuitOpen { .. } => 503,
            Self::Timeout { .. } => 504,
            Self::ProbeTransport { .. } | Self::Provider { .. } => 502,
            Self::OperationFailed { source, .. } => source.status_code(),
            Self::Cancelled => 499,
            Self::Configuration { .. } | Self::Internal { .. } => 500,
        }
    }
}
