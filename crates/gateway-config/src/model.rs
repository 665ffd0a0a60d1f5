//! Configuration document.

use crate::error::{ConfigError, ConfigResult};
use gateway_health::{EngineConfig, SchedulerConfig, Tier, MAX_SCHEDULE_DELAY};
use gateway_probes::HttpProberConfig;
use gateway_resilience::{ProviderPolicy, RetryConfig, UptimeConfig};
use gateway_telemetry::LoggingConfig;
use humantime_serde::re::humantime::format_duration;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use url::Url;
use validator::{Validate, ValidationError};

/// Root configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_unique_names"))]
pub struct GatewayConfig {
    /// Logging
    pub logging: LoggingConfig,
    /// Health probing and scheduling
    #[validate(nested)]
    pub health: HealthSettings,
    /// Admission control, retry and uptime tracking
    #[validate(nested)]
    pub resilience: ResilienceSettings,
    /// Upstream providers
    #[validate(nested)]
    pub providers: Vec<ProviderSettings>,
}

impl GatewayConfig {
    /// Providers with `enabled: true`
    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderSettings> {
        self.providers.iter().filter(|p| p.enabled)
    }

    /// Look up a provider by name
    #[must_use]
    pub fn provider(&self, name: &str) -> Option<&ProviderSettings> {
        self.providers.iter().find(|p| p.name == name)
    }

    /// Effective policy of a provider: its override or the default
    #[must_use]
    pub fn policy_for(&self, provider: &ProviderSettings) -> ProviderPolicy {
        provider
            .policy
            .clone()
            .unwrap_or_else(|| self.resilience.default_policy.clone())
    }
}

/// Health probing and scheduling settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HealthSettings {
    /// Run the background scheduler
    pub enabled: bool,
    /// Interval between key validation sweeps
    #[serde(with = "humantime_serde")]
    #[validate(custom(function = "validate_interval"))]
    pub key_validation_interval: Duration,
    /// Interval between handshake sweeps
    #[serde(with = "humantime_serde")]
    #[validate(custom(function = "validate_interval"))]
    pub handshake_interval: Duration,
    /// Interval between real request sweeps
    #[serde(with = "humantime_serde")]
    #[validate(custom(function = "validate_interval"))]
    pub real_request_interval: Duration,
    /// Tier N's first sweep waits N times this
    #[serde(with = "humantime_serde")]
    #[validate(custom(function = "validate_stagger"))]
    pub stagger_unit: Duration,
    /// Maximum symmetric perturbation of cache TTLs
    #[serde(with = "humantime_serde")]
    pub ttl_jitter: Duration,
}

impl Default for HealthSettings {
    fn default() -> Self {
        let scheduler = SchedulerConfig::default();
        Self {
            enabled: true,
            key_validation_interval: scheduler.key_validation_interval,
            handshake_interval: scheduler.handshake_interval,
            real_request_interval: scheduler.real_request_interval,
            stagger_unit: scheduler.stagger_unit,
            ttl_jitter: EngineConfig::default().ttl_jitter,
        }
    }
}

impl HealthSettings {
    /// Scheduler configuration
    #[must_use]
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            key_validation_interval: self.key_validation_interval,
            handshake_interval: self.handshake_interval,
            real_request_interval: self.real_request_interval,
            stagger_unit: self.stagger_unit,
        }
    }

    /// Engine configuration
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            ttl_jitter: self.ttl_jitter,
        }
    }
}

/// Resilience settings shared by every provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ResilienceSettings {
    /// Policy for providers without an override
    #[validate(custom(function = "validate_policy"))]
    pub default_policy: ProviderPolicy,
    /// Retry behaviour of guarded calls
    #[validate(custom(function = "validate_retry"))]
    pub retry: RetryConfig,
    /// Uptime window of guarded calls
    #[validate(custom(function = "validate_uptime"))]
    pub uptime: UptimeConfig,
}

/// One upstream provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ProviderSettings {
    /// Provider name, used as the key everywhere
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    /// Whether the provider is wired up at all
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Policy override
    #[serde(default)]
    #[validate(custom(function = "validate_policy"))]
    pub policy: Option<ProviderPolicy>,
    /// Health probe; providers without one are not probed
    #[serde(default)]
    #[validate(nested)]
    pub probe: Option<ProbeSettings>,
}

/// HTTP probe settings of one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ProbeSettings {
    /// API base URL
    #[validate(url)]
    pub base_url: String,
    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Header carrying the raw key instead of `Authorization: Bearer`
    #[serde(default)]
    pub auth_header: Option<String>,
    /// Path probed by key validation
    #[serde(default = "default_key_path")]
    pub key_path: String,
    /// Path probed by the handshake
    #[serde(default = "default_handshake_path")]
    pub handshake_path: String,
    /// Path of the micro-request
    #[serde(default = "default_request_path")]
    pub request_path: String,
    /// JSON body of the micro-request
    #[serde(default)]
    pub request_body: Option<serde_json::Value>,
    /// Extra headers sent on every probe
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Per-probe timeout
    #[serde(default = "default_probe_timeout", with = "humantime_serde")]
    #[validate(custom(function = "validate_non_zero"))]
    pub timeout: Duration,
    /// Successful micro-requests slower than this are degraded
    #[serde(default = "default_slow_threshold", with = "humantime_serde")]
    pub slow_threshold: Duration,
    /// TTL hints per tier
    #[serde(default)]
    pub ttl: ProbeTtlSettings,
}

/// TTL hints per tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeTtlSettings {
    /// Key validation
    #[serde(with = "humantime_serde")]
    pub key_validation: Duration,
    /// Handshake
    #[serde(with = "humantime_serde")]
    pub handshake: Duration,
    /// Real request
    #[serde(with = "humantime_serde")]
    pub real_request: Duration,
}

impl Default for ProbeTtlSettings {
    fn default() -> Self {
        Self {
            key_validation: Duration::from_secs(60),
            handshake: Duration::from_secs(120),
            real_request: Duration::from_secs(300),
        }
    }
}

impl ProbeSettings {
    /// Build the prober configuration, reading the API key from the
    /// environment
    ///
    /// # Errors
    /// Returns `ConfigError::Env` if the key variable is unset, or
    /// `ConfigError::Validation` for an unparsable base URL
    pub fn to_prober_config(&self, provider: &str) -> ConfigResult<HttpProberConfig> {
        let base_url = Url::parse(&self.base_url).map_err(|e| {
            ConfigError::Validation(format!("provider '{provider}' base_url: {e}"))
        })?;

        let mut config = HttpProberConfig::new(provider, base_url)
            .with_key_path(&self.key_path)
            .with_handshake_path(&self.handshake_path)
            .with_request_path(&self.request_path)
            .with_timeout(self.timeout)
            .with_slow_threshold(self.slow_threshold)
            .with_ttl(Tier::KeyValidation, self.ttl.key_validation)
            .with_ttl(Tier::Handshake, self.ttl.handshake)
            .with_ttl(Tier::RealRequest, self.ttl.real_request);

        if let Some(body) = &self.request_body {
            config = config.with_request_body(body.clone());
        }
        if let Some(header) = &self.auth_header {
            config = config.with_auth_header(header);
        }
        for (name, value) in &self.headers {
            config = config.with_header(name, value);
        }
        if let Some(var) = &self.api_key_env {
            config = config
                .with_api_key_env(var)
                .map_err(|e| ConfigError::Env {
                    var: var.clone(),
                    message: e.to_string(),
                })?;
        }

        Ok(config)
    }
}

fn default_true() -> bool {
    true
}

fn default_key_path() -> String {
    "/v1/models".to_string()
}

fn default_handshake_path() -> String {
    "/".to_string()
}

fn default_request_path() -> String {
    "/v1/chat/completions".to_string()
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_slow_threshold() -> Duration {
    Duration::from_secs(5)
}

fn invalid(code: &'static str, message: String) -> ValidationError {
    ValidationError::new(code).with_message(message.into())
}

fn validate_non_zero(duration: &Duration) -> Result<(), ValidationError> {
    if duration.is_zero() {
        return Err(invalid("zero_duration", "must be greater than zero".to_string()));
    }
    Ok(())
}

fn validate_interval(interval: &Duration) -> Result<(), ValidationError> {
    validate_non_zero(interval)?;
    if *interval > MAX_SCHEDULE_DELAY {
        return Err(invalid(
            "interval",
            format!("must not exceed {}", format_duration(MAX_SCHEDULE_DELAY)),
        ));
    }
    Ok(())
}

fn validate_stagger(unit: &Duration) -> Result<(), ValidationError> {
    let last_offset = unit.saturating_mul(u32::from(Tier::RealRequest.ordinal()));
    if last_offset > MAX_SCHEDULE_DELAY {
        return Err(invalid(
            "stagger_unit",
            format!("offsets must not exceed {}", format_duration(MAX_SCHEDULE_DELAY)),
        ));
    }
    Ok(())
}

fn validate_policy(policy: &ProviderPolicy) -> Result<(), ValidationError> {
    if policy.capacity == 0 {
        return Err(invalid("policy", "capacity must be at least 1".to_string()));
    }
    if policy.max_failures == 0 {
        return Err(invalid("policy", "max_failures must be at least 1".to_string()));
    }
    if policy.success_threshold == 0 {
        return Err(invalid("policy", "success_threshold must be at least 1".to_string()));
    }
    Ok(())
}

fn validate_retry(retry: &RetryConfig) -> Result<(), ValidationError> {
    if retry.multiplier < 1.0 {
        return Err(invalid("retry", format!("multiplier {} is below 1.0", retry.multiplier)));
    }
    if !(0.0..=1.0).contains(&retry.jitter) {
        return Err(invalid("retry", format!("jitter {} is outside 0.0..=1.0", retry.jitter)));
    }
    if retry.base_delay > retry.max_delay {
        return Err(invalid("retry", "base_delay exceeds max_delay".to_string()));
    }
    Ok(())
}

fn validate_uptime(uptime: &UptimeConfig) -> Result<(), ValidationError> {
    if uptime.window == 0 {
        return Err(invalid("uptime", "window must be at least 1".to_string()));
    }
    Ok(())
}

fn validate_unique_names(config: &GatewayConfig) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for provider in &config.providers {
        if !seen.insert(provider.name.as_str()) {
            return Err(invalid(
                "duplicate_provider",
                format!("provider '{}' is configured more than once", provider.name),
            ));
        }
    }
    Ok(())
}
