//! Test fixtures for integration tests
//!
//! Scripted probers and ready-made settings for the resilience middleware.

use async_trait::async_trait;
use gateway_core::{GatewayError, GatewayResult};
use gateway_health::{HealthStatus, ProbeResult, Prober, Tier};
use gateway_resilience::{ProviderPolicy, RetryConfig};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Prober whose per-tier answers are scripted by the test
pub struct ScriptedProber {
    name: String,
    statuses: Mutex<HashMap<Tier, HealthStatus>>,
    failing: Mutex<HashSet<Tier>>,
    calls: [AtomicUsize; 3],
    hint: Duration,
    delay: Option<Duration>,
}

impl ScriptedProber {
    /// Create a prober answering `ok` on every tier with a one hour hint
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            statuses: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            calls: [AtomicUsize::new(0), AtomicUsize::new(0), AtomicUsize::new(0)],
            hint: Duration::from_secs(3600),
            delay: None,
        }
    }

    /// Answer `status` at `tier`
    pub fn with_status(self, tier: Tier, status: HealthStatus) -> Self {
        self.set_status(tier, status);
        self
    }

    /// Fail with a transport error at `tier`
    pub fn failing_at(self, tier: Tier) -> Self {
        self.failing.lock().unwrap().insert(tier);
        self
    }

    /// Suggest `hint` as TTL on every tier
    pub fn with_hint(mut self, hint: Duration) -> Self {
        self.hint = hint;
        self
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Change the answer at `tier` while the prober is registered
    pub fn set_status(&self, tier: Tier, status: HealthStatus) {
        self.statuses.lock().unwrap().insert(tier, status);
    }

    /// Number of checks made at `tier`
    pub fn calls(&self, tier: Tier) -> usize {
        self.calls[usize::from(tier.ordinal() - 1)].load(Ordering::SeqCst)
    }

    /// Number of checks made at any tier
    pub fn total_calls(&self) -> usize {
        Tier::ALL.iter().map(|tier| self.calls(*tier)).sum()
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, tier: Tier) -> GatewayResult<ProbeResult> {
        self.calls[usize::from(tier.ordinal() - 1)].fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().unwrap().contains(&tier) {
            return Err(GatewayError::probe_transport(&self.name, "connection refused"));
        }

        let status = self
            .statuses
            .lock()
            .unwrap()
            .get(&tier)
            .copied()
            .unwrap_or(HealthStatus::Ok);
        Ok(ProbeResult::new(&self.name, tier, status, "scripted"))
    }

    fn healthy_hint(&self, _tier: Tier) -> Duration {
        self.hint
    }
}

/// Policy that trips quickly and recovers quickly
pub fn fast_policy() -> ProviderPolicy {
    ProviderPolicy {
        capacity: 100,
        refill_rate: 100,
        max_failures: 3,
        reset_timeout: Duration::from_millis(50),
        success_threshold: 2,
    }
}

/// Retry configuration with millisecond backoff
pub fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(10),
        ..Default::default()
    }
}

/// Gateway configuration with one probed provider at `{base_url}`
pub const SAMPLE_CONFIG_YAML: &str = r#"
logging:
  level: debug
health:
  enabled: true
  key_validation_interval: 1m
  stagger_unit: 1s
resilience:
  default_policy:
    capacity: 10
    refill_rate: 1
    max_failures: 2
    reset_timeout: 100ms
  retry:
    max_retries: 1
    base_delay: 1ms
providers:
  - name: mock-openai
    probe:
      base_url: "{base_url}"
      ttl:
        key_validation: 30s
  - name: unprobed
    policy:
      capacity: 1
  - name: disabled
    enabled: false
    probe:
      base_url: "http://127.0.0.1:1"
"#;

/// Sample configuration pointing at `base_url`
pub fn sample_config_yaml(base_url: &str) -> String {
    SAMPLE_CONFIG_YAML.replace("{base_url}", base_url)
}
