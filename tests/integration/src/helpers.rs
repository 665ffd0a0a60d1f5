//! Test helper utilities for integration tests

use gateway_core::{GatewayError, GatewayResult};
use gateway_health::{
    EngineConfig, HealthEngine, HealthScheduler, HealthService, Prober, ProberRegistry,
    SchedulerConfig,
};
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Initialize tracing for tests (only once)
static TRACING: Lazy<()> = Lazy::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
});

/// Initialize tracing for tests
pub fn init_tracing() {
    Lazy::force(&TRACING);
}

/// Registry, engine, scheduler and service wired together
pub struct HealthStack {
    /// Prober registry
    pub registry: Arc<ProberRegistry>,
    /// Health engine
    pub engine: Arc<HealthEngine>,
    /// Background scheduler
    pub scheduler: Arc<HealthScheduler>,
    /// Query facade
    pub service: HealthService,
}

impl HealthStack {
    /// Build a stack over `probers` with jitter disabled
    pub fn new(probers: Vec<Arc<dyn Prober>>, config: SchedulerConfig) -> Self {
        init_tracing();

        let registry = Arc::new(ProberRegistry::new());
        for prober in probers {
            registry.register(prober).expect("duplicate prober in test setup");
        }

        let engine = Arc::new(HealthEngine::new(
            Arc::clone(&registry),
            EngineConfig {
                ttl_jitter: Duration::ZERO,
            },
        ));
        let scheduler = Arc::new(HealthScheduler::new(Arc::clone(&engine), config));
        let service = HealthService::new(Arc::clone(&engine), Arc::clone(&scheduler));

        Self {
            registry,
            engine,
            scheduler,
            service,
        }
    }

    /// Build a stack with the default scheduler timing
    pub fn with_probers(probers: Vec<Arc<dyn Prober>>) -> Self {
        Self::new(probers, SchedulerConfig::default())
    }
}

/// Scheduler timing with a one minute stagger and hour-long intervals
pub fn slow_schedule() -> SchedulerConfig {
    SchedulerConfig {
        key_validation_interval: Duration::from_secs(3600),
        handshake_interval: Duration::from_secs(3600),
        real_request_interval: Duration::from_secs(3600),
        stagger_unit: Duration::from_secs(60),
    }
}

/// Operation that fails a fixed number of times before succeeding
#[derive(Debug, Default)]
pub struct FlakyOperation {
    failures: u32,
    attempts: AtomicU32,
}

impl FlakyOperation {
    /// Fail the first `failures` attempts with a retryable upstream error
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            attempts: AtomicU32::new(0),
        }
    }

    /// Run one attempt
    pub async fn call(&self, provider: &str) -> GatewayResult<&'static str> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            Err(upstream_error(provider, 503))
        } else {
            Ok("served")
        }
    }

    /// Number of attempts made so far
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

/// Upstream failure carrying an HTTP status
pub fn upstream_error(provider: &str, status: u16) -> GatewayError {
    GatewayError::provider(provider, format!("upstream returned {status}"), Some(status), false)
}
