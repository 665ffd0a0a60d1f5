//! Configuration driven wiring of the health and resilience stacks

use crate::fixtures::sample_config_yaml;
use crate::helpers::init_tracing;
use crate::mock_providers::MockProviderApi;
use gateway_config::{ConfigLoader, GatewayConfig};
use gateway_core::GatewayError;
use gateway_health::{HealthEngine, HealthStatus, ProberRegistry, Tier};
use gateway_probes::HttpProber;
use gateway_resilience::{CircuitState, ResilienceMiddleware};
use pretty_assertions::assert_eq;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

fn load(yaml: &str) -> GatewayConfig {
    init_tracing();
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    ConfigLoader::new()
        .with_file(file.path())
        .without_env()
        .load()
        .unwrap()
}

fn build_registry(config: &GatewayConfig) -> Arc<ProberRegistry> {
    let registry = ProberRegistry::new();
    for provider in config.enabled_providers() {
        if let Some(probe) = &provider.probe {
            let prober_config = probe.to_prober_config(&provider.name).unwrap();
            registry
                .register(Arc::new(HttpProber::new(prober_config).unwrap()))
                .unwrap();
        }
    }
    Arc::new(registry)
}

fn build_middleware(config: &GatewayConfig) -> ResilienceMiddleware {
    let middleware = ResilienceMiddleware::new(
        &config.resilience.default_policy,
        config.resilience.retry.clone(),
        config.resilience.uptime.clone(),
    );
    for provider in config.enabled_providers() {
        middleware.register_provider(&provider.name, &config.policy_for(provider));
    }
    middleware
}

#[tokio::test]
async fn test_sample_config_drives_health_engine() {
    let mock = MockProviderApi::start().await;
    mock.mock_models_status(200).await;
    let config = load(&sample_config_yaml(&mock.url()));

    let registry = build_registry(&config);
    assert_eq!(registry.names(), vec!["mock-openai".to_string()]);

    let engine = HealthEngine::new(Arc::clone(&registry), config.health.engine_config());
    let result = engine.check("mock-openai", Tier::KeyValidation, false).await.unwrap();

    assert_eq!(result.status, HealthStatus::Ok);
    let jitter = config.health.ttl_jitter;
    assert!(result.ttl >= Duration::from_secs(30) - jitter);
    assert!(result.ttl <= Duration::from_secs(30) + jitter);

    let schedule = config.health.scheduler_config();
    assert_eq!(schedule.key_validation_interval, Duration::from_secs(60));
    assert_eq!(schedule.start_offset(Tier::RealRequest), Duration::from_secs(3));
}

#[tokio::test]
async fn test_sample_config_drives_middleware_policies() {
    let config = load(&sample_config_yaml("http://127.0.0.1:9"));
    let middleware = build_middleware(&config);

    // `unprobed` overrides capacity, keeping the other policy defaults
    middleware.execute("unprobed", || async { Ok(()) }).await.unwrap();
    let err = middleware
        .execute("unprobed", || async { Ok(()) })
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::RateLimited { .. }));

    // `mock-openai` uses the default policy: two failures open the circuit
    for _ in 0..2 {
        let _ = middleware
            .execute("mock-openai", || async {
                Err::<(), _>(GatewayError::timeout(Duration::from_millis(1)))
            })
            .await;
    }
    let status = middleware.provider_status("mock-openai");
    assert_eq!(status.circuit_state, CircuitState::Open);
    assert_eq!(status.available_tokens, Some(8));

    // Disabled providers get no bucket
    assert_eq!(middleware.provider_status("disabled").available_tokens, None);
}

#[test]
fn test_retry_settings_from_file() {
    let config = load(&sample_config_yaml("http://127.0.0.1:9"));

    assert_eq!(config.resilience.retry.max_retries, 1);
    assert_eq!(config.resilience.retry.base_delay, Duration::from_millis(1));
    assert_eq!(config.resilience.retry.retry_on_status, vec![429, 500, 502, 503, 504]);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_invalid_probe_url_fails_validation() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(sample_config_yaml("not a url").as_bytes())
        .unwrap();

    let err = ConfigLoader::new()
        .with_file(file.path())
        .without_env()
        .load()
        .unwrap_err();

    assert!(err.to_string().contains("base_url"), "unexpected error: {err}");
}
