//! # LLM Gateway Resilience
//!
//! Keeps a live picture of upstream provider health and guards outbound
//! provider calls with rate limiting, circuit breaking and retries.
//!
//! ## Features
//!
//! - Tiered health probing with escalation and a TTL cache
//! - Staggered background sweeps per tier
//! - Per-provider token buckets and circuit breakers
//! - Cancellable exponential backoff
//!
//! ## Usage
//!
//! ```bash
//! # Start with default configuration
//! llm-gateway-resilience
//!
//! # Start with a config file
//! GATEWAY_CONFIG=/path/to/gateway.yaml llm-gateway-resilience
//!
//! # Start with environment overrides
//! GATEWAY_LOG_LEVEL=debug GATEWAY_STAGGER_UNIT=5s llm-gateway-resilience
//! ```

use anyhow::Context;
use gateway_config::{ConfigError, ConfigLoader, GatewayConfig};
use gateway_health::{HealthEngine, HealthScheduler, HealthService, ProberRegistry, Tier};
use gateway_probes::HttpProber;
use gateway_resilience::ResilienceMiddleware;
use gateway_telemetry::init_logging;
use std::sync::Arc;
use tokio::signal;
use tracing::{debug, error, info, warn};

/// Application entry point
#[tokio::main]
async fn main() {
    let config = match ConfigLoader::from_env().load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting LLM gateway resilience services"
    );

    if let Err(e) = run(config).await {
        error!(error = %e, "Application failed");
        std::process::exit(1);
    }
}

/// Main application logic
async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    let registry = Arc::new(create_prober_registry(&config)?);
    info!(providers = registry.len(), "Prober registry initialized");

    let engine = Arc::new(HealthEngine::new(
        Arc::clone(&registry),
        config.health.engine_config(),
    ));
    let scheduler = Arc::new(HealthScheduler::new(
        Arc::clone(&engine),
        config.health.scheduler_config(),
    ));
    let health = HealthService::new(Arc::clone(&engine), Arc::clone(&scheduler));
    let middleware = create_middleware(&config);

    // Populate the cache before the first scheduled sweep
    let results = health.force_check_all().await;
    debug!(results = results.len(), "Boot sweep finished");
    let report = health.check_all(Tier::KeyValidation, false, false).await;
    info!(
        overall = ?report.overall,
        ok = report.summary.ok,
        degraded = report.summary.degraded,
        suspect = report.summary.suspect,
        down = report.summary.down,
        "Initial health sweep complete"
    );

    if config.health.enabled {
        scheduler.start();
    } else {
        warn!("Background health scheduler disabled by configuration");
    }

    let signal = shutdown_signal().await;
    info!(signal = signal, "Shutdown signal received");

    middleware.shutdown();
    scheduler.stop().await;

    for provider in config.enabled_providers() {
        let status = middleware.provider_status(&provider.name);
        debug!(
            provider = %provider.name,
            circuit = %status.circuit_state,
            uptime = ?status.uptime.map(|u| u.uptime_percent),
            "Final resilience state"
        );
    }

    info!("Shutdown complete");
    Ok(())
}

/// Create the prober registry from every enabled provider with a probe
fn create_prober_registry(config: &GatewayConfig) -> anyhow::Result<ProberRegistry> {
    let registry = ProberRegistry::new();

    for provider in config.enabled_providers() {
        let Some(probe) = &provider.probe else {
            debug!(provider = %provider.name, "Provider has no probe configured");
            continue;
        };

        let prober_config = match probe.to_prober_config(&provider.name) {
            Ok(prober_config) => prober_config,
            Err(ConfigError::Env { var, .. }) => {
                warn!(
                    provider = %provider.name,
                    var = %var,
                    "Provider has no API key configured, skipping"
                );
                continue;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("invalid probe for '{}'", provider.name))
            }
        };

        let prober = HttpProber::new(prober_config)
            .with_context(|| format!("failed to build prober for '{}'", provider.name))?;
        registry.register(Arc::new(prober))?;
    }

    Ok(registry)
}

/// Create the middleware and register every enabled provider's policy
fn create_middleware(config: &GatewayConfig) -> ResilienceMiddleware {
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

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        "ctrl+c"
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
        "sigterm"
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    tokio::select! {
        name = ctrl_c => name,
        name = terminate => name,
    }
}
