//! Tiered escalation, caching and aggregation through the health engine

use crate::fixtures::ScriptedProber;
use crate::helpers::HealthStack;
use gateway_core::GatewayError;
use gateway_health::{HealthStatus, OverallStatus, Prober, Tier};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_escalation_stops_at_first_ok_tier() {
    let prober = Arc::new(
        ScriptedProber::new("openai").with_status(Tier::KeyValidation, HealthStatus::Suspect),
    );
    let stack = HealthStack::with_probers(vec![prober.clone() as Arc<dyn Prober>]);

    let result = stack
        .engine
        .check_with_escalation("openai", Tier::RealRequest, false)
        .await
        .unwrap();

    assert_eq!(result.tier, Tier::Handshake);
    assert_eq!(result.status, HealthStatus::Ok);
    assert_eq!(prober.calls(Tier::KeyValidation), 1);
    assert_eq!(prober.calls(Tier::Handshake), 1);
    assert_eq!(prober.calls(Tier::RealRequest), 0);
}

#[tokio::test]
async fn test_escalation_returns_highest_visited_tier_when_nothing_ok() {
    let prober = Arc::new(
        ScriptedProber::new("groq")
            .with_status(Tier::KeyValidation, HealthStatus::Suspect)
            .with_status(Tier::Handshake, HealthStatus::Degraded)
            .with_status(Tier::RealRequest, HealthStatus::Down),
    );
    let stack = HealthStack::with_probers(vec![prober.clone() as Arc<dyn Prober>]);

    let result = stack
        .engine
        .check_with_escalation("groq", Tier::Handshake, false)
        .await
        .unwrap();

    assert_eq!(result.tier, Tier::Handshake);
    assert_eq!(result.status, HealthStatus::Degraded);
    assert_eq!(prober.calls(Tier::RealRequest), 0);
}

#[tokio::test]
async fn test_cached_results_short_circuit_escalation() {
    let prober = Arc::new(
        ScriptedProber::new("openai").with_status(Tier::KeyValidation, HealthStatus::Suspect),
    );
    let stack = HealthStack::with_probers(vec![prober.clone() as Arc<dyn Prober>]);

    for _ in 0..3 {
        stack
            .engine
            .check_with_escalation("openai", Tier::RealRequest, false)
            .await
            .unwrap();
    }

    assert_eq!(prober.calls(Tier::KeyValidation), 1);
    assert_eq!(prober.calls(Tier::Handshake), 1);
}

#[tokio::test]
async fn test_force_bypasses_cache() {
    let prober = Arc::new(ScriptedProber::new("openai"));
    let stack = HealthStack::with_probers(vec![prober.clone() as Arc<dyn Prober>]);

    stack.engine.check("openai", Tier::KeyValidation, false).await.unwrap();
    prober.set_status(Tier::KeyValidation, HealthStatus::Down);

    let cached = stack.engine.check("openai", Tier::KeyValidation, false).await.unwrap();
    assert_eq!(cached.status, HealthStatus::Ok);

    let fresh = stack.engine.check("openai", Tier::KeyValidation, true).await.unwrap();
    assert_eq!(fresh.status, HealthStatus::Down);
    assert_eq!(prober.calls(Tier::KeyValidation), 2);

    // The forced result replaces the cached one
    let cached = stack.engine.check("openai", Tier::KeyValidation, false).await.unwrap();
    assert_eq!(cached.status, HealthStatus::Down);
}

#[tokio::test]
async fn test_expired_entry_is_reprobed() {
    let prober = Arc::new(ScriptedProber::new("openai").with_hint(Duration::from_millis(30)));
    let stack = HealthStack::with_probers(vec![prober.clone() as Arc<dyn Prober>]);

    stack.engine.check("openai", Tier::Handshake, false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    stack.engine.check("openai", Tier::Handshake, false).await.unwrap();

    assert_eq!(prober.calls(Tier::Handshake), 2);
}

#[tokio::test]
async fn test_prober_error_is_reported_as_down_and_cached() {
    let prober = Arc::new(ScriptedProber::new("flaky").failing_at(Tier::KeyValidation));
    let stack = HealthStack::with_probers(vec![prober.clone() as Arc<dyn Prober>]);

    let result = stack.engine.check("flaky", Tier::KeyValidation, false).await.unwrap();
    assert_eq!(result.status, HealthStatus::Down);
    assert!(result.detail.contains("connection refused"));
    assert_eq!(result.provider, "flaky");

    stack.engine.check("flaky", Tier::KeyValidation, false).await.unwrap();
    assert_eq!(prober.calls(Tier::KeyValidation), 1);
}

#[tokio::test]
async fn test_unknown_provider_is_an_error() {
    let stack = HealthStack::with_probers(vec![]);

    let err = stack.engine.check("missing", Tier::KeyValidation, false).await.unwrap_err();
    assert!(matches!(err, GatewayError::UnknownProvider { .. }));

    let err = stack.service.clear_cache("missing").unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_invalid_tier_ordinal_is_rejected() {
    let stack = HealthStack::with_probers(vec![Arc::new(ScriptedProber::new("openai"))]);

    let err = stack.service.check_ordinal("openai", 4, false, false).await.unwrap_err();
    assert!(matches!(err, GatewayError::InvalidTier { tier: 4 }));

    let result = stack.service.check_ordinal("openai", 2, false, false).await.unwrap();
    assert_eq!(result.tier, Tier::Handshake);
}

#[tokio::test]
async fn test_provider_status_takes_best_cached_tier() {
    let prober = Arc::new(
        ScriptedProber::new("openai")
            .with_status(Tier::KeyValidation, HealthStatus::Suspect)
            .with_status(Tier::Handshake, HealthStatus::Degraded),
    );
    let stack = HealthStack::with_probers(vec![prober as Arc<dyn Prober>]);

    let empty = stack.service.provider_status("openai").unwrap();
    assert_eq!(empty.status, None);
    assert!(empty.tiers.is_empty());

    stack.engine.check("openai", Tier::KeyValidation, false).await.unwrap();
    stack.engine.check("openai", Tier::Handshake, false).await.unwrap();

    let status = stack.service.provider_status("openai").unwrap();
    assert_eq!(status.status, Some(HealthStatus::Degraded));
    assert_eq!(status.tiers.len(), 2);

    assert_eq!(stack.service.clear_cache("openai").unwrap(), 2);
    assert_eq!(stack.service.provider_status("openai").unwrap().status, None);
}

#[tokio::test]
async fn test_check_all_report() {
    let healthy = Arc::new(ScriptedProber::new("openai"));
    let failing = Arc::new(
        ScriptedProber::new("groq")
            .with_status(Tier::KeyValidation, HealthStatus::Down)
            .with_hint(Duration::from_millis(2500)),
    );
    let stack = HealthStack::with_probers(vec![
        healthy as Arc<dyn Prober>,
        failing as Arc<dyn Prober>,
    ]);

    let report = stack.service.check_all(Tier::KeyValidation, false, false).await;

    assert_eq!(report.overall, OverallStatus::Degraded);
    assert_eq!(report.summary.ok, 1);
    assert_eq!(report.summary.down, 1);
    assert_eq!(report.summary.total(), 2);
    assert_eq!(report.providers["groq"].status, HealthStatus::Down);
    assert_eq!(report.retry_after_secs, Some(3));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["overall"], "degraded");
}

#[tokio::test]
async fn test_check_all_escalates_per_provider() {
    let prober = Arc::new(
        ScriptedProber::new("openai").with_status(Tier::KeyValidation, HealthStatus::Suspect),
    );
    let stack = HealthStack::with_probers(vec![prober as Arc<dyn Prober>]);

    let report = stack.service.check_all(Tier::RealRequest, true, false).await;

    assert_eq!(report.overall, OverallStatus::Ok);
    assert_eq!(report.providers["openai"].tier, Tier::Handshake);
    assert_eq!(report.retry_after_secs, Some(3600));
}

#[tokio::test]
async fn test_empty_registry_reports_ok() {
    let stack = HealthStack::with_probers(vec![]);

    let report = stack.service.check_all(Tier::KeyValidation, true, false).await;

    assert_eq!(report.overall, OverallStatus::Ok);
    assert!(report.providers.is_empty());
    assert_eq!(report.retry_after_secs, None);
}

#[tokio::test]
async fn test_all_down_reports_down() {
    let stack = HealthStack::with_probers(vec![
        Arc::new(ScriptedProber::new("a").failing_at(Tier::KeyValidation)),
        Arc::new(ScriptedProber::new("b").with_status(Tier::KeyValidation, HealthStatus::Suspect)),
    ]);

    let report = stack.service.check_all(Tier::KeyValidation, false, false).await;

    assert_eq!(report.overall, OverallStatus::Down);
    assert_eq!(report.summary.down, 1);
    assert_eq!(report.summary.suspect, 1);
}

#[tokio::test]
async fn test_unregistered_provider_drops_out_of_reports() {
    let stack = HealthStack::with_probers(vec![
        Arc::new(ScriptedProber::new("openai")),
        Arc::new(ScriptedProber::new("groq")),
    ]);
    stack.service.check_all(Tier::KeyValidation, false, false).await;

    assert!(stack.registry.unregister("groq").is_some());

    let report = stack.service.check_all(Tier::KeyValidation, false, false).await;
    assert_eq!(report.providers.len(), 1);
    assert!(report.providers.contains_key("openai"));
}
