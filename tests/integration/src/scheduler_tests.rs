//! Background scheduling and the health service facade

use crate::fixtures::ScriptedProber;
use crate::helpers::{slow_schedule, HealthStack};
use gateway_health::{HealthStatus, Prober, SchedulerConfig, Tier};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn probers(names: &[&str]) -> Vec<Arc<ScriptedProber>> {
    names.iter().map(|name| Arc::new(ScriptedProber::new(name))).collect()
}

fn as_dyn(probers: &[Arc<ScriptedProber>]) -> Vec<Arc<dyn Prober>> {
    probers
        .iter()
        .map(|prober| Arc::clone(prober) as Arc<dyn Prober>)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_tiers_start_staggered_across_providers() {
    let probers = probers(&["openai", "anthropic", "groq"]);
    let stack = HealthStack::new(as_dyn(&probers), slow_schedule());

    assert!(stack.scheduler.start());

    sleep(Duration::from_secs(59)).await;
    assert!(probers.iter().all(|p| p.total_calls() == 0));

    sleep(Duration::from_secs(2)).await;
    for prober in &probers {
        assert_eq!(prober.calls(Tier::KeyValidation), 1);
        assert_eq!(prober.calls(Tier::Handshake), 0);
    }

    sleep(Duration::from_secs(60)).await;
    for prober in &probers {
        assert_eq!(prober.calls(Tier::Handshake), 1);
        assert_eq!(prober.calls(Tier::RealRequest), 0);
    }

    sleep(Duration::from_secs(60)).await;
    for prober in &probers {
        assert_eq!(prober.calls(Tier::RealRequest), 1);
    }

    stack.scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_runs_honour_the_cache() {
    let probers = probers(&["openai"]);
    let config = SchedulerConfig {
        key_validation_interval: Duration::from_secs(10),
        stagger_unit: Duration::from_secs(1),
        ..slow_schedule()
    };
    let stack = HealthStack::new(as_dyn(&probers), config);

    stack.scheduler.start();
    sleep(Duration::from_secs(35)).await;

    // Four ticks, but the one hour hint keeps the first result cached
    assert_eq!(probers[0].calls(Tier::KeyValidation), 1);

    stack.scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_start_is_idempotent_and_stop_halts_runs() {
    let probers = probers(&["openai"]);
    let stack = HealthStack::new(as_dyn(&probers), slow_schedule());

    assert!(stack.scheduler.start());
    assert!(!stack.scheduler.start());
    assert!(stack.service.scheduler_status().running);

    stack.scheduler.stop().await;
    assert!(!stack.service.scheduler_status().running);

    sleep(Duration::from_secs(600)).await;
    assert_eq!(probers[0].total_calls(), 0);

    // Stopping twice is harmless and a stopped scheduler can be restarted
    stack.scheduler.stop().await;
    assert!(stack.scheduler.start());
    sleep(Duration::from_secs(61)).await;
    assert_eq!(probers[0].calls(Tier::KeyValidation), 1);
    stack.scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_a_slow_run() {
    let prober = Arc::new(ScriptedProber::new("slow").with_delay(Duration::from_secs(3600)));
    let stack = HealthStack::new(vec![prober.clone() as Arc<dyn Prober>], slow_schedule());

    stack.scheduler.start();
    sleep(Duration::from_secs(61)).await;
    assert_eq!(prober.calls(Tier::KeyValidation), 1);

    stack.scheduler.stop().await;
    assert!(!stack.scheduler.is_running());

    // The aborted check never reached the cache
    assert_eq!(stack.engine.cache_stats().total, 0);
}

#[tokio::test]
async fn test_force_check_probes_every_tier_bypassing_cache() {
    let probers = probers(&["openai", "groq"]);
    probers[1].set_status(Tier::RealRequest, HealthStatus::Degraded);
    let stack = HealthStack::new(as_dyn(&probers), slow_schedule());

    stack.service.check_all(Tier::KeyValidation, false, false).await;

    let results = stack.service.force_check_all().await;
    assert_eq!(results.len(), 6);
    for prober in &probers {
        assert_eq!(prober.calls(Tier::KeyValidation), 2);
        assert_eq!(prober.calls(Tier::Handshake), 1);
        assert_eq!(prober.calls(Tier::RealRequest), 1);
    }

    let degraded: Vec<_> = results
        .iter()
        .filter(|r| r.status == HealthStatus::Degraded)
        .map(|r| (r.provider.as_str(), r.tier))
        .collect();
    assert_eq!(degraded, vec![("groq", Tier::RealRequest)]);
    assert_eq!(stack.engine.cache_stats().active, 6);
}

#[tokio::test]
async fn test_scheduler_status_reports_timing() {
    let stack = HealthStack::new(as_dyn(&probers(&["openai", "groq"])), SchedulerConfig::default());

    let status = stack.service.scheduler_status();
    assert!(!status.running);
    assert_eq!(status.provider_count, 2);

    let offsets: Vec<Duration> = status.tiers.iter().map(|t| t.start_offset).collect();
    assert_eq!(
        offsets,
        vec![
            Duration::from_secs(30),
            Duration::from_secs(60),
            Duration::from_secs(90)
        ]
    );
    assert_eq!(status.tiers[2].interval, Duration::from_secs(900));

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["tiers"][0]["interval"], "1m");
    assert_eq!(json["tiers"][0]["tier"], "key_validation");
}
