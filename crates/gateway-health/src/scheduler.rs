//! Background health scheduler.
//!
//! Runs one periodic task per tier so the cache stays warm without relying on
//! request traffic. Each tier's first run is delayed by `tier ordinal ×
//! stagger_unit`, which keeps the tiers from all firing at boot. Every tick
//! spawns an independent, cache-honouring check per provider; a provider whose
//! previous check for the tier is still running is skipped until it finishes.

use crate::engine::HealthEngine;
use crate::probe::ProbeResult;
use crate::tier::Tier;
use gateway_core::GatewayResult;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Longest interval or start offset the scheduler will wait; larger values are clamped
pub const MAX_SCHEDULE_DELAY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between key validation runs
    pub key_validation_interval: Duration,
    /// Interval between handshake runs
    pub handshake_interval: Duration,
    /// Interval between real request runs
    pub real_request_interval: Duration,
    /// Unit of the per-tier start offset
    pub stagger_unit: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            key_validation_interval: Duration::from_secs(60),
            handshake_interval: Duration::from_secs(300),
            real_request_interval: Duration::from_secs(900),
            stagger_unit: Duration::from_secs(30),
        }
    }
}

impl SchedulerConfig {
    /// Interval configured for a tier, capped at [`MAX_SCHEDULE_DELAY`]
    #[must_use]
    pub fn interval(&self, tier: Tier) -> Duration {
        let interval = match tier {
            Tier::KeyValidation => self.key_validation_interval,
            Tier::Handshake => self.handshake_interval,
            Tier::RealRequest => self.real_request_interval,
        };
        interval.min(MAX_SCHEDULE_DELAY)
    }

    /// Delay before a tier's first run, capped at [`MAX_SCHEDULE_DELAY`]
    #[must_use]
    pub fn start_offset(&self, tier: Tier) -> Duration {
        self.stagger_unit
            .saturating_mul(u32::from(tier.ordinal()))
            .min(MAX_SCHEDULE_DELAY)
    }
}

/// Per-tier timing, as reported by [`SchedulerStatus`]
#[derive(Debug, Clone, Serialize)]
pub struct TierSchedule {
    /// Tier
    pub tier: Tier,
    /// Interval between runs
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Delay before the first run
    #[serde(with = "humantime_serde")]
    pub start_offset: Duration,
}

/// Scheduler introspection snapshot
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    /// Whether the per-tier tasks are running
    pub running: bool,
    /// Timing of each tier
    pub tiers: Vec<TierSchedule>,
    /// Number of providers each run fans out to
    pub provider_count: usize,
}

struct RunningTasks {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Drives the engine periodically, one task per tier
pub struct HealthScheduler {
    engine: Arc<HealthEngine>,
    config: SchedulerConfig,
    running: Mutex<Option<RunningTasks>>,
}

impl HealthScheduler {
    /// Create a stopped scheduler
    #[must_use]
    pub fn new(engine: Arc<HealthEngine>, config: SchedulerConfig) -> Self {
        Self {
            engine,
            config,
            running: Mutex::new(None),
        }
    }

    /// Scheduler configuration
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Check whether the tier tasks are running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Spawn one task per tier
    ///
    /// Must be called from within a Tokio runtime. Returns `false` without
    /// doing anything if the scheduler is already running.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock();
        if running.is_some() {
            debug!("Health scheduler already running");
            return false;
        }

        let cancel = CancellationToken::new();
        let handles = Tier::ALL
            .into_iter()
            .map(|tier| {
                tokio::spawn(run_tier_loop(
                    Arc::clone(&self.engine),
                    tier,
                    self.config.interval(tier),
                    self.config.start_offset(tier),
                    cancel.child_token(),
                ))
            })
            .collect();

        *running = Some(RunningTasks { cancel, handles });

        info!(
            providers = self.engine.registry().len(),
            stagger_unit_secs = self.config.stagger_unit.as_secs(),
            "Health scheduler started"
        );
        true
    }

    /// Cancel every tier task and wait for all of them to exit
    pub async fn stop(&self) {
        let tasks = self.running.lock().take();
        let Some(tasks) = tasks else {
            return;
        };

        tasks.cancel.cancel();
        for handle in tasks.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Health scheduler task ended abnormally");
            }
        }

        info!("Health scheduler stopped");
    }

    /// Probe every provider at every tier, bypassing the cache
    ///
    /// Results for providers that disappear mid-sweep are skipped.
    pub async fn force_check(&self) -> Vec<ProbeResult> {
        let providers = self.engine.providers();
        info!(providers = providers.len(), "Forced health sweep started");

        let checks = providers
            .into_iter()
            .flat_map(|provider| Tier::ALL.map(|tier| (provider.clone(), tier)))
            .map(|(provider, tier)| {
                let engine = Arc::clone(&self.engine);
                async move {
                    let outcome = engine.check(&provider, tier, true).await;
                    (provider, tier, outcome)
                }
            });

        futures::future::join_all(checks)
            .await
            .into_iter()
            .filter_map(|(provider, tier, outcome)| match outcome {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!(provider = %provider, tier = %tier, error = %e, "Forced check failed");
                    None
                }
            })
            .collect()
    }

    /// Running flag, per-tier timing and provider count
    #[must_use]
    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            running: self.is_running(),
            tiers: Tier::ALL
                .into_iter()
                .map(|tier| TierSchedule {
                    tier,
                    interval: self.config.interval(tier),
                    start_offset: self.config.start_offset(tier),
                })
                .collect(),
            provider_count: self.engine.registry().len(),
        }
    }
}

impl Drop for HealthScheduler {
    fn drop(&mut self) {
        if let Some(tasks) = self.running.get_mut().take() {
            tasks.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for HealthScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthScheduler")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// Marks a provider as having a check in flight for one tier until dropped
struct InFlight {
    providers: Arc<Mutex<HashSet<String>>>,
    provider: String,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.providers.lock().remove(&self.provider);
    }
}

type CheckOutcome = (String, GatewayResult<ProbeResult>);

async fn run_tier_loop(
    engine: Arc<HealthEngine>,
    tier: Tier,
    period: Duration,
    offset: Duration,
    cancel: CancellationToken,
) {
    let period = period.max(Duration::from_millis(1));
    let now = Instant::now();
    let start = now.checked_add(offset).unwrap_or(now);
    let mut ticker = interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    debug!(
        tier = %tier,
        interval_secs = period.as_secs(),
        offset_secs = offset.as_secs(),
        "Tier loop started"
    );

    let in_flight: Arc<Mutex<HashSet<String>>> = Arc::default();
    let mut checks = JoinSet::new();
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => spawn_tier_checks(&engine, tier, &in_flight, &mut checks),
            Some(joined) = checks.join_next(), if !checks.is_empty() => log_check_outcome(tier, joined),
        }
    }

    checks.abort_all();
    while let Some(joined) = checks.join_next().await {
        log_check_outcome(tier, joined);
    }

    debug!(tier = %tier, "Tier loop stopped");
}

/// Spawn one cache-permitting check per provider without a check already running
fn spawn_tier_checks(
    engine: &Arc<HealthEngine>,
    tier: Tier,
    in_flight: &Arc<Mutex<HashSet<String>>>,
    checks: &mut JoinSet<CheckOutcome>,
) {
    let mut skipped = 0_usize;
    for provider in engine.providers() {
        if !in_flight.lock().insert(provider.clone()) {
            skipped += 1;
            continue;
        }

        let guard = InFlight {
            providers: Arc::clone(in_flight),
            provider: provider.clone(),
        };
        let engine = Arc::clone(engine);
        checks.spawn(async move {
            let _guard = guard;
            let outcome = engine.check(&provider, tier, false).await;
            (provider, outcome)
        });
    }

    if skipped > 0 {
        debug!(tier = %tier, skipped, "Skipped providers with a check still running");
    }
}

fn log_check_outcome(tier: Tier, joined: Result<CheckOutcome, JoinError>) {
    match joined {
        Ok((provider, Ok(result))) => {
            debug!(provider = %provider, tier = %tier, status = %result.status, "Scheduled check done");
        }
        Ok((provider, Err(e))) => {
            warn!(provider = %provider, tier = %tier, error = %e, "Scheduled check failed");
        }
        Err(e) if e.is_cancelled() => {}
        Err(e) => {
            error!(tier = %tier, error = %e, "Scheduled check panicked");
        }
    }
}
