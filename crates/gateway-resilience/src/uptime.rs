//! Request-driven uptime tracking.
//!
//! Keeps the last `window` outcomes of guarded calls per provider and
//! classifies the most recent one by success and latency. This is a reactive
//! view of real traffic; scheduled probing lives in the health engine.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Uptime tracker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UptimeConfig {
    /// Number of recent outcomes kept per provider
    pub window: usize,
    /// Successful calls slower than this count as degraded
    #[serde(with = "humantime_serde")]
    pub slow_threshold: Duration,
}

impl Default for UptimeConfig {
    fn default() -> Self {
        Self {
            window: 100,
            slow_threshold: Duration::from_secs(2),
        }
    }
}

/// Classification of a single guarded call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UptimeStatus {
    /// Succeeded within the slow threshold
    Healthy,
    /// Succeeded, but slowly
    Degraded,
    /// Failed
    Unhealthy,
}

impl std::fmt::Display for UptimeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Outcome {
    success: bool,
    latency: Duration,
}

#[derive(Debug, Default)]
struct ProviderWindow {
    outcomes: VecDeque<Outcome>,
    last_status: Option<UptimeStatus>,
    total_recorded: u64,
}

/// Point-in-time uptime view of one provider
#[derive(Debug, Clone, Serialize)]
pub struct UptimeSnapshot {
    /// Provider name
    pub provider: String,
    /// Outcomes currently in the window
    pub samples: usize,
    /// Successful outcomes in the window
    pub successes: usize,
    /// Success share of the window, 0.0 - 100.0
    pub uptime_percent: f64,
    /// Mean latency over the window
    #[serde(with = "humantime_serde")]
    pub average_latency: Duration,
    /// Classification of the most recent call
    pub status: UptimeStatus,
    /// Outcomes recorded since start, including those rotated out
    pub total_recorded: u64,
}

/// Per-provider rolling windows of guarded call outcomes
#[derive(Debug, Default)]
pub struct UptimeTracker {
    config: UptimeConfig,
    windows: DashMap<String, ProviderWindow>,
}

impl UptimeTracker {
    /// Create a tracker
    #[must_use]
    pub fn new(config: UptimeConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &UptimeConfig {
        &self.config
    }

    /// Classify one call
    #[must_use]
    pub fn classify(&self, success: bool, latency: Duration) -> UptimeStatus {
        if !success {
            UptimeStatus::Unhealthy
        } else if latency > self.config.slow_threshold {
            UptimeStatus::Degraded
        } else {
            UptimeStatus::Healthy
        }
    }

    /// Record one call outcome and return its classification
    pub fn record(&self, provider: &str, success: bool, latency: Duration) -> UptimeStatus {
        let status = self.classify(success, latency);
        let capacity = self.config.window.max(1);

        let mut window = self.windows.entry(provider.to_string()).or_default();
        if window.outcomes.len() == capacity {
            window.outcomes.pop_front();
        }
        window.outcomes.push_back(Outcome { success, latency });
        window.last_status = Some(status);
        window.total_recorded += 1;

        status
    }

    /// Uptime view of one provider, `None` before its first recorded call
    #[must_use]
    pub fn snapshot(&self, provider: &str) -> Option<UptimeSnapshot> {
        let window = self.windows.get(provider)?;
        let status = window.last_status?;

        let samples = window.outcomes.len();
        let successes = window.outcomes.iter().filter(|o| o.success).count();
        let total_latency: Duration = window.outcomes.iter().map(|o| o.latency).sum();
        let (uptime_percent, average_latency) = if samples == 0 {
            (100.0, Duration::ZERO)
        } else {
            (
                successes as f64 * 100.0 / samples as f64,
                total_latency / samples as u32,
            )
        };

        Some(UptimeSnapshot {
            provider: provider.to_string(),
            samples,
            successes,
            uptime_percent,
            average_latency,
            status,
            total_recorded: window.total_recorded,
        })
    }

    /// Uptime views of every tracked provider, sorted by name
    #[must_use]
    pub fn snapshots(&self) -> Vec<UptimeSnapshot> {
        let mut names: Vec<String> = self.windows.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names.iter().filter_map(|name| self.snapshot(name)).collect()
    }
}
