//! # Gateway Health
//!
//! Tiered health probing for the upstream providers behind the gateway:
//! - Prober contract implemented by each upstream integration
//! - TTL cache of probe results with lazy expiry
//! - Health engine with cache-first lookup, TTL jitter and tier escalation
//! - Background scheduler with staggered per-tier loops
//! - Query facade used by the route layer

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod probe;
pub mod registry;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod tier;

// Re-export main types
pub use engine::{jittered_ttl, EngineConfig, HealthEngine, ProviderHealth};
pub use probe::{HealthStatus, ProbeResult, Prober};
pub use registry::ProberRegistry;
pub use scheduler::{
    HealthScheduler, SchedulerConfig, SchedulerStatus, TierSchedule, MAX_SCHEDULE_DELAY,
};
pub use service::{HealthReport, HealthService, OverallStatus, StatusCounts};
pub use store::{CacheStats, CachedValue, ProbeCache, MAX_TTL};
pub use tier::Tier;
