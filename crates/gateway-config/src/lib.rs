//! # Gateway Config
//!
//! Typed configuration for the gateway resilience services:
//! - YAML or TOML files, chosen by extension
//! - `GATEWAY_*` environment overrides
//! - Validation before anything is built from it
//! - Conversion into the runtime types of the health, resilience and probe
//!   crates

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod model;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, CONFIG_PATH_ENV};
pub use model::{
    GatewayConfig, HealthSettings, ProbeSettings, ProbeTtlSettings, ProviderSettings,
    ResilienceSettings,
};
