//! Configuration loading.
//!
//! Order of precedence, lowest first: built-in defaults, the config file,
//! `GATEWAY_*` environment variables. The result is validated before it is
//! returned.

use crate::error::{ConfigError, ConfigResult};
use crate::model::GatewayConfig;
use gateway_telemetry::LogFormat;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use validator::Validate;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "GATEWAY_CONFIG";

const LOG_LEVEL_ENV: &str = "GATEWAY_LOG_LEVEL";
const LOG_FORMAT_ENV: &str = "GATEWAY_LOG_FORMAT";
const HEALTH_ENABLED_ENV: &str = "GATEWAY_HEALTH_ENABLED";
const STAGGER_UNIT_ENV: &str = "GATEWAY_STAGGER_UNIT";
const RETRY_MAX_RETRIES_ENV: &str = "GATEWAY_RETRY_MAX_RETRIES";

/// Configuration loader
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    path: Option<PathBuf>,
    skip_env: bool,
}

impl ConfigLoader {
    /// Create a loader that uses defaults plus environment overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a loader for the file named by `GATEWAY_CONFIG`, if set
    #[must_use]
    pub fn from_env() -> Self {
        let loader = Self::new();
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => loader.with_file(path),
            _ => loader,
        }
    }

    /// Read the given file
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Ignore `GATEWAY_*` environment overrides
    #[must_use]
    pub fn without_env(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Load, override and validate the configuration
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed, an override is
    /// malformed, or validation fails
    pub fn load(&self) -> ConfigResult<GatewayConfig> {
        let mut config = match &self.path {
            Some(path) => Self::read_file(path)?,
            None => {
                debug!("No config file given, using defaults");
                GatewayConfig::default()
            }
        };

        if !self.skip_env {
            apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
        }

        config.validate()?;

        info!(
            providers = config.providers.len(),
            health_enabled = config.health.enabled,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Parse a file, picking the format from its extension
    ///
    /// # Errors
    /// Returns error if the file cannot be read, has an unknown extension, or
    /// does not parse
    pub fn read_file(path: &Path) -> ConfigResult<GatewayConfig> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let parse_error = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };

        match extension.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&contents).map_err(|e| parse_error(e.to_string())),
            "toml" => toml::from_str(&contents).map_err(|e| parse_error(e.to_string())),
            other => Err(ConfigError::UnsupportedFormat {
                extension: other.to_string(),
            }),
        }
    }
}

/// Apply `GATEWAY_*` overrides read through `lookup`
///
/// # Errors
/// Returns `ConfigError::Env` for a value that does not parse
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(level) = lookup(LOG_LEVEL_ENV) {
        config.logging.level = level;
    }

    if let Some(format) = lookup(LOG_FORMAT_ENV) {
        config.logging.format = format
            .parse::<LogFormat>()
            .map_err(|e| env_error(LOG_FORMAT_ENV, e))?;
    }

    if let Some(enabled) = lookup(HEALTH_ENABLED_ENV) {
        config.health.enabled = parse_bool(&enabled)
            .ok_or_else(|| env_error(HEALTH_ENABLED_ENV, format!("'{enabled}' is not a boolean")))?;
    }

    if let Some(unit) = lookup(STAGGER_UNIT_ENV) {
        config.health.stagger_unit = parse_duration(&unit)
            .map_err(|e| env_error(STAGGER_UNIT_ENV, e))?;
    }

    if let Some(retries) = lookup(RETRY_MAX_RETRIES_ENV) {
        config.resilience.retry.max_retries = retries
            .trim()
            .parse()
            .map_err(|e| env_error(RETRY_MAX_RETRIES_ENV, e))?;
    }

    Ok(())
}

fn env_error(var: &str, message: impl ToString) -> ConfigError {
    ConfigError::Env {
        var: var.to_string(),
        message: message.to_string(),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_duration(value: &str) -> Result<Duration, humantime_serde::re::humantime::DurationError> {
    humantime_serde::re::humantime::parse_duration(value.trim())
}
