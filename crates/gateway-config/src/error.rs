//! Configuration errors.

use gateway_core::GatewayError;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file could not be parsed
    #[error("Failed to parse config file {path}: {message}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// The file extension is not a supported format
    #[error("Unsupported config format '{extension}' (expected yaml, yml or toml)")]
    UnsupportedFormat {
        /// Offending extension
        extension: String,
    },

    /// An environment override has an invalid value
    #[error("Invalid value for {var}: {message}")]
    Env {
        /// Variable name
        var: String,
        /// What was wrong
        message: String,
    },

    /// The configuration failed validation
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

impl From<validator::ValidationErrors> for ConfigError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

impl From<ConfigError> for GatewayError {
    fn from(error: ConfigError) -> Self {
        Self::configuration(error.to_string())
    }
}
