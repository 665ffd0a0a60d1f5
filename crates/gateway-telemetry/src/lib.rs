//! # Gateway Telemetry
//!
//! Structured logging for the LLM gateway resilience services.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod logging;

// Re-export main types
pub use logging::{init_logging, LogFormat, LoggingConfig, LoggingError};
