//! # Gateway Core
//!
//! Core types shared by every crate of the gateway resilience subsystem.
//!
//! This crate provides:
//! - The gateway error taxonomy
//! - The `GatewayResult` alias used by library crates

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;

// Re-export commonly used types
pub use error::{GatewayError, GatewayResult};
