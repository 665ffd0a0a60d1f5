//! # Gateway Probes
//!
//! Concrete [`gateway_health::Prober`] implementations for upstream
//! inference providers.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod http;

pub use http::{HttpProber, HttpProberConfig};
