//! Stream Latency Probe Library
//!
//! This library connects to a byte-stream emitter, timestamps every received unit
//! for a bounded window and summarizes the inter-arrival delays.

pub mod core;
pub mod error;
pub mod stats;
pub mod ui;
pub mod utils;

pub use crate::core::{measure, run_measurement, RunOutcome};
pub use error::{ProbeError, Result};

/// Library version
pub const VERSION: &str = "0.1.0";
