//! Error types for the latency probe.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while configuring or setting up a measurement run
#[derive(Error, Debug)]
pub enum ProbeError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The peer did not accept the connection in time
    #[error("Connection attempt to {address} timed out after {timeout:?}")]
    ConnectTimeout { address: String, timeout: Duration },

    /// Refusal, unreachable host and resolution failures all end up here
    #[error("Could not connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl ProbeError {
    /// True for the errors that mean the connection was never established.
    pub fn is_setup_failure(&self) -> bool {
        matches!(self, ProbeError::ConnectTimeout { .. } | ProbeError::Connect { .. })
    }
}

/// Result type for probe operations
pub type Result<T> = std::result::Result<T, ProbeError>;
