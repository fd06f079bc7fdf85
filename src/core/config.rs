//! Run configuration loaded from `appsettings.json`.

use std::path::Path;
use std::time::Duration;
use std::{fs, io};

use serde::{Deserialize, Serialize};

use crate::error::{ProbeError, Result};

/// How the final statistics are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MeasurementConfig {
    #[serde(rename = "Address", default = "default_address")]
    pub address: String,
    #[serde(rename = "Port", default = "default_port", deserialize_with = "validate_port")]
    pub port: u16,
    /// Bytes requested per receive
    #[serde(rename = "BufferSize", default = "default_buffer_size", deserialize_with = "validate_positive_usize")]
    pub buffer_size: usize,
    #[serde(rename = "MeasurementDurationSec", default = "default_measurement_duration", deserialize_with = "validate_positive_f64")]
    pub measurement_duration_secs: f64,
    #[serde(rename = "ConnectTimeoutSec", default = "default_connect_timeout", deserialize_with = "validate_positive_f64")]
    pub connect_timeout_secs: f64,
    #[serde(rename = "ReceiveTimeoutSec", default = "default_receive_timeout", deserialize_with = "validate_positive_f64")]
    pub receive_timeout_secs: f64,
    #[serde(rename = "StallThresholdSec", default = "default_stall_threshold", deserialize_with = "validate_positive_f64")]
    pub stall_threshold_secs: f64,
    #[serde(rename = "LogLevel", default = "default_log_level")]
    pub log_level: String,
    #[serde(rename = "ReportFormat", default)]
    pub report_format: ReportFormat,
}

fn default_address() -> String {
    "192.168.4.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_buffer_size() -> usize {
    1
}

fn default_measurement_duration() -> f64 {
    10.0
}

fn default_connect_timeout() -> f64 {
    10.0
}

fn default_receive_timeout() -> f64 {
    1.0
}

fn default_stall_threshold() -> f64 {
    5.0
}

fn default_log_level() -> String {
    "info".to_string()
}

fn validate_positive_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if value > 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(serde::de::Error::custom("Value must be positive"))
    }
}

fn validate_positive_usize<'de, D>(deserializer: D) -> std::result::Result<usize, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = usize::deserialize(deserializer)?;
    if value > 0 {
        Ok(value)
    } else {
        Err(serde::de::Error::custom("Value must be positive"))
    }
}

fn validate_port<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = u16::deserialize(deserializer)?;
    if value > 0 {
        Ok(value)
    } else {
        Err(serde::de::Error::custom("Port must be non-zero"))
    }
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            buffer_size: default_buffer_size(),
            measurement_duration_secs: default_measurement_duration(),
            connect_timeout_secs: default_connect_timeout(),
            receive_timeout_secs: default_receive_timeout(),
            stall_threshold_secs: default_stall_threshold(),
            log_level: default_log_level(),
            report_format: ReportFormat::default(),
        }
    }
}

impl MeasurementConfig {
    /// Load settings from `path`. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => Self::from_json(&content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("{} not found, using default settings", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks the per-field deserializers cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(ProbeError::InvalidParameter("Address must not be empty".into()));
        }
        if self.buffer_size == 0 {
            return Err(ProbeError::InvalidParameter("BufferSize must be positive".into()));
        }
        self.connect_timeout()?;
        self.loop_settings()?;
        // Several receive timeouts must fit inside one stall window.
        if self.receive_timeout_secs >= self.stall_threshold_secs {
            return Err(ProbeError::InvalidParameter(format!(
                "ReceiveTimeoutSec ({}) must be smaller than StallThresholdSec ({})",
                self.receive_timeout_secs, self.stall_threshold_secs
            )));
        }
        Ok(())
    }

    /// `host:port` string handed to the byte-stream source
    pub fn endpoint(&self) -> String {
        crate::utils::helpers::endpoint(&self.address, self.port)
    }

    pub fn connect_timeout(&self) -> Result<Duration> {
        secs_to_duration("ConnectTimeoutSec", self.connect_timeout_secs)
    }

    pub fn loop_settings(&self) -> Result<LoopSettings> {
        Ok(LoopSettings {
            buffer_size: self.buffer_size,
            measurement_duration: secs_to_duration("MeasurementDurationSec", self.measurement_duration_secs)?,
            receive_timeout: secs_to_duration("ReceiveTimeoutSec", self.receive_timeout_secs)?,
            stall_threshold: secs_to_duration("StallThresholdSec", self.stall_threshold_secs)?,
        })
    }
}

/// Positive, representable seconds only; negative, NaN and overflowing values are rejected.
fn secs_to_duration(name: &str, secs: f64) -> Result<Duration> {
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) if secs > 0.0 => Ok(duration),
        _ => Err(ProbeError::InvalidParameter(format!("{name} must be positive, got {secs}"))),
    }
}

/// The subset of the configuration the measurement loop runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    pub buffer_size: usize,
    pub measurement_duration: Duration,
    pub receive_timeout: Duration,
    pub stall_threshold: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            measurement_duration: Duration::from_secs(10),
            receive_timeout: Duration::from_secs(1),
            stall_threshold: Duration::from_secs(5),
        }
    }
}
