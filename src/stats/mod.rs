//! Arrival recording and delay statistics

pub mod arrival_log;
pub mod delay_statistics;

pub use arrival_log::ArrivalLog;
pub use delay_statistics::{DelayStatistics, MeasurementResult};
