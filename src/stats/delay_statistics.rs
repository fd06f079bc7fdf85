//! Inter-arrival delay statistics
//!
//! This module turns an arrival log into the delay distribution metrics that get reported.
//! Everything here is a pure function of its input.

use serde::Serialize;

use crate::stats::arrival_log::ArrivalLog;

/// Distribution of inter-arrival delays, all values in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelayStatistics {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub stdev: f64, // sample stdev, 0 for a single delay or constant delays
    pub p95: f64,
    pub p99: f64,
}

impl DelayStatistics {
    /// Compute statistics from delay samples. Returns `None` for an empty slice.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let n = sorted.len();
        let (min, max) = (sorted[0], sorted[n - 1]);
        // Summation rounding can push the quotient just past the extremes.
        let mean = (sorted.iter().sum::<f64>() / n as f64).clamp(min, max);
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };

        // Bessel-corrected; 0 for one sample or when every sample is equal
        let stdev = if n >= 2 && min < max {
            let variance = sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            variance.sqrt()
        } else {
            0.0
        };

        Some(Self {
            mean,
            median,
            min,
            max,
            stdev,
            p95: Self::percentile(&sorted, 95.0),
            p99: Self::percentile(&sorted, 99.0),
        })
    }

    /// Calculate percentile of sorted data
    fn percentile(sorted_data: &[f64], p: f64) -> f64 {
        if sorted_data.is_empty() {
            return 0.0;
        }
        let idx = (p / 100.0 * (sorted_data.len() - 1) as f64).round() as usize;
        sorted_data[idx.min(sorted_data.len() - 1)]
    }
}

/// Final summary of one measurement run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementResult {
    pub packet_count: usize,
    pub bytes_received: usize,
    pub delay_count: usize,
    /// Seconds between the first and the last arrival
    pub observed_duration_secs: f64,
    /// Packets per second, absent when the observed duration is zero
    pub average_rate: Option<f64>,
    /// Absent when fewer than two packets arrived
    pub delays: Option<DelayStatistics>,
}

impl MeasurementResult {
    pub fn from_log(log: &ArrivalLog) -> Self {
        let delays_ms = log.delays_ms();
        let observed_duration_secs = match (log.first(), log.last()) {
            (Some(first), Some(last)) if log.len() >= 2 => last.duration_since(first).as_secs_f64(),
            _ => 0.0,
        };
        let average_rate = if observed_duration_secs > 0.0 {
            Some(log.len() as f64 / observed_duration_secs)
        } else {
            None
        };

        Self {
            packet_count: log.len(),
            bytes_received: log.bytes_received(),
            delay_count: delays_ms.len(),
            observed_duration_secs,
            average_rate,
            delays: DelayStatistics::from_samples(&delays_ms),
        }
    }

    /// False when there were too few arrivals to compute any delay
    pub fn has_delay_statistics(&self) -> bool {
        self.delays.is_some()
    }
}
