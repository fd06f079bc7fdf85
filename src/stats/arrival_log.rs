//! Arrival log for inter-arrival measurements
//!
//! This module holds the ordered sequence of arrival timestamps captured during one run.

use tokio::time::Instant;

use crate::error::{ProbeError, Result};

/// Ordered, append-only record of when each data unit arrived
#[derive(Debug, Clone, Default)]
pub struct ArrivalLog {
    arrivals: Vec<Instant>,
    bytes_received: usize,
}

impl ArrivalLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a log from existing timestamps, rejecting any that go backwards in time
    pub fn from_arrivals(arrivals: Vec<Instant>) -> Result<Self> {
        if let Some(i) = arrivals.windows(2).position(|w| w[1] < w[0]) {
            return Err(ProbeError::InvalidParameter(format!(
                "arrival {} precedes arrival {}",
                i + 1,
                i
            )));
        }
        Ok(Self {
            arrivals,
            bytes_received: 0,
        })
    }

    /// Append one arrival. Only the measurement loop writes to a live log.
    pub(crate) fn record(&mut self, at: Instant, bytes: usize) {
        // Instant is monotonic; clamp anyway so the ordering invariant cannot break.
        let at = match self.arrivals.last() {
            Some(&last) if at < last => last,
            _ => at,
        };
        self.arrivals.push(at);
        self.bytes_received += bytes;
    }

    pub fn arrivals(&self) -> &[Instant] {
        &self.arrivals
    }

    pub fn len(&self) -> usize {
        self.arrivals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrivals.is_empty()
    }

    pub fn first(&self) -> Option<Instant> {
        self.arrivals.first().copied()
    }

    pub fn last(&self) -> Option<Instant> {
        self.arrivals.last().copied()
    }

    /// Total payload bytes across all recorded arrivals
    pub fn bytes_received(&self) -> usize {
        self.bytes_received
    }

    /// Gaps between consecutive arrivals in milliseconds.
    ///
    /// Empty when fewer than two arrivals were recorded.
    pub fn delays_ms(&self) -> Vec<f64> {
        self.arrivals
            .windows(2)
            .map(|w| w[1].duration_since(w[0]).as_secs_f64() * 1000.0)
            .collect()
    }
}
