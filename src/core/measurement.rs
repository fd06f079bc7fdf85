//! Timed receive loop.
//!
//! ```text
//!  Connecting ──open ok──▶ Measuring ──deadline / closed / stall / error / cancel──▶ Stopped(reason)
//!                            │   ▲
//!                            └───┘ data, or a timeout inside the stall window
//! ```
//!
//! The deadline is checked before every receive, and a receive blocks for at
//! most the receive timeout, so a run can overrun its window by up to one
//! receive timeout and no more.

use std::fmt;
use std::future::Future;

use tokio::time::Instant;

use crate::core::config::LoopSettings;
use crate::core::source::{Connection, RecvOutcome};
use crate::stats::arrival_log::ArrivalLog;
use crate::ui::reporter::Reporter;

/// Why a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    DurationElapsed,
    PeerClosed,
    /// No data for longer than the stall threshold
    Stalled,
    IoError(String),
    UserCancelled,
}

impl StopReason {
    /// Stable machine-readable name
    pub fn tag(&self) -> &'static str {
        match self {
            StopReason::DurationElapsed => "duration_elapsed",
            StopReason::PeerClosed => "peer_closed",
            StopReason::Stalled => "stalled",
            StopReason::IoError(_) => "io_error",
            StopReason::UserCancelled => "user_cancelled",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::DurationElapsed => write!(f, "measurement window elapsed"),
            StopReason::PeerClosed => write!(f, "connection closed by the peer during measurement"),
            StopReason::Stalled => write!(f, "no data within the stall threshold, assuming connection lost"),
            StopReason::IoError(e) => write!(f, "socket error during receiving: {e}"),
            StopReason::UserCancelled => write!(f, "measurement stopped early by user"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoopState {
    #[default]
    Connecting,
    Measuring,
    Stopped(StopReason),
}

/// One measurement run: owns the state and the arrival log.
#[derive(Debug)]
pub struct MeasurementLoop {
    settings: LoopSettings,
    state: LoopState,
    log: ArrivalLog,
}

impl MeasurementLoop {
    pub fn new(settings: LoopSettings) -> Self {
        Self {
            settings,
            state: LoopState::default(),
            log: ArrivalLog::new(),
        }
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    pub fn arrival_log(&self) -> &ArrivalLog {
        &self.log
    }

    /// Hand the finished log over to the caller.
    pub fn into_log(self) -> ArrivalLog {
        self.log
    }

    /// Measure on an open connection until a stop condition is hit.
    ///
    /// The connection is consumed and closed exactly once before this returns,
    /// whatever the reason. `cancel` resolving ends the run immediately, even
    /// in the middle of a blocked receive.
    pub async fn run<C, R, F>(&mut self, mut conn: C, reporter: &mut R, cancel: F) -> StopReason
    where
        C: Connection,
        R: Reporter + ?Sized,
        F: Future<Output = ()>,
    {
        if let LoopState::Stopped(reason) = &self.state {
            // A stopped loop never measures again.
            conn.close().await;
            return reason.clone();
        }

        tokio::pin!(cancel);
        let start = Instant::now();
        self.state = LoopState::Measuring;
        tracing::info!(
            "Measuring for {:?} (receive timeout {:?}, stall threshold {:?})",
            self.settings.measurement_duration,
            self.settings.receive_timeout,
            self.settings.stall_threshold
        );

        let reason = loop {
            if start.elapsed() >= self.settings.measurement_duration {
                break StopReason::DurationElapsed;
            }

            let outcome = tokio::select! {
                biased;
                _ = &mut cancel => None,
                outcome = conn.receive(self.settings.buffer_size, self.settings.receive_timeout) => Some(outcome),
            };
            let Some(outcome) = outcome else {
                break StopReason::UserCancelled;
            };

            match outcome {
                RecvOutcome::Data(bytes) => {
                    let arrived_at = Instant::now();
                    if bytes.is_empty() {
                        break StopReason::PeerClosed;
                    }
                    self.log.record(arrived_at, bytes.len());
                    reporter.on_data(&bytes);
                }
                RecvOutcome::Closed => break StopReason::PeerClosed,
                RecvOutcome::Timeout => {
                    // Gap since the last arrival, or since start if nothing came yet.
                    let since = self.log.last().unwrap_or(start);
                    let gap = Instant::now().duration_since(since);
                    if gap > self.settings.stall_threshold {
                        tracing::warn!("No data received for {:?}, assuming connection lost", gap);
                        break StopReason::Stalled;
                    }
                    tracing::trace!("Receive timed out, {:?} since last data", gap);
                }
                RecvOutcome::IoError(e) => {
                    tracing::error!("Socket error during receiving: {}", e);
                    break StopReason::IoError(e.to_string());
                }
            }
        };

        conn.close().await;
        tracing::info!(
            "Measurement stopped ({}) after {:?} with {} arrivals",
            reason.tag(),
            start.elapsed(),
            self.log.len()
        );
        self.state = LoopState::Stopped(reason.clone());
        reason
    }
}
