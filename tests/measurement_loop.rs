//! Measurement loop tests against a scripted byte-stream source.
//!
//! Every test runs on tokio's paused clock, so timeouts and deadlines advance
//! deterministically and the elapsed times asserted below are exact.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use stream_latency_probe::core::config::{LoopSettings, MeasurementConfig};
use stream_latency_probe::core::measurement::{LoopState, MeasurementLoop, StopReason};
use stream_latency_probe::core::source::{ByteStreamSource, Connection, RecvOutcome};
use stream_latency_probe::stats::delay_statistics::MeasurementResult;
use stream_latency_probe::ui::reporter::Reporter;
use stream_latency_probe::{measure, ProbeError, RunOutcome};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

enum Step {
    /// Deliver `bytes` after `after` (must be shorter than the receive timeout)
    Data(&'static [u8], Duration),
    /// Nothing arrives; the receive runs into its timeout
    Silence,
    Closed,
    Fail,
}

#[derive(Clone, Default)]
struct Counters {
    receives: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl Counters {
    fn receives(&self) -> usize {
        self.receives.load(Ordering::SeqCst)
    }

    fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

struct ScriptedConnection {
    steps: VecDeque<Step>,
    /// Once the script runs out: emit a unit every interval, or stay silent
    then_every: Option<Duration>,
    counters: Counters,
}

impl ScriptedConnection {
    fn new(steps: Vec<Step>) -> (Self, Counters) {
        let counters = Counters::default();
        let conn = Self {
            steps: steps.into(),
            then_every: None,
            counters: counters.clone(),
        };
        (conn, counters)
    }

    fn periodic(interval: Duration) -> (Self, Counters) {
        let (mut conn, counters) = Self::new(Vec::new());
        conn.then_every = Some(interval);
        (conn, counters)
    }
}

impl Connection for ScriptedConnection {
    async fn receive(&mut self, _max_bytes: usize, timeout: Duration) -> RecvOutcome {
        self.counters.receives.fetch_add(1, Ordering::SeqCst);
        match self.steps.pop_front() {
            Some(Step::Data(bytes, after)) => {
                sleep(after).await;
                RecvOutcome::Data(bytes.to_vec())
            }
            Some(Step::Silence) => {
                sleep(timeout).await;
                RecvOutcome::Timeout
            }
            Some(Step::Closed) => RecvOutcome::Closed,
            Some(Step::Fail) => RecvOutcome::IoError(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )),
            None => match self.then_every {
                Some(interval) => {
                    sleep(interval).await;
                    RecvOutcome::Data(b"1".to_vec())
                }
                None => {
                    sleep(timeout).await;
                    RecvOutcome::Timeout
                }
            },
        }
    }

    async fn close(&mut self) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct RecordingReporter {
    data: Vec<Vec<u8>>,
    stopped: Vec<StopReason>,
    setup_failures: usize,
    results: Vec<MeasurementResult>,
}

impl Reporter for RecordingReporter {
    fn on_data(&mut self, data: &[u8]) {
        self.data.push(data.to_vec());
    }

    fn on_stopped(&mut self, reason: &StopReason) {
        self.stopped.push(reason.clone());
    }

    fn on_setup_failure(&mut self, _error: &ProbeError) {
        self.setup_failures += 1;
    }

    fn on_result(&mut self, result: &MeasurementResult) {
        self.results.push(result.clone());
    }
}

fn settings(duration_secs: u64) -> LoopSettings {
    LoopSettings {
        buffer_size: 1,
        measurement_duration: Duration::from_secs(duration_secs),
        receive_timeout: Duration::from_secs(1),
        stall_threshold: Duration::from_secs(5),
    }
}

fn never() -> std::future::Pending<()> {
    std::future::pending()
}

const MS_10: Duration = Duration::from_millis(10);

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn peer_close_after_three_units() {
    let (conn, counters) = ScriptedConnection::new(vec![
        Step::Data(b"a", MS_10),
        Step::Data(b"b", MS_10),
        Step::Data(b"c", MS_10),
        Step::Closed,
    ]);
    let mut reporter = RecordingReporter::default();
    let mut measurement = MeasurementLoop::new(settings(10));

    let reason = measurement.run(conn, &mut reporter, never()).await;

    assert_eq!(reason, StopReason::PeerClosed);
    assert_eq!(measurement.state(), &LoopState::Stopped(StopReason::PeerClosed));
    assert_eq!(measurement.arrival_log().len(), 3);
    assert_eq!(counters.closes(), 1);
    assert_eq!(reporter.data, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);

    let result = MeasurementResult::from_log(measurement.arrival_log());
    assert_eq!(result.delay_count, 2);
    let delays = result.delays.unwrap();
    assert!((delays.mean - 10.0).abs() < 1e-9);
    assert!((delays.stdev - 0.0).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn stalls_at_first_timeout_past_threshold_without_arrivals() {
    let (conn, counters) = ScriptedConnection::new(Vec::new());
    let mut measurement = MeasurementLoop::new(settings(10));
    let start = Instant::now();

    let reason = measurement.run(conn, &mut RecordingReporter::default(), never()).await;

    assert_eq!(reason, StopReason::Stalled);
    // Timeouts at 1..=5s leave the gap at most 5s; the one at 6s exceeds it.
    assert_eq!(start.elapsed(), Duration::from_secs(6));
    assert_eq!(counters.receives(), 6);
    assert_eq!(counters.closes(), 1);
    assert!(measurement.arrival_log().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stall_gap_counts_from_last_arrival() {
    let (conn, _counters) =
        ScriptedConnection::new(vec![Step::Data(b"x", Duration::from_millis(500))]);
    let mut measurement = MeasurementLoop::new(settings(30));
    let start = Instant::now();

    let reason = measurement.run(conn, &mut RecordingReporter::default(), never()).await;

    assert_eq!(reason, StopReason::Stalled);
    assert_eq!(start.elapsed(), Duration::from_millis(6500));
    assert_eq!(measurement.arrival_log().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn sparse_arrivals_keep_the_run_alive() {
    let mut steps = Vec::new();
    for _ in 0..2 {
        steps.extend([Step::Silence, Step::Silence, Step::Silence, Step::Silence]);
        steps.push(Step::Data(b"s", Duration::from_millis(500)));
    }
    let (conn, _counters) = ScriptedConnection::new(steps);
    let mut measurement = MeasurementLoop::new(settings(10));

    let reason = measurement.run(conn, &mut RecordingReporter::default(), never()).await;

    assert_eq!(reason, StopReason::DurationElapsed);
    assert_eq!(measurement.arrival_log().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn continuous_data_is_cut_at_the_deadline() {
    let (conn, counters) = ScriptedConnection::periodic(Duration::from_millis(100));
    let mut measurement = MeasurementLoop::new(settings(1));
    let start = Instant::now();

    let reason = measurement.run(conn, &mut RecordingReporter::default(), never()).await;

    assert_eq!(reason, StopReason::DurationElapsed);
    assert_eq!(start.elapsed(), Duration::from_secs(1));
    assert_eq!(measurement.arrival_log().len(), 10);
    assert_eq!(counters.receives(), 10);
    assert_eq!(counters.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn deadline_overrun_is_bounded_by_one_receive_timeout() {
    let (conn, _counters) = ScriptedConnection::new(Vec::new());
    let mut loop_settings = settings(0);
    loop_settings.measurement_duration = Duration::from_millis(2500);
    let mut measurement = MeasurementLoop::new(loop_settings);
    let start = Instant::now();

    let reason = measurement.run(conn, &mut RecordingReporter::default(), never()).await;

    assert_eq!(reason, StopReason::DurationElapsed);
    let overrun = start.elapsed() - loop_settings.measurement_duration;
    assert!(overrun <= loop_settings.receive_timeout);
    assert_eq!(start.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn io_error_ends_the_run_without_retry() {
    let (conn, counters) = ScriptedConnection::new(vec![
        Step::Data(b"1", MS_10),
        Step::Data(b"0", MS_10),
        Step::Fail,
        Step::Data(b"1", MS_10),
    ]);
    let mut measurement = MeasurementLoop::new(settings(10));

    let reason = measurement.run(conn, &mut RecordingReporter::default(), never()).await;

    assert_eq!(reason.tag(), "io_error");
    assert!(reason.to_string().contains("connection reset by peer"));
    assert_eq!(counters.receives(), 3);
    assert_eq!(counters.closes(), 1);
    assert_eq!(measurement.arrival_log().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_a_blocked_receive() {
    let (conn, counters) = ScriptedConnection::periodic(Duration::from_secs(1));
    let mut measurement = MeasurementLoop::new(settings(10));
    let start = Instant::now();

    let reason = measurement
        .run(conn, &mut RecordingReporter::default(), sleep(Duration::from_millis(2500)))
        .await;

    assert_eq!(reason, StopReason::UserCancelled);
    assert_eq!(start.elapsed(), Duration::from_millis(2500));
    assert_eq!(measurement.arrival_log().len(), 2);
    assert_eq!(counters.receives(), 3);
    assert_eq!(counters.closes(), 1);

    let result = MeasurementResult::from_log(measurement.arrival_log());
    assert_eq!(result.delay_count, 1);
}

#[tokio::test(start_paused = true)]
async fn pending_cancellation_prevents_any_receive() {
    let (conn, counters) = ScriptedConnection::periodic(MS_10);
    let mut measurement = MeasurementLoop::new(settings(10));

    let reason = measurement
        .run(conn, &mut RecordingReporter::default(), std::future::ready(()))
        .await;

    assert_eq!(reason, StopReason::UserCancelled);
    assert_eq!(counters.receives(), 0);
    assert_eq!(counters.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn empty_data_is_treated_as_peer_close() {
    let (conn, _counters) =
        ScriptedConnection::new(vec![Step::Data(b"z", MS_10), Step::Data(b"", MS_10)]);
    let mut measurement = MeasurementLoop::new(settings(10));

    let reason = measurement.run(conn, &mut RecordingReporter::default(), never()).await;

    assert_eq!(reason, StopReason::PeerClosed);
    assert_eq!(measurement.arrival_log().len(), 1);
}

#[test]
fn new_loop_starts_connecting() {
    let measurement = MeasurementLoop::new(LoopSettings::default());
    assert_eq!(measurement.state(), &LoopState::Connecting);
    assert_eq!(LoopState::default(), LoopState::Connecting);
    assert!(measurement.arrival_log().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stopped_loop_does_not_measure_again() {
    let (first, _) = ScriptedConnection::new(vec![Step::Closed]);
    let mut measurement = MeasurementLoop::new(settings(10));
    measurement.run(first, &mut RecordingReporter::default(), never()).await;

    let (second, counters) = ScriptedConnection::periodic(MS_10);
    let reason = measurement.run(second, &mut RecordingReporter::default(), never()).await;

    assert_eq!(reason, StopReason::PeerClosed);
    assert_eq!(counters.receives(), 0);
    assert_eq!(counters.closes(), 1);
}

// ---------------------------------------------------------------------------
// Setup through `measure`
// ---------------------------------------------------------------------------

/// Opens a scripted connection, or never answers and hits the connect timeout.
struct ScriptedSource {
    reachable: bool,
    counters: Counters,
}

impl ByteStreamSource for ScriptedSource {
    type Conn = ScriptedConnection;

    async fn open(&self, address: &str, connect_timeout: Duration) -> Result<ScriptedConnection, ProbeError> {
        if !self.reachable {
            let _ = tokio::time::timeout(connect_timeout, std::future::pending::<()>()).await;
            return Err(ProbeError::ConnectTimeout {
                address: address.to_string(),
                timeout: connect_timeout,
            });
        }
        Ok(ScriptedConnection {
            steps: vec![
                Step::Data(b"1", MS_10),
                Step::Data(b"1", MS_10),
                Step::Closed,
            ]
            .into(),
            then_every: None,
            counters: self.counters.clone(),
        })
    }
}

#[tokio::test(start_paused = true)]
async fn connect_timeout_is_a_setup_failure_with_no_data() {
    let source = ScriptedSource {
        reachable: false,
        counters: Counters::default(),
    };
    let config = MeasurementConfig::default();
    let mut reporter = RecordingReporter::default();
    let start = Instant::now();

    let outcome = measure(&source, &config, &mut reporter, never()).await;

    assert!(outcome.is_setup_failure());
    assert!(outcome.stop_reason().is_none());
    assert!(matches!(
        outcome,
        RunOutcome::SetupFailed { error: ProbeError::ConnectTimeout { .. }, .. }
    ));
    assert_eq!(start.elapsed(), config.connect_timeout().unwrap());
    assert!(outcome.log().is_empty());
    assert_eq!(reporter.setup_failures, 1);
    assert!(reporter.stopped.is_empty());

    let result = outcome.result();
    assert_eq!(result.packet_count, 0);
    assert!(!result.has_delay_statistics());
    assert_eq!(source.counters.receives(), 0);
}

#[tokio::test(start_paused = true)]
async fn invalid_settings_fail_setup_without_opening() {
    for config in [
        MeasurementConfig {
            measurement_duration_secs: -1.0,
            ..MeasurementConfig::default()
        },
        MeasurementConfig {
            connect_timeout_secs: f64::NAN,
            ..MeasurementConfig::default()
        },
        MeasurementConfig {
            stall_threshold_secs: f64::INFINITY,
            ..MeasurementConfig::default()
        },
    ] {
        let source = ScriptedSource {
            reachable: true,
            counters: Counters::default(),
        };
        let mut reporter = RecordingReporter::default();
        let start = Instant::now();

        let outcome = measure(&source, &config, &mut reporter, never()).await;

        assert!(matches!(
            outcome,
            RunOutcome::SetupFailed { error: ProbeError::InvalidParameter(_), .. }
        ));
        assert!(outcome.log().is_empty());
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(reporter.setup_failures, 1);
        assert!(reporter.stopped.is_empty());
        assert_eq!(source.counters.receives(), 0);
        assert_eq!(source.counters.closes(), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn measure_reports_the_stop_reason() {
    let source = ScriptedSource {
        reachable: true,
        counters: Counters::default(),
    };
    let mut reporter = RecordingReporter::default();

    let outcome = measure(&source, &MeasurementConfig::default(), &mut reporter, never()).await;

    assert_eq!(outcome.stop_reason(), Some(&StopReason::PeerClosed));
    assert_eq!(reporter.stopped, vec![StopReason::PeerClosed]);
    assert_eq!(outcome.result().packet_count, 2);
    assert_eq!(source.counters.closes(), 1);
}
