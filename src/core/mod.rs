pub mod config;
pub mod measurement;
pub mod source;

use std::env;
use std::future::Future;

use crate::core::config::MeasurementConfig;
use crate::core::measurement::{MeasurementLoop, StopReason};
use crate::core::source::{ByteStreamSource, TcpSource};
use crate::error::{ProbeError, Result};
use crate::stats::arrival_log::ArrivalLog;
use crate::stats::delay_statistics::MeasurementResult;
use crate::ui::reporter::{ConsoleReporter, Reporter};

/// Settings file looked up in the working directory when no path is given
pub const SETTINGS_FILE: &str = "appsettings.json";

// ============================================================================
// RUN OUTCOME
// ============================================================================

/// How a run ended, together with whatever was collected
#[derive(Debug)]
pub enum RunOutcome {
    /// The connection was opened and the loop ran to a stop condition
    Completed { reason: StopReason, log: ArrivalLog },
    /// The connection never opened; the log is always empty
    SetupFailed { error: ProbeError, log: ArrivalLog },
}

impl RunOutcome {
    pub fn log(&self) -> &ArrivalLog {
        match self {
            RunOutcome::Completed { log, .. } | RunOutcome::SetupFailed { log, .. } => log,
        }
    }

    pub fn stop_reason(&self) -> Option<&StopReason> {
        match self {
            RunOutcome::Completed { reason, .. } => Some(reason),
            RunOutcome::SetupFailed { .. } => None,
        }
    }

    pub fn is_setup_failure(&self) -> bool {
        matches!(self, RunOutcome::SetupFailed { .. })
    }

    /// Statistics over the collected arrivals, computed for every outcome
    pub fn result(&self) -> MeasurementResult {
        MeasurementResult::from_log(self.log())
    }
}

// ============================================================================
// MEASUREMENT
// ============================================================================

/// Open a connection through `source` and measure until a stop condition.
///
/// Connection failures are not errors here: they produce
/// [`RunOutcome::SetupFailed`] with an empty log. So does a `config` that
/// fails [`MeasurementConfig::validate`]; nothing is opened in that case.
pub async fn measure<S, R, F>(
    source: &S,
    config: &MeasurementConfig,
    reporter: &mut R,
    cancel: F,
) -> RunOutcome
where
    S: ByteStreamSource,
    R: Reporter + ?Sized,
    F: Future<Output = ()>,
{
    let endpoint = config.endpoint();
    let settings = config
        .validate()
        .and_then(|_| Ok((config.loop_settings()?, config.connect_timeout()?)));
    let (loop_settings, connect_timeout) = match settings {
        Ok(settings) => settings,
        Err(error) => {
            tracing::error!("Refusing to measure with invalid settings: {}", error);
            reporter.on_setup_failure(&error);
            return RunOutcome::SetupFailed {
                error,
                log: ArrivalLog::new(),
            };
        }
    };
    let mut measurement = MeasurementLoop::new(loop_settings);

    reporter.on_connecting(config);
    tracing::info!("Connecting to {} (timeout {:?})", endpoint, connect_timeout);

    let conn = match source.open(&endpoint, connect_timeout).await {
        Ok(conn) => conn,
        Err(error) => {
            tracing::error!("Connection setup failed: {}", error);
            reporter.on_setup_failure(&error);
            return RunOutcome::SetupFailed {
                error,
                log: measurement.into_log(),
            };
        }
    };

    tracing::info!("Connected to {}", endpoint);
    reporter.on_connected(&endpoint);

    let reason = measurement.run(conn, reporter, cancel).await;
    reporter.on_stopped(&reason);

    RunOutcome::Completed {
        reason,
        log: measurement.into_log(),
    }
}

// ============================================================================
// ENTRY POINT
// ============================================================================

/// Load settings, measure the configured endpoint over TCP and print the report.
///
/// The first command-line argument, if present, replaces the settings path.
pub async fn run_measurement() -> Result<RunOutcome> {
    let settings_path = env::args().nth(1).unwrap_or_else(|| SETTINGS_FILE.to_string());
    let config = MeasurementConfig::load(&settings_path)?;
    init_logging(&config.log_level);
    tracing::info!(
        "Loaded settings from {}: endpoint {}, duration {:.1}s, buffer {} byte(s)",
        settings_path,
        config.endpoint(),
        config.measurement_duration_secs,
        config.buffer_size
    );

    let mut reporter = ConsoleReporter::new(config.report_format);
    let outcome = measure(&TcpSource, &config, &mut reporter, interrupt()).await;
    reporter.on_result(&outcome.result());

    Ok(outcome)
}

/// Resolves on Ctrl+C. If the handler cannot be installed it never resolves.
async fn interrupt() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Interrupt received, stopping measurement"),
        Err(e) => {
            tracing::warn!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// Install a stderr fmt subscriber at `level`; unknown levels fall back to info.
pub fn init_logging(level: &str) {
    let max_level = level
        .trim()
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    // A subscriber may already be set (tests, embedding applications).
    let _ = tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_writer(std::io::stderr)
        .try_init();
}
