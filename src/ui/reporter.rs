//! Console reporting for measurement runs
//!
//! The measurement loop and orchestrator talk to a [`Reporter`]; how anything
//! looks on screen is decided here.

use std::io::{self, Stdout, Write};

use colored::*;
use comfy_table::{presets::UTF8_FULL, Table};

use crate::core::config::{MeasurementConfig, ReportFormat};
use crate::core::measurement::StopReason;
use crate::error::ProbeError;
use crate::stats::delay_statistics::MeasurementResult;
use crate::utils::helpers::decode_for_echo;

/// Receives progress events and the final result of a run
pub trait Reporter {
    fn on_connecting(&mut self, _config: &MeasurementConfig) {}

    fn on_connected(&mut self, _endpoint: &str) {}

    /// Called once per received unit, in arrival order
    fn on_data(&mut self, data: &[u8]);

    fn on_stopped(&mut self, reason: &StopReason);

    fn on_setup_failure(&mut self, error: &ProbeError);

    fn on_result(&mut self, result: &MeasurementResult);
}

/// Human-readable reporter writing to stdout (or any writer)
pub struct ConsoleReporter<W: Write = Stdout> {
    out: W,
    format: ReportFormat,
}

impl ConsoleReporter<Stdout> {
    pub fn new(format: ReportFormat) -> Self {
        Self::with_writer(io::stdout(), format)
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn with_writer(out: W, format: ReportFormat) -> Self {
        Self { out, format }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Status lines. In JSON mode these go to stderr so stdout stays parseable.
    fn status(&mut self, line: impl std::fmt::Display) {
        let written = match self.format {
            ReportFormat::Table => writeln!(self.out, "{}", line),
            ReportFormat::Json => writeln!(io::stderr(), "{}", line),
        };
        if let Err(e) = written {
            tracing::debug!("Failed to write report line: {}", e);
        }
    }
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn on_connecting(&mut self, config: &MeasurementConfig) {
        let separator = "=".repeat(60);
        self.status(format!("\n{}", separator));
        self.status(format!("{:^60}", "STREAM LATENCY PROBE".bold().cyan()));
        self.status(format!("{}\n", separator));
        self.status(format!("Attempting to connect to {}...", config.endpoint()));
        self.status(format!(
            "Will measure inter-packet delays for {:.1} seconds.",
            config.measurement_duration_secs
        ));
    }

    fn on_connected(&mut self, _endpoint: &str) {
        self.status("Connection successful! Receiving data...".green());
        self.status("Measurement started. Press Ctrl+C to stop early.");
    }

    fn on_data(&mut self, data: &[u8]) {
        // Echo would corrupt the JSON document on stdout.
        if self.format == ReportFormat::Json {
            return;
        }
        let echoed = write!(self.out, "{}", decode_for_echo(data)).and_then(|_| self.out.flush());
        if let Err(e) = echoed {
            tracing::debug!("Failed to echo received data: {}", e);
        }
    }

    fn on_stopped(&mut self, reason: &StopReason) {
        let line = match reason {
            StopReason::Stalled => format!("\n{} {}", "[WARN]".yellow(), reason),
            StopReason::IoError(_) => format!("\n{} {}", "[ERROR]".red(), reason),
            _ => format!("\n{} {}", "[INFO]".cyan(), reason),
        };
        self.status(line);
    }

    fn on_setup_failure(&mut self, error: &ProbeError) {
        self.status(format!(
            "{} Could not establish connection: {}",
            "[ERROR]".bold().red(),
            error
        ));
    }

    fn on_result(&mut self, result: &MeasurementResult) {
        if self.format == ReportFormat::Json {
            let rendered = serde_json::to_string_pretty(result)
                .map_err(io::Error::from)
                .and_then(|json| writeln!(self.out, "{}", json));
            if let Err(e) = rendered {
                tracing::error!("Failed to write JSON report: {}", e);
            }
            return;
        }

        self.status(format!("\n{}", "--- Measurement Statistics ---".bold().yellow()));
        if !result.has_delay_statistics() {
            self.status("Not enough data received to calculate delays (need at least 2 packets).");
            self.status(format!("Received {} packets in total.", result.packet_count));
            return;
        }

        self.status(format!("Received {} packets ({} bytes).", result.packet_count, result.bytes_received));
        self.status(format!(
            "Calculated {} inter-packet delays over ~{:.3} seconds.",
            result.delay_count, result.observed_duration_secs
        ));
        self.status(format!("\n{}", "Inter-Packet Delay (milliseconds):".bold()));
        self.status(render_result_table(result));

        if let Some(rate) = result.average_rate {
            self.status(format!("\nApproximate Average Rate: {:.2} packets/second", rate));
        }
    }
}

/// Delay statistics as a two-column table. Empty body when there are no delays.
pub fn render_result_table(result: &MeasurementResult) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Metric", "Value (ms)"]);
    if let Some(delays) = &result.delays {
        for (name, value) in [
            ("Average", delays.mean),
            ("Median", delays.median),
            ("Min", delays.min),
            ("Max", delays.max),
            ("Std Dev", delays.stdev),
            ("P95", delays.p95),
            ("P99", delays.p99),
        ] {
            table.add_row(vec![name.to_string(), format!("{:.4}", value)]);
        }
    }
    table
}
