use stream_latency_probe::{run_measurement, RunOutcome};

#[tokio::main]
async fn main() {
    match run_measurement().await {
        Ok(RunOutcome::SetupFailed { .. }) => std::process::exit(2),
        Ok(RunOutcome::Completed { .. }) => {}
        Err(e) => {
            eprintln!("Fatal error: {}", e);
            std::process::exit(1);
        }
    }
}
