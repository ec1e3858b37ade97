use jobwatch::{init_tracing, MonitorConfig, Runner};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let config = match MonitorConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let runner = match Runner::from_config(config) {
        Ok(runner) => runner,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "failed to initialise monitor");
            return ExitCode::FAILURE;
        }
    };

    match runner.run_until_signal().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "monitor terminated");
            ExitCode::FAILURE
        }
    }
}
