use m4s_remux::{Config, RemuxError};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn exit_code(error: &anyhow::Error) -> ExitCode {
    let code = error
        .downcast_ref::<RemuxError>()
        .map(RemuxError::exit_code)
        .unwrap_or(1);
    ExitCode::from(code as u8)
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load configuration from CLI and/or config file
    let config = match Config::load() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("error: {error:#}\n\nFor more information, try '--help'.");
            return exit_code(&error);
        }
    };
    init_tracing(config.verbose);

    match m4s_remux::run(config).await {
        Ok(report) if report.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(error) => {
            error!("Run aborted: {error:#}");
            exit_code(&error)
        }
    }
}
