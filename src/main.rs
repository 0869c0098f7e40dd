use aida::Error;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "AIDA_LOG";

// `.env` is loaded before the runtime spawns worker threads. Variables
// already present in the process environment win.
fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let matches = aida::cli::build_cli().get_matches();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(aida::cli::run(&matches)) {
        Ok(()) => ExitCode::SUCCESS,
        // The command already reported its own failure.
        Err(Error::CommandExited { code }) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::from(u8::try_from(err.exit_code()).unwrap_or(1))
        }
    }
}
