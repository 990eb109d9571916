//! grator - main entry point

use std::process::ExitCode;

use grator_cli::output::err_line;
use grator_cli::{Context, args, run};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the diagnostics filter
const LOG_ENV: &str = "GRATOR_LOG";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(e) => {
            eprintln!("{}", err_line(&e.to_string()));
            return ExitCode::FAILURE;
        }
    };
    let ctx = Context::new(cwd);

    let result = match args::utf8_args(std::env::args_os().skip(1)) {
        Ok(argv) => run(argv, &ctx).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            if e.shows_usage() {
                println!("{}", args::usage());
            }
            eprintln!("{}", err_line(&e.to_string()));
            ExitCode::FAILURE
        }
    }
}
