//! schedsync daemon entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use schedsync_core::{TracingConfig, TracingOutputFormat, init_tracing};
use schedsync_server::{App, CONFIG_ENV, ServiceConfig};
use tracing::error;

/// schedsyncd - calendar sync and booking service
#[derive(Debug, Parser)]
#[command(name = "schedsyncd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(long, short, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    debug: bool,

    /// Log format (pretty, compact, json)
    #[arg(long)]
    log_format: Option<TracingOutputFormat>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ServiceConfig::load_from(path),
        None => ServiceConfig::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut tracing_config = if args.debug {
        TracingConfig::cli_debug()
    } else {
        match config.logging.tracing_config() {
            Ok(tracing_config) => tracing_config,
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::FAILURE;
            }
        }
    };
    if let Some(format) = args.log_format {
        tracing_config = tracing_config.with_format(format);
    }
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }

    let app = match App::from_config(&config) {
        Ok(app) => app,
        Err(e) => {
            error!(error = %e, "failed to start");
            return ExitCode::FAILURE;
        }
    };

    match app.run_until_shutdown().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "daemon stopped");
            ExitCode::FAILURE
        }
    }
}
