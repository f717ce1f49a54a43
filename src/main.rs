// Allow unwrap/panic in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! Reloader binary
//!
//! Supervises fluent-bit (or any binary taking `-c <config>`) inside a
//! container and restarts it when the mounted config directory changes.
//!
//! # Usage
//!
//! ```bash
//! # Fixed fluent-bit paths
//! reloader
//!
//! # Paths and restart policy from a TOML file
//! reloader --config /etc/reloader.toml
//! RELOADER_CONFIG=/etc/reloader.toml reloader
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use reloader::core::{Reloader, ReloaderConfig};
use tracing_subscriber::EnvFilter;

const CONFIG_ENV: &str = "RELOADER_CONFIG";

fn print_usage() {
    println!("Reloader");
    println!();
    println!("Usage: reloader [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --config FILE  Load settings from a TOML file (env: {CONFIG_ENV})");
    println!("  --help         Show this help");
}

/// Result of command line parsing.
enum Cli {
    Run(Option<PathBuf>),
    Help,
}

fn parse_args(args: &[String]) -> Result<Cli, String> {
    let mut config = None;
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(Cli::Help),
            "--config" | "-c" => {
                let path = iter.next().ok_or("--config requires a file argument")?;
                config = Some(PathBuf::from(path));
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(Cli::Run(config.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))))
}

fn load_config(path: Option<PathBuf>) -> reloader::core::Result<ReloaderConfig> {
    match path {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading config");
            ReloaderConfig::load(path)
        }
        None => Ok(ReloaderConfig::default()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stdout)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let path = match parse_args(&args) {
        Ok(Cli::Help) => {
            print_usage();
            return ExitCode::SUCCESS;
        }
        Ok(Cli::Run(path)) => path,
        Err(e) => {
            eprintln!("{e}");
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    let config = match load_config(path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "config error");
            return ExitCode::FAILURE;
        }
    };

    let reloader = match Reloader::new(&config) {
        Ok(reloader) => reloader,
        Err(e) => {
            tracing::error!(error = %e, "startup error");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        binary = %config.binary_path.display(),
        config = %config.config_path.display(),
        watch_dir = %config.watch_dir.display(),
        "reloader starting"
    );

    match reloader.run().await {
        Ok(()) => {
            tracing::info!("reloader stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "reloader stopped");
            ExitCode::FAILURE
        }
    }
}
