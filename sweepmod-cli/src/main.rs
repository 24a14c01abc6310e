//! # sweepmod
//!
//! Command line front end for the Sweepmod mod runtime.
//!
//! - `sweepmod check [paths..]` discovers mods, validates their manifests,
//!   dry-runs a load and prints the resolved order with any failures.
//! - `sweepmod watch [paths..] --interval N` rescans periodically and logs
//!   load-order changes until Ctrl+C.
//!
//! ## Configuration
//!
//! Reads `$XDG_CONFIG_HOME/sweepmod/config.toml`, creating a documented default
//! when it is missing.
//!
//! ## Running
//!
//! ```bash
//! cargo run --bin sweepmod -- check mods/
//!
//! # With debug logging
//! RUST_LOG=debug cargo run --bin sweepmod -- watch
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sweepmod_cli::check::check;
use sweepmod_cli::cli::{Cli, Command};
use sweepmod_cli::config::Config;
use sweepmod_cli::watch::{watch, WatchOptions};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config is loaded before logging so its log_level can apply.
    let (config, config_error) = match &cli.config {
        Some(path) => (Config::load(path)?, None),
        None => match Config::load_default() {
            Ok(cfg) => (cfg, None),
            Err(e) => (Config::default(), Some(e)),
        },
    };

    let default_level = if cli.verbose {
        "debug"
    } else {
        config.runtime.log_level.as_str()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(true)
        .init();

    info!("Starting sweepmod v{}", env!("CARGO_PKG_VERSION"));
    if let Some(e) = config_error {
        warn!("Failed to load config, using defaults: {:#}", e);
    }

    let api_version = config.api_version()?;
    let search_paths: Vec<PathBuf> = if cli.paths().is_empty() {
        config.discovery.search_paths.clone()
    } else {
        cli.paths().to_vec()
    };
    let include_user_dir = config.discovery.include_user_dir && !cli.no_user_dir;

    match cli.command {
        Command::Check { json, .. } => {
            let report = check(&search_paths, include_user_dir, api_version)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.render());
            }
            if !report.is_clean() {
                anyhow::bail!(
                    "{} mod failure(s), {} manifest error(s)",
                    report.failures.len(),
                    report.manifest_errors.len()
                );
            }
        }
        Command::Watch { interval, .. } => {
            info!("Press Ctrl+C to stop");
            watch(WatchOptions {
                search_paths,
                include_user_dir,
                api_version,
                interval: Duration::from_secs(interval.max(1)),
            })
            .await?;
        }
    }

    Ok(())
}
