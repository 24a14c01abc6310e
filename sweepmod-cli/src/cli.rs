//! Command line arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sweepmod", version)]
#[command(about = "Check and watch Sweepmod mod directories")]
pub struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/sweepmod/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Skip the per-user mods directory
    #[arg(long, global = true)]
    pub no_user_dir: bool,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Discover mods, validate them and print the load order
    Check {
        /// Directories to scan (default: the configured search paths)
        paths: Vec<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rescan periodically and log load-order changes until Ctrl+C
    Watch {
        /// Directories to scan (default: the configured search paths)
        paths: Vec<PathBuf>,

        /// Seconds between scans
        #[arg(short, long, default_value = "2")]
        interval: u64,
    },
}

impl Cli {
    /// Paths given on the command line, if any.
    pub fn paths(&self) -> &[PathBuf] {
        match &self.command {
            Command::Check { paths, .. } | Command::Watch { paths, .. } => paths,
        }
    }
}
