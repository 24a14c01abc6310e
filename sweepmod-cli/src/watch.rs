//! Periodic rescans that log load-order changes.

use crate::check::{check, CheckReport};
use anyhow::{Context, Result};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use sweepmod_runtime::Version;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// What a watch is looking at.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub search_paths: Vec<PathBuf>,
    pub include_user_dir: bool,
    pub api_version: Version,
    pub interval: Duration,
}

/// The parts of a check that matter for change detection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Snapshot {
    pub load_order: Vec<String>,
    pub failed: Vec<String>,
    pub manifest_errors: usize,
}

impl From<&CheckReport> for Snapshot {
    fn from(report: &CheckReport) -> Self {
        Self {
            load_order: report.load_order.clone(),
            failed: report.failures.iter().map(|f| f.namespace.clone()).collect(),
            manifest_errors: report.manifest_errors.len(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WatchSummary {
    pub scans: usize,
    pub changes: usize,
    pub last: Option<Snapshot>,
}

/// Rescan until Ctrl+C.
pub async fn watch(options: WatchOptions) -> Result<WatchSummary> {
    watch_until(options, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await
}

/// Rescan every `options.interval` until `shutdown` completes.
pub async fn watch_until(options: WatchOptions, shutdown: impl Future<Output = ()>) -> Result<WatchSummary> {
    let mut ticker = interval(options.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut summary = WatchSummary::default();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let paths = options.search_paths.clone();
                let include_user_dir = options.include_user_dir;
                let api_version = options.api_version;
                let report = tokio::task::spawn_blocking(move || check(&paths, include_user_dir, api_version))
                    .await
                    .context("Scan task failed")??;

                let current = Snapshot::from(&report);
                summary.scans += 1;

                match &summary.last {
                    None => info!(
                        "Watching {} mod(s); load order: {}",
                        current.load_order.len(),
                        current.load_order.join(", ")
                    ),
                    Some(previous) if *previous == current => debug!("No changes"),
                    Some(previous) => {
                        summary.changes += 1;
                        log_changes(previous, &current);
                    }
                }
                summary.last = Some(current);
            }
            _ = &mut shutdown => {
                info!("Stopping watch after {} scan(s)", summary.scans);
                break;
            }
        }
    }

    Ok(summary)
}

fn log_changes(previous: &Snapshot, current: &Snapshot) {
    for namespace in current.load_order.iter().filter(|ns| !previous.load_order.contains(ns)) {
        info!("Mod added: {}", namespace);
    }
    for namespace in previous.load_order.iter().filter(|ns| !current.load_order.contains(ns)) {
        info!("Mod removed: {}", namespace);
    }
    for namespace in current.failed.iter().filter(|ns| !previous.failed.contains(ns)) {
        warn!("Mod now failing: {}", namespace);
    }
    if previous.load_order != current.load_order {
        info!("Load order: {}", current.load_order.join(", "));
    }
    if previous.manifest_errors != current.manifest_errors {
        warn!("{} manifest error(s)", current.manifest_errors);
    }
}
