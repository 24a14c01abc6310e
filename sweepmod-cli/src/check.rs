//! Discover mods and dry-run a load to report order and failures.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use sweepmod_api::{LoadReport, Mod, ModContext, ModError, ModManager, RuntimeContext};
use sweepmod_runtime::{discover_mods, ModDescriptor, Version};
use tracing::debug;

/// Stand-in for real mod code during a dry run.
struct InertMod;

impl Mod for InertMod {
    fn initialize(&mut self, ctx: &ModContext) -> Result<(), ModError> {
        debug!("Dry-run initialize of {}", ctx.namespace());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureEntry {
    pub namespace: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestError {
    pub path: PathBuf,
    pub error: String,
}

/// What a check found.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub discovered: usize,
    pub load_order: Vec<String>,
    pub failures: Vec<FailureEntry>,
    pub manifest_errors: Vec<ManifestError>,
    pub checked_at: DateTime<Utc>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.manifest_errors.is_empty()
    }

    /// Human readable summary.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Discovered {} mod(s)", self.discovered);

        if !self.load_order.is_empty() {
            let _ = writeln!(out, "\nLoad order:");
            for (i, namespace) in self.load_order.iter().enumerate() {
                let _ = writeln!(out, "  {:>2}. {}", i + 1, namespace);
            }
        }

        if !self.failures.is_empty() {
            let _ = writeln!(out, "\nFailures:");
            for failure in &self.failures {
                let _ = writeln!(out, "  {}: {}", failure.namespace, failure.reason);
            }
        }

        if !self.manifest_errors.is_empty() {
            let _ = writeln!(out, "\nManifest errors:");
            for error in &self.manifest_errors {
                let _ = writeln!(out, "  {}: {}", error.path.display(), error.error);
            }
        }

        out
    }
}

/// Load `descriptors` into a throwaway runtime with inert mods.
pub fn dry_run(descriptors: Vec<ModDescriptor>, api_version: Version) -> Result<LoadReport> {
    let runtime = Arc::new(RuntimeContext::with_api_version(api_version));
    let manager = ModManager::new(
        runtime,
        |_: &ModDescriptor| -> Result<Box<dyn Mod>, ModError> { Ok(Box::new(InertMod)) },
    );

    let report = manager.load_all(descriptors)?;
    manager.unload_all()?;
    Ok(report)
}

/// Discover mods under `search_paths` and dry-run loading them.
pub fn check(search_paths: &[PathBuf], include_user_dir: bool, api_version: Version) -> Result<CheckReport> {
    let discovery = discover_mods(search_paths, include_user_dir);
    let report = dry_run(discovery.descriptors(), api_version)?;

    Ok(CheckReport {
        discovered: discovery.mods.len(),
        load_order: report.loaded,
        failures: report
            .failures
            .into_iter()
            .map(|f| FailureEntry {
                namespace: f.namespace,
                reason: f.reason.to_string(),
            })
            .collect(),
        manifest_errors: discovery
            .errors
            .into_iter()
            .map(|e| ManifestError {
                path: e.path,
                error: e.error.to_string(),
            })
            .collect(),
        checked_at: report.finished_at,
    })
}
