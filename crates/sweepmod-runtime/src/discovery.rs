//! Mod discovery from search directories.
//!
//! Mods are discovered from the following locations (in order):
//!
//! 1. The configured search paths (`mods/` and `workshop/` by default)
//! 2. `$XDG_DATA_HOME/sweepmod/mods/` (user mods)
//!
//! Each mod is a directory containing a `mod.toml` or `mod.json` manifest.
//! When two directories provide the same namespace, the first one wins and
//! the second is reported as a discovery error.

use crate::descriptor::ModDescriptor;
use crate::error::{RuntimeError, RuntimeResult};
use crate::manifest::{ModManifest, MANIFEST_FILES};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default search directories, relative to the host's working directory.
pub const DEFAULT_SEARCH_PATHS: &[&str] = &["mods", "workshop"];

/// A mod found on disk.
#[derive(Debug, Clone)]
pub struct ModPath {
    /// Path to the mod directory.
    pub path: PathBuf,

    /// Path to the manifest that described it.
    pub manifest_path: PathBuf,

    /// Validated descriptor.
    pub descriptor: ModDescriptor,
}

impl ModPath {
    pub fn namespace(&self) -> &str {
        &self.descriptor.namespace
    }
}

/// A manifest that could not be used, or that repeats a namespace.
#[derive(Debug)]
pub struct DiscoveryError {
    pub path: PathBuf,
    pub error: RuntimeError,
}

/// Everything a discovery pass found.
#[derive(Debug, Default)]
pub struct Discovery {
    pub mods: Vec<ModPath>,
    pub errors: Vec<DiscoveryError>,
}

impl Discovery {
    /// Descriptors of all discovered mods, in discovery order.
    pub fn descriptors(&self) -> Vec<ModDescriptor> {
        self.mods.iter().map(|m| m.descriptor.clone()).collect()
    }
}

/// Get the user mods directory.
pub fn user_mods_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "raibid-labs", "sweepmod")
        .map(|dirs| dirs.data_dir().join("mods"))
}

/// Discover mods from the given directories, then the user mods directory.
pub fn discover_mods(search_paths: &[PathBuf], include_user_dir: bool) -> Discovery {
    let mut discovery = Discovery::default();
    let mut seen = HashMap::new();

    for dir in search_paths {
        debug!("Scanning mods directory: {:?}", dir);
        discover_in_directory(dir, &mut discovery, &mut seen);
    }

    if include_user_dir {
        if let Some(user_dir) = user_mods_dir() {
            debug!("Scanning user mods directory: {:?}", user_dir);
            discover_in_directory(&user_dir, &mut discovery, &mut seen);
        }
    }

    info!(
        "Discovered {} mods ({} manifest errors)",
        discovery.mods.len(),
        discovery.errors.len()
    );
    discovery
}

/// Discover mods in a single directory.
///
/// Unreadable directories and bad manifests are logged and skipped so one
/// broken mod never hides the others. `seen` maps each namespace found so far
/// to the directory that provided it.
pub fn discover_in_directory(dir: &Path, discovery: &mut Discovery, seen: &mut HashMap<String, PathBuf>) {
    if !dir.exists() {
        return;
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            warn!("Failed to read mods directory {:?}: {}", dir, e);
            return;
        }
    };

    let mut mod_dirs: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    // read_dir order is platform dependent
    mod_dirs.sort();

    for path in mod_dirs {
        let Some(manifest_path) = find_manifest(&path) else {
            debug!("Skipping {:?}: no manifest", path);
            continue;
        };

        match ModManifest::from_file(&manifest_path).and_then(|m| m.descriptor()) {
            Ok(descriptor) => {
                if let Some(first) = seen.get(&descriptor.namespace) {
                    let error = RuntimeError::DuplicateNamespace {
                        namespace: descriptor.namespace.clone(),
                        first: first.clone(),
                        second: path.clone(),
                    };
                    warn!("Ignoring mod at {:?}: {}", path, error);
                    discovery.errors.push(DiscoveryError {
                        path: manifest_path,
                        error,
                    });
                    continue;
                }
                seen.insert(descriptor.namespace.clone(), path.clone());

                info!(
                    "Discovered mod: {} v{} at {:?}",
                    descriptor.name, descriptor.version, path
                );
                discovery.mods.push(ModPath {
                    path,
                    manifest_path,
                    descriptor,
                });
            }
            Err(error) => {
                warn!("Failed to load manifest from {:?}: {}", manifest_path, error);
                discovery.errors.push(DiscoveryError {
                    path: manifest_path,
                    error,
                });
            }
        }
    }
}

/// Discover a single mod from its directory.
pub fn discover_mod(path: &Path) -> RuntimeResult<ModPath> {
    let manifest_path =
        find_manifest(path).ok_or_else(|| RuntimeError::ModNotFound(path.display().to_string()))?;
    let descriptor = ModManifest::from_file(&manifest_path)?.descriptor()?;

    Ok(ModPath {
        path: path.to_path_buf(),
        manifest_path,
        descriptor,
    })
}

fn find_manifest(dir: &Path) -> Option<PathBuf> {
    MANIFEST_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|candidate| candidate.is_file())
}
