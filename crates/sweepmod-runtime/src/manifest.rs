//! Mod manifest parsing.
//!
//! Each mod directory carries a `mod.toml` (or `mod.json`) file that
//! describes its identity, declared permissions and dependencies. Parsing
//! yields a validated [`ModDescriptor`].

use crate::descriptor::{Dependency, ModDescriptor, Version};
use crate::error::{RuntimeError, RuntimeResult};
use crate::permission::{Permission, PermissionSet};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Manifest file names, in lookup order.
pub const MANIFEST_FILES: &[&str] = &["mod.toml", "mod.json"];

/// Mod manifest structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModManifest {
    /// Mod metadata.
    #[serde(rename = "mod")]
    pub info: ModMetadata,

    /// Declared permission levels.
    #[serde(default)]
    pub permissions: Vec<String>,

    /// Dependency declarations, in order.
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

/// Mod metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModMetadata {
    /// Human-readable name.
    pub name: String,

    /// Version string (major.minor.patch).
    pub version: String,

    /// Mod API version the mod targets.
    pub api_version: String,

    /// Unique namespace.
    pub namespace: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub author: Option<String>,

    /// Lower loads earlier when dependencies leave the order open.
    #[serde(default)]
    pub load_priority: i32,
}

impl ModManifest {
    /// Load a manifest, picking the format from the file extension.
    pub fn from_file(path: &Path) -> RuntimeResult<Self> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("json") => Self::from_json_str(&content),
            _ => Err(RuntimeError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// Parse a manifest from a TOML string.
    pub fn from_toml_str(content: &str) -> RuntimeResult<Self> {
        let manifest: ModManifest = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Parse a manifest from a JSON string.
    pub fn from_json_str(content: &str) -> RuntimeResult<Self> {
        let manifest: ModManifest = serde_json::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate the manifest by building its descriptor.
    fn validate(&self) -> RuntimeResult<()> {
        if self.info.version.is_empty() {
            return Err(RuntimeError::InvalidManifest(
                "Mod version cannot be empty".to_string(),
            ));
        }

        if self.info.api_version.is_empty() {
            return Err(RuntimeError::InvalidManifest(
                "Mod api_version cannot be empty".to_string(),
            ));
        }

        self.descriptor().map(|_| ())
    }

    /// Get the permission set declared by this manifest.
    pub fn permission_set(&self) -> RuntimeResult<PermissionSet> {
        if self.permissions.is_empty() {
            return Ok(PermissionSet::default());
        }

        self.permissions
            .iter()
            .map(|raw| {
                Permission::parse(raw).ok_or_else(|| {
                    RuntimeError::InvalidManifest(format!("Unknown permission '{}'", raw))
                })
            })
            .collect()
    }

    /// Build the validated descriptor for this manifest.
    pub fn descriptor(&self) -> RuntimeResult<ModDescriptor> {
        let descriptor = ModDescriptor {
            name: self.info.name.clone(),
            version: self.info.version.parse::<Version>()?,
            api_version: self.info.api_version.parse::<Version>()?,
            namespace: self.info.namespace.clone(),
            description: self.info.description.clone(),
            author: self.info.author.clone(),
            permissions: self.permission_set()?,
            dependencies: self.dependencies.clone(),
            load_priority: self.info.load_priority,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }
}
