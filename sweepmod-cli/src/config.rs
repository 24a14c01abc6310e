//! Configuration file loading and management
//!
//! This module handles loading and parsing the CLI configuration from
//! `$XDG_CONFIG_HOME/sweepmod/config.toml`. If the configuration file doesn't
//! exist, a default configuration is created with documented comments.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use sweepmod_runtime::{Version, API_VERSION};

/// Main CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    /// Runtime settings
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Where to look for mods
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Log level (trace, debug, info, warn, error)
    /// Default: "info"
    pub log_level: String,
    /// Mod API version the host claims to provide
    /// Default: the API version this build was compiled with
    pub api_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Directories scanned in order; earlier directories win on duplicates
    /// Default: ["mods", "workshop"]
    pub search_paths: Vec<PathBuf>,
    /// Also scan the per-user mods directory
    /// Default: true
    pub include_user_dir: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            api_version: API_VERSION.to_string(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            search_paths: sweepmod_runtime::discovery::DEFAULT_SEARCH_PATHS
                .iter()
                .map(PathBuf::from)
                .collect(),
            include_user_dir: true,
        }
    }
}

impl Config {
    /// Load configuration from the specified path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default XDG config location
    ///
    /// If the configuration file doesn't exist, creates a default configuration
    /// file with documented comments.
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_file(&config_path)?;
        }

        Self::load(&config_path)
    }

    /// Returns `$XDG_CONFIG_HOME/sweepmod/config.toml`
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "raibid-labs", "sweepmod")
            .context("Failed to determine project directories")?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    fn create_default_file(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, Self::default_config_content())
            .with_context(|| format!("Failed to write default config file: {}", path.display()))?;

        tracing::info!("Created default configuration file at: {}", path.display());
        Ok(())
    }

    /// Generate the default configuration file content with comments
    pub fn default_config_content() -> String {
        format!(
            r#"# Sweepmod Configuration

[runtime]
# Log level: trace, debug, info, warn, error
# RUST_LOG takes precedence when set.
log_level = "info"

# Mod API version this host provides. Mods need the same major version
# and a minor version no newer than this one.
api_version = "{api}"

[discovery]
# Directories scanned for mods, in order. When two directories contain a
# mod with the same namespace, the earlier directory wins.
search_paths = ["mods", "workshop"]

# Also scan the per-user mods directory
include_user_dir = true
"#,
            api = API_VERSION
        )
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.runtime.log_level.as_str()) {
            anyhow::bail!(
                "Invalid log_level: {}. Must be one of: {}",
                self.runtime.log_level,
                valid_log_levels.join(", ")
            );
        }

        self.api_version()?;

        if self.discovery.search_paths.is_empty() && !self.discovery.include_user_dir {
            anyhow::bail!("discovery has no search_paths and include_user_dir is false");
        }

        Ok(())
    }

    /// Parsed `runtime.api_version`
    pub fn api_version(&self) -> Result<Version> {
        self.runtime
            .api_version
            .parse()
            .with_context(|| format!("Invalid api_version: {}", self.runtime.api_version))
    }
}
