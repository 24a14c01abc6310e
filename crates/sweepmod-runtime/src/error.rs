//! Error types for the Sweepmod runtime.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading and validating mod descriptors.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// No manifest could be found for a mod directory.
    #[error("Mod not found: {0}")]
    ModNotFound(String),

    /// Manifest is syntactically valid but violates a descriptor rule.
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    /// Namespace fails the naming rules.
    #[error("Invalid namespace '{namespace}': {reason}")]
    InvalidNamespace { namespace: String, reason: String },

    /// Version string is not a `major.minor.patch` triple.
    #[error("Invalid version '{0}': expected major.minor.patch")]
    InvalidVersion(String),

    /// Mod targets an API the host does not provide.
    #[error("Mod '{namespace}' targets API {requested}, host provides {provided}")]
    IncompatibleApi {
        namespace: String,
        requested: String,
        provided: String,
    },

    /// Two mod directories declare the same namespace.
    #[error("Namespace '{namespace}' declared by both {first:?} and {second:?}")]
    DuplicateNamespace {
        namespace: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// Manifest file has an extension we don't parse.
    #[error("Unsupported manifest format: {0}")]
    UnsupportedFormat(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON manifest error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML manifest error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

/// Errors produced while ordering a set of mods.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// A `required` dependency names a mod that is not in the set.
    #[error("Mod '{dependent}' requires '{dependency}', which is not available")]
    MissingDependency {
        dependent: String,
        dependency: String,
    },

    /// Ordering constraints form a cycle.
    #[error("Dependency cycle: {}", .cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    /// Mod declares a conflict with a mod that is present.
    #[error("Mod '{namespace}' is incompatible with '{conflicts_with}'")]
    Incompatible {
        namespace: String,
        conflicts_with: String,
    },

    /// Two descriptors claim the same namespace.
    #[error("Namespace '{0}' is declared by more than one mod")]
    DuplicateNamespace(String),
}
