//! Error types for stores, the event bus and mod lifecycle calls.

use crate::settings::SettingType;
use thiserror::Error;

/// Errors returned by the shared stores and the lifecycle manager.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// Registry has not been created.
    #[error("Registry not found: {0}")]
    UnknownRegistry(String),

    /// No entry under the given key.
    #[error("Entry not found: {registry}/{namespace}:{entry_id}")]
    NotFound {
        registry: String,
        namespace: String,
        entry_id: String,
    },

    /// A namespace tried to write into another namespace's entries.
    #[error("Namespace violation: '{caller}' cannot write entries owned by '{owner}'")]
    NamespaceViolation { caller: String, owner: String },

    /// Asset entry exists but its payload carries no `path`.
    #[error("Asset {registry}/{namespace}:{entry_id} has no path")]
    MissingAssetPath {
        registry: String,
        namespace: String,
        entry_id: String,
    },

    /// Namespace has no schema, or the schema has no such key.
    #[error("Unknown setting: {namespace}.{key}")]
    UnknownSetting { namespace: String, key: String },

    /// Value doesn't match the declared setting type.
    #[error("Type mismatch for {namespace}.{key}: expected {expected}, got {found}")]
    TypeMismatch {
        namespace: String,
        key: String,
        expected: SettingType,
        found: String,
    },

    /// Setting is declared `core` and can't be changed at runtime.
    #[error("Setting {namespace}.{key} is read-only")]
    ReadOnlySetting { namespace: String, key: String },

    /// Handler priority outside `0..=1000`.
    #[error("Handler priority {0} is outside 0..=1000")]
    InvalidPriority(u16),

    /// A load, unload or reload is already running.
    #[error("Mod lifecycle operation already in progress")]
    LifecycleBusy,

    /// `load_all` was called with mods still loaded.
    #[error("Mods are already loaded; unload or reload instead")]
    AlreadyLoaded,

    /// No active mod has this namespace.
    #[error("Mod '{0}' is not loaded")]
    NotLoaded(String),

    /// Lifecycle state machine refused a transition.
    #[error("Mod '{namespace}' cannot move from {from} to {to}")]
    InvalidTransition {
        namespace: String,
        from: String,
        to: String,
    },
}

/// Result type for host operations.
pub type HostResult<T> = std::result::Result<T, HostError>;

/// Failure raised by mod code.
#[derive(Error, Debug)]
pub enum ModError {
    /// Mod reported a failure.
    #[error("{0}")]
    Failed(String),

    /// A store or bus call made by the mod failed.
    #[error(transparent)]
    Host(#[from] HostError),

    /// Mod code panicked; the panic was contained.
    #[error("panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ModError {
    pub fn msg(message: impl Into<String>) -> Self {
        ModError::Failed(message.into())
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
