//! Outcome reports for lifecycle phases.

use chrono::{DateTime, Utc};
use sweepmod_runtime::ResolveError;
use thiserror::Error;

/// Why a mod did not load (or did not tear down cleanly).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Descriptor failed validation or targets an incompatible API.
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// Excluded by the resolver.
    #[error(transparent)]
    Resolution(#[from] ResolveError),

    /// The factory could not produce an instance.
    #[error("could not instantiate: {0}")]
    InstantiationFailed(String),

    /// `initialize` returned an error or panicked.
    #[error("initialize failed: {0}")]
    InitializationFailed(String),

    /// Skipped because a required dependency failed in this pass.
    #[error("required dependency '{dependency}' failed to load")]
    DependencyFailed { dependency: String },

    /// Loading it would exceed the manager's mod limit.
    #[error("mod limit of {limit} reached")]
    LimitReached { limit: usize },

    /// `cleanup` returned an error or panicked. Registrations were still revoked.
    #[error("cleanup failed: {0}")]
    CleanupFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModFailure {
    pub namespace: String,
    pub reason: FailureReason,
}

impl ModFailure {
    pub fn new(namespace: impl Into<String>, reason: FailureReason) -> Self {
        Self {
            namespace: namespace.into(),
            reason,
        }
    }
}

impl std::fmt::Display for ModFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.namespace, self.reason)
    }
}

/// Result of a load phase.
#[derive(Debug, Clone)]
pub struct LoadReport {
    /// Resolved order of every mod the resolver accepted.
    pub load_order: Vec<String>,
    /// Mods that reached `Active`, in load order.
    pub loaded: Vec<String>,
    pub failures: Vec<ModFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failure(&self, namespace: &str) -> Option<&FailureReason> {
        self.failures
            .iter()
            .find(|f| f.namespace == namespace)
            .map(|f| &f.reason)
    }
}

/// Result of an unload phase.
#[derive(Debug, Clone, Default)]
pub struct UnloadReport {
    /// Mods torn down, in teardown (reverse load) order.
    pub unloaded: Vec<String>,
    /// Cleanup failures. These mods were unloaded regardless.
    pub failures: Vec<ModFailure>,
    /// Handlers and registry entries removed.
    pub revoked: usize,
}

/// Result of a reload.
#[derive(Debug, Clone)]
pub struct ReloadReport {
    pub unload: UnloadReport,
    pub load: LoadReport,
}
