//! The mod trait, factories, and per-mod lifecycle state.

use crate::context::ModContext;
use crate::error::{panic_message, HostError, HostResult, ModError};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use sweepmod_runtime::ModDescriptor;

/// Behaviour supplied by a mod.
///
/// `initialize` is where a mod registers handlers, entries, assets and its
/// settings schema through the context. Everything registered through the
/// context is removed automatically when the mod is torn down, so `cleanup`
/// only needs to release state the mod holds itself.
pub trait Mod: Send {
    fn initialize(&mut self, ctx: &ModContext) -> Result<(), ModError>;

    fn cleanup(&mut self, _ctx: &ModContext) -> Result<(), ModError> {
        Ok(())
    }
}

/// Produces mod instances from descriptors.
pub trait ModFactory: Send + Sync {
    fn instantiate(&self, descriptor: &ModDescriptor) -> Result<Box<dyn Mod>, ModError>;
}

impl<F> ModFactory for F
where
    F: Fn(&ModDescriptor) -> Result<Box<dyn Mod>, ModError> + Send + Sync,
{
    fn instantiate(&self, descriptor: &ModDescriptor) -> Result<Box<dyn Mod>, ModError> {
        self(descriptor)
    }
}

type Constructor = Box<dyn Fn(&ModDescriptor) -> Box<dyn Mod> + Send + Sync>;

/// A factory backed by constructors registered per namespace.
#[derive(Default)]
pub struct ModCatalog {
    constructors: HashMap<String, Constructor>,
}

impl ModCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the constructor for a namespace, replacing any previous one.
    pub fn register<F>(&mut self, namespace: impl Into<String>, constructor: F)
    where
        F: Fn(&ModDescriptor) -> Box<dyn Mod> + Send + Sync + 'static,
    {
        self.constructors.insert(namespace.into(), Box::new(constructor));
    }

    pub fn with<F>(mut self, namespace: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&ModDescriptor) -> Box<dyn Mod> + Send + Sync + 'static,
    {
        self.register(namespace, constructor);
        self
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.constructors.contains_key(namespace)
    }

    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<_> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }
}

impl ModFactory for ModCatalog {
    fn instantiate(&self, descriptor: &ModDescriptor) -> Result<Box<dyn Mod>, ModError> {
        let constructor = self.constructors.get(&descriptor.namespace).ok_or_else(|| {
            ModError::msg(format!(
                "no implementation registered for '{}'",
                descriptor.namespace
            ))
        })?;
        Ok(constructor(descriptor))
    }
}

/// Lifecycle state of a mod instance.
///
/// `Unloaded -> Initializing -> Active`, then either `CleaningUp -> Unloaded`
/// on unload, or `Reloading -> Initializing` when a reload brings the mod
/// back. A reloading mod that does not come back leaves through `CleaningUp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModState {
    Unloaded,
    Initializing,
    Active,
    Reloading,
    CleaningUp,
}

impl ModState {
    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: ModState) -> bool {
        use ModState::*;
        matches!(
            (self, next),
            (Unloaded, Initializing)
                | (Initializing, Active)
                | (Initializing, Unloaded)
                | (Active, Reloading)
                | (Active, CleaningUp)
                | (Reloading, Initializing)
                | (Reloading, CleaningUp)
                | (CleaningUp, Unloaded)
        )
    }
}

impl fmt::Display for ModState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModState::Unloaded => "unloaded",
            ModState::Initializing => "initializing",
            ModState::Active => "active",
            ModState::Reloading => "reloading",
            ModState::CleaningUp => "cleaning_up",
        };
        f.write_str(s)
    }
}

/// A mod plus its context and lifecycle state.
pub struct ModInstance {
    descriptor: Arc<ModDescriptor>,
    state: ModState,
    module: Box<dyn Mod>,
    context: ModContext,
}

impl fmt::Debug for ModInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModInstance")
            .field("namespace", &self.descriptor.namespace)
            .field("state", &self.state)
            .finish()
    }
}

impl ModInstance {
    pub(crate) fn new(descriptor: Arc<ModDescriptor>, module: Box<dyn Mod>, context: ModContext) -> Self {
        Self {
            descriptor,
            state: ModState::Unloaded,
            module,
            context,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.descriptor.namespace
    }

    pub fn descriptor(&self) -> &Arc<ModDescriptor> {
        &self.descriptor
    }

    pub fn state(&self) -> ModState {
        self.state
    }

    pub fn context(&self) -> &ModContext {
        &self.context
    }

    /// Swap in a freshly built module for a reloading instance.
    pub(crate) fn rebind(&mut self, descriptor: Arc<ModDescriptor>, module: Box<dyn Mod>, context: ModContext) {
        self.descriptor = descriptor;
        self.module = module;
        self.context = context;
    }

    pub(crate) fn transition(&mut self, next: ModState) -> HostResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(HostError::InvalidTransition {
                namespace: self.descriptor.namespace.clone(),
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        Ok(())
    }

    /// Run the mod's `initialize`, containing panics.
    pub(crate) fn initialize(&mut self) -> Result<(), ModError> {
        let (module, context) = (&mut self.module, &self.context);
        catch_unwind(AssertUnwindSafe(|| module.initialize(context)))
            .unwrap_or_else(|payload| Err(ModError::Panicked(panic_message(payload))))
    }

    /// Run the mod's `cleanup`, containing panics.
    pub(crate) fn cleanup(&mut self) -> Result<(), ModError> {
        let (module, context) = (&mut self.module, &self.context);
        catch_unwind(AssertUnwindSafe(|| module.cleanup(context)))
            .unwrap_or_else(|payload| Err(ModError::Panicked(panic_message(payload))))
    }

    pub(crate) fn revoke_registrations(&self) -> usize {
        self.context.revoke()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sweepmod_runtime::Version;

    struct Noop;

    impl Mod for Noop {
        fn initialize(&mut self, _ctx: &ModContext) -> Result<(), ModError> {
            Ok(())
        }
    }

    #[test]
    fn test_lifecycle_transitions() {
        use ModState::*;
        assert!(Unloaded.can_transition_to(Initializing));
        assert!(Initializing.can_transition_to(Active));
        assert!(Initializing.can_transition_to(Unloaded));
        assert!(Active.can_transition_to(Reloading));
        assert!(Reloading.can_transition_to(Initializing));
        assert!(Reloading.can_transition_to(CleaningUp));
        assert!(CleaningUp.can_transition_to(Unloaded));

        assert!(!Unloaded.can_transition_to(Active));
        assert!(!Active.can_transition_to(Unloaded));
        assert!(!CleaningUp.can_transition_to(Active));
        assert!(!Reloading.can_transition_to(Active));
        assert!(!Reloading.can_transition_to(Unloaded));
    }

    #[test]
    fn test_catalog_instantiates_registered_namespaces() {
        let catalog = ModCatalog::new().with("neon", |_| Box::new(Noop));
        let known = ModDescriptor::new("Neon", "neon", Version::new(1, 0, 0));
        let unknown = ModDescriptor::new("Ghost", "ghost", Version::new(1, 0, 0));

        assert!(catalog.instantiate(&known).is_ok());
        let err = catalog.instantiate(&unknown).err().unwrap();
        assert!(err.to_string().contains("ghost"));
        assert_eq!(catalog.namespaces(), vec!["neon"]);
    }

    #[test]
    fn test_closure_factory() {
        let factory = |_: &ModDescriptor| -> Result<Box<dyn Mod>, ModError> { Ok(Box::new(Noop)) };
        let descriptor = ModDescriptor::new("Neon", "neon", Version::new(1, 0, 0));
        assert!(factory.instantiate(&descriptor).is_ok());
    }
}
