//! Mod lifecycle manager: load, unload and hot reload.

use crate::context::{ModContext, RuntimeContext, HOST_NAMESPACE};
use crate::error::{panic_message, HostError, HostResult};
use crate::events::names;
use crate::mods::{ModFactory, ModInstance, ModState};
use crate::report::{FailureReason, LoadReport, ModFailure, ReloadReport, UnloadReport};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use sweepmod_runtime::{
    resolve_best_effort_with, select_enabled, ModDescriptor, ResolveOptions, Version,
};
use tracing::{debug, error, info, warn};

/// Default cap on simultaneously active mods.
pub const MAX_MODS_LOADED: usize = 50;

/// Summary of a loaded mod.
#[derive(Debug, Clone, Serialize)]
pub struct ModInfo {
    pub namespace: String,
    pub name: String,
    pub version: Version,
    pub state: ModState,
    pub handlers: usize,
}

/// Marks a lifecycle phase as running; clears the flag on drop.
struct PhaseGuard<'a>(&'a AtomicBool);

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Teardown {
    /// `Active -> CleaningUp -> Unloaded`; the instance is dropped.
    Unload,
    /// Instance is already `Reloading` and is parked for the load that follows.
    Reload,
}

/// Instances parked by a reload teardown, keyed by namespace.
type Parked = HashMap<String, ModInstance>;

/// Owns mod instances and drives their lifecycle.
///
/// All lifecycle calls take `&self`, so a manager can be shared with the
/// handlers it ends up running. A lifecycle call made while another is in
/// progress (for instance from inside a mod's `initialize`) is rejected
/// with [`HostError::LifecycleBusy`].
pub struct ModManager {
    runtime: Arc<RuntimeContext>,
    factory: Arc<dyn ModFactory>,
    instances: Mutex<Vec<ModInstance>>,
    load_order: RwLock<Vec<String>>,
    enabled: RwLock<Option<Vec<String>>>,
    max_mods: usize,
    busy: AtomicBool,
}

impl ModManager {
    pub fn new(runtime: Arc<RuntimeContext>, factory: impl ModFactory + 'static) -> Self {
        Self {
            runtime,
            factory: Arc::new(factory),
            instances: Mutex::new(Vec::new()),
            load_order: RwLock::new(Vec::new()),
            enabled: RwLock::new(None),
            max_mods: MAX_MODS_LOADED,
            busy: AtomicBool::new(false),
        }
    }

    /// Cap the number of simultaneously active mods.
    pub fn with_max_mods(mut self, max_mods: usize) -> Self {
        self.max_mods = max_mods;
        self
    }

    pub fn with_enabled_mods(self, enabled: Vec<String>) -> Self {
        self.set_enabled_mods(Some(enabled));
        self
    }

    /// Restrict `load_all`/`reload_all` to these namespaces (plus whatever
    /// they require), placed in this order where dependencies allow.
    /// `None` loads every descriptor given.
    pub fn set_enabled_mods(&self, enabled: Option<Vec<String>>) {
        *self.enabled.write() = enabled;
    }

    pub fn enabled_mods(&self) -> Option<Vec<String>> {
        self.enabled.read().clone()
    }

    pub fn max_mods(&self) -> usize {
        self.max_mods
    }

    pub fn runtime(&self) -> &Arc<RuntimeContext> {
        &self.runtime
    }

    fn begin_phase(&self, phase: &str) -> HostResult<PhaseGuard<'_>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            warn!("Rejected {} while another lifecycle operation is running", phase);
            return Err(HostError::LifecycleBusy);
        }
        Ok(PhaseGuard(&self.busy))
    }

    /// Whether a load, unload or reload is running.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Resolve, instantiate and initialize a set of mods.
    pub fn load_all(&self, descriptors: Vec<ModDescriptor>) -> HostResult<LoadReport> {
        let _guard = self.begin_phase("load")?;
        if !self.instances.lock().is_empty() {
            return Err(HostError::AlreadyLoaded);
        }

        let started_at = Utc::now();
        let descriptors = self.select(descriptors);
        let (candidates, failures) = self.screen(descriptors);
        let options = self.resolve_options();
        Ok(self.load_candidates(candidates, failures, Parked::new(), options, started_at))
    }

    /// Tear down every mod in reverse load order.
    pub fn unload_all(&self) -> HostResult<UnloadReport> {
        let _guard = self.begin_phase("unload")?;
        let instances = std::mem::take(&mut *self.instances.lock());
        self.load_order.write().clear();
        let (report, _) = self.teardown(instances, Teardown::Unload);
        Ok(report)
    }

    /// Unload one mod, along with every active mod that requires it.
    pub fn unload_mod(&self, namespace: &str) -> HostResult<UnloadReport> {
        let _guard = self.begin_phase("unload")?;
        let (taken, affected) = self.take_with_dependents(namespace)?;
        info!("Unloading {} ({} mods affected)", namespace, affected.len());
        let (report, _) = self.teardown(taken, Teardown::Unload);
        Ok(report)
    }

    /// Tear everything down, then load `descriptors` from scratch.
    ///
    /// Settings survive. Registry entries and event registrations of the old
    /// mods and of the accepted new ones are wiped before the new set
    /// initializes; anything the host registered under its own namespace stays.
    pub fn reload_all(&self, descriptors: Vec<ModDescriptor>) -> HostResult<ReloadReport> {
        let _guard = self.begin_phase("reload")?;
        info!("Reloading mods");
        let started_at = Utc::now();

        let mut old = std::mem::take(&mut *self.instances.lock());
        self.load_order.write().clear();
        mark_reloading(&mut old);
        let previous: Vec<String> = old.iter().map(|i| i.namespace().to_string()).collect();

        let (mut unload, parked) = self.teardown(old, Teardown::Reload);

        let descriptors = self.select(descriptors);
        let (candidates, failures) = self.screen(descriptors);
        unload.revoked += self.wipe_stale(previous.iter().map(String::as_str), &candidates);

        let options = self.resolve_options();
        let load = self.load_candidates(candidates, failures, parked, options, started_at);
        Ok(ReloadReport { unload, load })
    }

    /// Reload one mod from a freshly read descriptor.
    ///
    /// Active mods that require it are reloaded with it, keeping their current
    /// descriptors. Reloaded mods come after the untouched ones in the load order.
    pub fn reload_mod(&self, descriptor: ModDescriptor) -> HostResult<ReloadReport> {
        let _guard = self.begin_phase("reload")?;
        let namespace = descriptor.namespace.clone();
        let started_at = Utc::now();
        let preferred = self.load_order();

        let (mut taken, affected) = self.take_with_dependents(&namespace)?;
        info!("Reloading {} ({} mods affected)", namespace, affected.len());
        mark_reloading(&mut taken);

        let mut descriptors = vec![descriptor];
        descriptors.extend(
            taken
                .iter()
                .filter(|i| i.namespace() != namespace)
                .map(|i| (**i.descriptor()).clone()),
        );

        let (mut unload, parked) = self.teardown(taken, Teardown::Reload);

        let (candidates, failures) = self.screen(descriptors);
        unload.revoked += self.wipe_stale(affected.iter().map(String::as_str), &candidates);

        let loaded: Vec<ModDescriptor> = self
            .instances
            .lock()
            .iter()
            .map(|i| (**i.descriptor()).clone())
            .collect();
        let options = ResolveOptions::default()
            .with_preferred(preferred)
            .with_loaded(loaded);

        let load = self.load_candidates(candidates, failures, parked, options, started_at);
        Ok(ReloadReport { unload, load })
    }

    fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions::default().with_preferred(self.enabled_mods().unwrap_or_default())
    }

    /// Apply the enabled-mod selection, if one is set.
    fn select(&self, descriptors: Vec<ModDescriptor>) -> Vec<ModDescriptor> {
        let Some(enabled) = self.enabled_mods() else {
            return descriptors;
        };
        let selection = select_enabled(&descriptors, &enabled);
        for namespace in &selection.unknown {
            warn!("Enabled mod {} was not found", namespace);
        }
        debug!(
            "{} of {} mods selected",
            selection.descriptors.len(),
            descriptors.len()
        );
        selection.descriptors
    }

    /// Split off descriptors that fail validation or target another API.
    ///
    /// Configuration errors only knock out the offending mod.
    fn screen(&self, descriptors: Vec<ModDescriptor>) -> (Vec<ModDescriptor>, Vec<ModFailure>) {
        let mut candidates = Vec::with_capacity(descriptors.len());
        let mut failures = Vec::new();

        for descriptor in descriptors {
            let checked = descriptor
                .validate()
                .and_then(|_| descriptor.check_api(self.runtime.api_version()));
            match checked {
                Ok(()) => candidates.push(descriptor),
                Err(e) => {
                    warn!("Rejecting mod {}: {}", descriptor.namespace, e);
                    failures.push(ModFailure::new(
                        descriptor.namespace.clone(),
                        FailureReason::InvalidDescriptor(e.to_string()),
                    ));
                }
            }
        }

        (candidates, failures)
    }

    /// Drop registrations left under the given mod namespaces and those of
    /// accepted candidates. The host namespace is never touched.
    fn wipe_stale<'a>(
        &self,
        previous: impl Iterator<Item = &'a str>,
        candidates: &'a [ModDescriptor],
    ) -> usize {
        let stale: HashSet<&str> = previous
            .chain(candidates.iter().map(|d| d.namespace.as_str()))
            .filter(|ns| *ns != HOST_NAMESPACE)
            .collect();
        if stale.is_empty() {
            return 0;
        }

        let revoked = self.runtime.events().retain_namespaces(|ns| !stale.contains(ns))
            + self.runtime.registries().retain_namespaces(|ns| !stale.contains(ns));
        debug!("Wiped {} stale registrations", revoked);
        revoked
    }

    /// Remove `namespace` and every active mod requiring it (transitively)
    /// from the instance table, keeping load order.
    fn take_with_dependents(
        &self,
        namespace: &str,
    ) -> HostResult<(Vec<ModInstance>, HashSet<String>)> {
        let mut instances = self.instances.lock();
        if !instances.iter().any(|i| i.namespace() == namespace) {
            return Err(HostError::NotLoaded(namespace.to_string()));
        }

        // Load order puts dependencies first, so one pass catches chains.
        let mut affected = HashSet::from([namespace.to_string()]);
        for instance in instances.iter() {
            if instance
                .descriptor()
                .required_dependencies()
                .any(|dep| affected.contains(dep))
            {
                affected.insert(instance.namespace().to_string());
            }
        }

        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *instances)
            .into_iter()
            .partition(|i| affected.contains(i.namespace()));
        *instances = kept;
        drop(instances);

        self.load_order.write().retain(|ns| !affected.contains(ns));
        Ok((taken, affected))
    }

    fn load_candidates(
        &self,
        candidates: Vec<ModDescriptor>,
        mut failures: Vec<ModFailure>,
        mut parked: Parked,
        options: ResolveOptions,
        started_at: DateTime<Utc>,
    ) -> LoadReport {
        let resolution = resolve_best_effort_with(&candidates, &options);
        for exclusion in resolution.excluded {
            warn!("Excluding mod {}: {}", exclusion.namespace, exclusion.error);
            failures.push(ModFailure::new(exclusion.namespace, exclusion.error.into()));
        }

        let load_order: Vec<String> =
            resolution.order.iter().map(|d| d.namespace.clone()).collect();
        debug!("Load order: {}", load_order.join(", "));

        let resident = self.instances.lock().len();
        let mut unavailable: HashSet<String> = HashSet::new();
        let mut instances = Vec::with_capacity(resolution.order.len());

        for descriptor in resolution.order {
            let namespace = descriptor.namespace.clone();

            let failed_dependency = descriptor
                .required_dependencies()
                .find(|dep| unavailable.contains(*dep))
                .map(str::to_string);
            let outcome = if let Some(dependency) = failed_dependency {
                Err(FailureReason::DependencyFailed { dependency })
            } else if resident + instances.len() >= self.max_mods {
                Err(FailureReason::LimitReached {
                    limit: self.max_mods,
                })
            } else {
                self.start_instance(descriptor, parked.remove(&namespace))
            };

            match outcome {
                Ok(instance) => instances.push(instance),
                Err(reason) => {
                    warn!("Mod {} failed to load: {}", namespace, reason);
                    self.runtime.emit(
                        names::MOD_ERROR,
                        json!({ "namespace": namespace, "error": reason.to_string() }),
                    );
                    unavailable.insert(namespace.clone());
                    failures.push(ModFailure::new(namespace, reason));
                }
            }
        }

        for (_, instance) in parked.drain() {
            retire(instance);
        }

        let loaded: Vec<String> = instances.iter().map(|i| i.namespace().to_string()).collect();
        let announcements: Vec<_> = instances
            .iter()
            .map(|i| {
                let d = i.descriptor();
                json!({
                    "namespace": d.namespace,
                    "name": d.name,
                    "version": d.version.to_string(),
                })
            })
            .collect();

        self.instances.lock().extend(instances);
        self.load_order.write().extend(load_order.iter().cloned());

        for data in announcements {
            self.runtime.emit(names::MOD_LOAD, data);
        }

        info!(
            "Loaded {} of {} mods ({} failed)",
            loaded.len(),
            loaded.len() + failures.len(),
            failures.len()
        );

        LoadReport {
            load_order,
            loaded,
            failures,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Build and initialize one mod, reusing `previous` if it is reloading.
    fn start_instance(
        &self,
        descriptor: ModDescriptor,
        previous: Option<ModInstance>,
    ) -> Result<ModInstance, FailureReason> {
        let descriptor = Arc::new(descriptor);

        let instantiated = catch_unwind(AssertUnwindSafe(|| self.factory.instantiate(&descriptor)));
        let module = match instantiated {
            Ok(Ok(module)) => Ok(module),
            Ok(Err(e)) => Err(e.to_string()),
            Err(payload) => Err(panic_message(payload)),
        };
        let module = match module {
            Ok(module) => module,
            Err(message) => {
                if let Some(previous) = previous {
                    retire(previous);
                }
                return Err(FailureReason::InstantiationFailed(message));
            }
        };

        let context = ModContext::new(Arc::clone(&self.runtime), Arc::clone(&descriptor));
        let mut instance = match previous {
            Some(mut instance) => {
                instance.rebind(descriptor, module, context);
                instance
            }
            None => ModInstance::new(descriptor, module, context),
        };
        instance
            .transition(ModState::Initializing)
            .map_err(|e| FailureReason::InitializationFailed(e.to_string()))?;

        match instance.initialize() {
            Ok(()) => {
                instance
                    .transition(ModState::Active)
                    .map_err(|e| FailureReason::InitializationFailed(e.to_string()))?;
                info!(
                    "Loaded mod {} v{} ({})",
                    instance.descriptor().name,
                    instance.descriptor().version,
                    instance.namespace()
                );
                Ok(instance)
            }
            Err(e) => {
                let revoked = instance.revoke_registrations();
                debug!("Revoked {} partial registrations of {}", revoked, instance.namespace());
                if let Err(e) = instance.transition(ModState::Unloaded) {
                    error!("{}", e);
                }
                Err(FailureReason::InitializationFailed(e.to_string()))
            }
        }
    }

    /// Clean up `instances` in reverse order and revoke what they registered.
    ///
    /// Runs outside the instance lock so cleanup code can query the manager.
    fn teardown(&self, mut instances: Vec<ModInstance>, mode: Teardown) -> (UnloadReport, Parked) {
        let mut report = UnloadReport::default();
        let mut parked = Parked::new();

        while let Some(mut instance) = instances.pop() {
            let namespace = instance.namespace().to_string();

            if mode == Teardown::Unload {
                if let Err(e) = instance.transition(ModState::CleaningUp) {
                    warn!("{}", e);
                }
            }
            if let Err(e) = instance.cleanup() {
                warn!("Cleanup of {} failed: {}", namespace, e);
                report.failures.push(ModFailure::new(
                    namespace.clone(),
                    FailureReason::CleanupFailed(e.to_string()),
                ));
            }

            report.revoked += instance.revoke_registrations();
            match mode {
                Teardown::Unload => {
                    if let Err(e) = instance.transition(ModState::Unloaded) {
                        warn!("{}", e);
                    }
                    drop(instance);
                }
                Teardown::Reload => {
                    parked.insert(namespace.clone(), instance);
                }
            }

            info!("Unloaded mod {}", namespace);
            self.runtime
                .emit(names::MOD_UNLOAD, json!({ "namespace": namespace }));
            report.unloaded.push(namespace);
        }

        (report, parked)
    }

    /// Namespaces of active mods, in load order.
    pub fn loaded_namespaces(&self) -> Vec<String> {
        self.instances
            .lock()
            .iter()
            .map(|i| i.namespace().to_string())
            .collect()
    }

    /// Resolved order of the mods placed by the lifecycle calls so far,
    /// including mods that then failed. Unloading removes entries.
    pub fn load_order(&self) -> Vec<String> {
        self.load_order.read().clone()
    }

    pub fn is_loaded(&self, namespace: &str) -> bool {
        self.instances.lock().iter().any(|i| i.namespace() == namespace)
    }

    pub fn state_of(&self, namespace: &str) -> Option<ModState> {
        self.instances
            .lock()
            .iter()
            .find(|i| i.namespace() == namespace)
            .map(ModInstance::state)
    }

    pub fn descriptor(&self, namespace: &str) -> Option<Arc<ModDescriptor>> {
        self.instances
            .lock()
            .iter()
            .find(|i| i.namespace() == namespace)
            .map(|i| Arc::clone(i.descriptor()))
    }

    pub fn mod_count(&self) -> usize {
        self.instances.lock().len()
    }

    pub fn list_mods(&self) -> Vec<ModInfo> {
        self.instances
            .lock()
            .iter()
            .map(|i| ModInfo {
                namespace: i.namespace().to_string(),
                name: i.descriptor().name.clone(),
                version: i.descriptor().version,
                state: i.state(),
                handlers: i.context().handler_ids().len(),
            })
            .collect()
    }
}

impl std::fmt::Debug for ModManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModManager")
            .field("loaded", &self.loaded_namespaces())
            .field("max_mods", &self.max_mods)
            .field("busy", &self.is_busy())
            .finish()
    }
}

fn mark_reloading(instances: &mut [ModInstance]) {
    for instance in instances {
        if let Err(e) = instance.transition(ModState::Reloading) {
            warn!("{}", e);
        }
    }
}

/// Finish off a reloading instance that is not coming back.
fn retire(mut instance: ModInstance) {
    for next in [ModState::CleaningUp, ModState::Unloaded] {
        if let Err(e) = instance.transition(next) {
            warn!("{}", e);
        }
    }
    debug!("Retired {}", instance.namespace());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModError;
    use crate::mods::Mod;

    struct Quiet;

    impl Mod for Quiet {
        fn initialize(&mut self, ctx: &ModContext) -> Result<(), ModError> {
            ctx.register_tileset("default", "quiet.png")?;
            Ok(())
        }
    }

    fn manager() -> ModManager {
        let factory = |_: &ModDescriptor| -> Result<Box<dyn Mod>, ModError> { Ok(Box::new(Quiet)) };
        ModManager::new(Arc::new(RuntimeContext::new()), factory)
    }

    fn descriptor(namespace: &str) -> ModDescriptor {
        ModDescriptor::new(namespace, namespace, Version::new(1, 0, 0))
    }

    #[test]
    fn test_parked_instance_is_reinitialized() {
        let manager = manager();
        let mut instance = manager.start_instance(descriptor("neon"), None).unwrap();
        instance.transition(ModState::Reloading).unwrap();

        let mut upgraded = descriptor("neon");
        upgraded.version = Version::new(1, 1, 0);
        let instance = manager.start_instance(upgraded, Some(instance)).unwrap();

        assert_eq!(instance.state(), ModState::Active);
        assert_eq!(instance.descriptor().version, Version::new(1, 1, 0));
        assert!(manager.runtime().registries().contains(crate::TILESETS, "neon", "default"));
    }

    #[test]
    fn test_stale_wipe_skips_host_namespace() {
        let manager = manager();
        let registries = manager.runtime().registries();
        registries
            .register(
                HOST_NAMESPACE,
                crate::TILESETS,
                HOST_NAMESPACE,
                "default",
                json!({"path": "core.png"}),
            )
            .unwrap();
        registries
            .register("gone", crate::TILESETS, "gone", "default", json!({"path": "gone.png"}))
            .unwrap();

        let impostor = ModDescriptor::new("Impostor", HOST_NAMESPACE, Version::new(1, 0, 0));
        let candidates = vec![impostor];
        let revoked = manager.wipe_stale(["gone"].into_iter(), &candidates);

        assert_eq!(revoked, 1);
        assert!(registries.contains(crate::TILESETS, HOST_NAMESPACE, "default"));
        assert!(!registries.contains(crate::TILESETS, "gone", "default"));
    }
}
