//! Shared runtime state and the per-mod view of it.

use crate::assets::AssetKind;
use crate::error::HostResult;
use crate::events::{priority, EmitResult, Event, EventBus, HandlerId, HandlerResult};
use crate::registry::{RegistryEntry, RegistryStore};
use crate::settings::{SettingsSchema, SettingsStore};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sweepmod_runtime::{ModDescriptor, Permission, PermissionSet, Version, API_VERSION};

/// Namespace used by the host itself. Its registrations survive reloads.
pub const HOST_NAMESPACE: &str = "core";

/// Log level for messages a mod writes through its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// The stores and bus shared by the host and every loaded mod.
#[derive(Debug)]
pub struct RuntimeContext {
    registries: RegistryStore,
    settings: SettingsStore,
    events: EventBus,
    api_version: Version,
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self::with_api_version(API_VERSION)
    }
}

impl RuntimeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_version(api_version: Version) -> Self {
        Self {
            registries: RegistryStore::new(),
            settings: SettingsStore::new(),
            events: EventBus::new(),
            api_version,
        }
    }

    pub fn registries(&self) -> &RegistryStore {
        &self.registries
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Mod API version this host provides.
    pub fn api_version(&self) -> &Version {
        &self.api_version
    }

    /// Emit an event on behalf of the host.
    pub fn emit(&self, event: &str, data: Value) -> EmitResult {
        self.events.emit(event, data)
    }
}

/// A mod's handle on the runtime.
///
/// Every write goes through the mod's own namespace, and every handler it
/// registers is tracked so teardown can remove it. The stores themselves are
/// not reachable from here, so a mod cannot claim another namespace as caller.
pub struct ModContext {
    runtime: Arc<RuntimeContext>,
    descriptor: Arc<ModDescriptor>,
    handlers: Mutex<Vec<HandlerId>>,
}

impl std::fmt::Debug for ModContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModContext")
            .field("namespace", &self.descriptor.namespace)
            .field("handlers", &self.handlers.lock().len())
            .finish()
    }
}

impl ModContext {
    pub fn new(runtime: Arc<RuntimeContext>, descriptor: Arc<ModDescriptor>) -> Self {
        Self {
            runtime,
            descriptor,
            handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.descriptor.namespace
    }

    pub fn descriptor(&self) -> &ModDescriptor {
        &self.descriptor
    }

    /// Mod API version the host provides.
    pub fn api_version(&self) -> &Version {
        self.runtime.api_version()
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().has(permission)
    }

    pub fn permissions(&self) -> &PermissionSet {
        &self.descriptor.permissions
    }

    // Events

    /// Handle `event` at normal priority.
    pub fn on<F>(&self, event: &str, handler: F) -> HostResult<HandlerId>
    where
        F: Fn(&mut Event) -> HandlerResult + Send + Sync + 'static,
    {
        self.on_with_priority(event, priority::NORMAL, handler)
    }

    pub fn on_with_priority<F>(&self, event: &str, priority: u16, handler: F) -> HostResult<HandlerId>
    where
        F: Fn(&mut Event) -> HandlerResult + Send + Sync + 'static,
    {
        let id = self
            .runtime
            .events()
            .register_handler_with_priority(event, self.namespace(), priority, handler)?;
        self.handlers.lock().push(id);
        Ok(id)
    }

    /// Observe `event` after its handler chain has run.
    pub fn monitor<F>(&self, event: &str, observer: F) -> HandlerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = self
            .runtime
            .events()
            .register_monitor(event, self.namespace(), observer);
        self.handlers.lock().push(id);
        id
    }

    /// Remove one of this mod's handlers.
    pub fn off(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.lock();
        match handlers.iter().position(|h| *h == id) {
            Some(index) => {
                handlers.remove(index);
                drop(handlers);
                self.runtime.events().unregister(id)
            }
            None => false,
        }
    }

    pub fn emit(&self, event: &str, data: Value) -> EmitResult {
        self.runtime.events().emit(event, data)
    }

    /// Ids of handlers this mod currently has registered.
    pub fn handler_ids(&self) -> Vec<HandlerId> {
        self.handlers.lock().clone()
    }

    // Registries

    pub fn create_registry(&self, name: &str) -> HostResult<()> {
        self.runtime.registries().create_registry(name)
    }

    /// Register an entry under this mod's namespace.
    pub fn register_entry(&self, registry: &str, entry_id: &str, payload: Value) -> HostResult<()> {
        let namespace = self.namespace();
        self.runtime
            .registries()
            .register(namespace, registry, namespace, entry_id, payload)?;
        Ok(())
    }

    /// Register an entry under an explicit namespace.
    ///
    /// Fails with `NamespaceViolation` unless `namespace` is this mod's own.
    pub fn register_entry_in(
        &self,
        registry: &str,
        namespace: &str,
        entry_id: &str,
        payload: Value,
    ) -> HostResult<()> {
        self.runtime
            .registries()
            .register(self.namespace(), registry, namespace, entry_id, payload)?;
        Ok(())
    }

    /// Read any namespace's entry.
    pub fn resolve_entry(&self, registry: &str, namespace: &str, entry_id: &str) -> HostResult<Value> {
        self.runtime.registries().resolve(registry, namespace, entry_id)
    }

    /// Every entry of a registry, across namespaces.
    pub fn entries(&self, registry: &str) -> HostResult<Vec<RegistryEntry>> {
        self.runtime.registries().entries(registry)
    }

    // Assets

    pub fn register_tileset(&self, entry_id: &str, path: impl AsRef<Path>) -> HostResult<()> {
        self.register_asset(AssetKind::Tileset, entry_id, path)
    }

    pub fn register_font(&self, entry_id: &str, path: impl AsRef<Path>) -> HostResult<()> {
        self.register_asset(AssetKind::Font, entry_id, path)
    }

    pub fn register_sound(&self, entry_id: &str, path: impl AsRef<Path>) -> HostResult<()> {
        self.register_asset(AssetKind::Sound, entry_id, path)
    }

    fn register_asset(&self, kind: AssetKind, entry_id: &str, path: impl AsRef<Path>) -> HostResult<()> {
        let namespace = self.namespace();
        self.runtime
            .registries()
            .register_asset(namespace, kind, namespace, entry_id, path)
    }

    pub fn asset_path(&self, kind: AssetKind, namespace: &str, entry_id: &str) -> HostResult<PathBuf> {
        self.runtime.registries().asset_path(kind, namespace, entry_id)
    }

    // Settings

    pub fn register_settings(&self, schema: SettingsSchema) -> HostResult<()> {
        self.runtime.settings().register_schema(self.namespace(), schema)
    }

    pub fn get_setting(&self, key: &str) -> HostResult<Value> {
        self.runtime.settings().get(self.namespace(), key)
    }

    pub fn set_setting(&self, key: &str, value: Value) -> HostResult<()> {
        self.runtime.settings().set(self.namespace(), key, value)
    }

    /// Change several of this mod's settings; all or nothing.
    pub fn set_settings(&self, values: BTreeMap<String, Value>) -> HostResult<()> {
        self.runtime.settings().set_values(self.namespace(), values)
    }

    /// Read another namespace's setting.
    pub fn setting_of(&self, namespace: &str, key: &str) -> HostResult<Value> {
        self.runtime.settings().get(namespace, key)
    }

    /// Log a message tagged with this mod's namespace.
    pub fn log(&self, level: LogLevel, message: &str) {
        let namespace = self.namespace();
        match level {
            LogLevel::Trace => tracing::trace!(mod_namespace = %namespace, "{}", message),
            LogLevel::Debug => tracing::debug!(mod_namespace = %namespace, "{}", message),
            LogLevel::Info => tracing::info!(mod_namespace = %namespace, "{}", message),
            LogLevel::Warn => tracing::warn!(mod_namespace = %namespace, "{}", message),
            LogLevel::Error => tracing::error!(mod_namespace = %namespace, "{}", message),
        }
    }

    /// Remove every handler and registry entry owned by this mod.
    ///
    /// Settings are left in place so values survive a reload.
    pub(crate) fn revoke(&self) -> usize {
        self.handlers.lock().clear();
        let namespace = self.namespace();
        self.runtime.events().revoke_all(namespace) + self.runtime.registries().revoke_namespace(namespace)
    }
}
