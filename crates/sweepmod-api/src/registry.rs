//! Namespaced content registries.
//!
//! Entries are keyed by `(namespace, entry_id)` inside a named registry, so
//! two mods can never collide on an id. Writes are only accepted when the
//! caller owns the target namespace.

use crate::error::{HostError, HostResult};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Tileset registry.
pub const TILESETS: &str = "tilesets";
/// Font registry.
pub const FONTS: &str = "fonts";
/// Sound registry.
pub const SOUNDS: &str = "sounds";

/// Registries that exist from startup.
pub const BUILTIN_REGISTRIES: &[&str] = &[TILESETS, FONTS, SOUNDS];

type EntryKey = (String, String);

/// A single registry entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryEntry {
    pub registry: String,
    pub namespace: String,
    pub entry_id: String,
    pub payload: Value,
}

/// Thread-safe set of named registries.
#[derive(Debug)]
pub struct RegistryStore {
    registries: RwLock<BTreeMap<String, BTreeMap<EntryKey, Value>>>,
}

impl Default for RegistryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryStore {
    /// Create a store with the built-in registries.
    pub fn new() -> Self {
        let registries = BUILTIN_REGISTRIES
            .iter()
            .map(|name| (name.to_string(), BTreeMap::new()))
            .collect();
        Self {
            registries: RwLock::new(registries),
        }
    }

    /// Create a registry. Creating one that exists is a no-op.
    pub fn create_registry(&self, name: &str) -> HostResult<()> {
        let mut registries = self.registries.write();
        if !registries.contains_key(name) {
            debug!("Creating registry {}", name);
            registries.insert(name.to_string(), BTreeMap::new());
        }
        Ok(())
    }

    pub fn has_registry(&self, name: &str) -> bool {
        self.registries.read().contains_key(name)
    }

    /// Names of every registry, sorted.
    pub fn registry_names(&self) -> Vec<String> {
        self.registries.read().keys().cloned().collect()
    }

    /// Register an entry, replacing any entry with the same key.
    ///
    /// `caller` is the namespace making the call; it may only write into
    /// its own namespace. Returns the replaced payload, if any.
    pub fn register(
        &self,
        caller: &str,
        registry: &str,
        namespace: &str,
        entry_id: &str,
        payload: Value,
    ) -> HostResult<Option<Value>> {
        if caller != namespace {
            return Err(HostError::NamespaceViolation {
                caller: caller.to_string(),
                owner: namespace.to_string(),
            });
        }

        let mut registries = self.registries.write();
        let entries = registries
            .get_mut(registry)
            .ok_or_else(|| HostError::UnknownRegistry(registry.to_string()))?;

        debug!("Registering {}/{}:{}", registry, namespace, entry_id);
        Ok(entries.insert((namespace.to_string(), entry_id.to_string()), payload))
    }

    /// Look up an entry's payload.
    pub fn resolve(&self, registry: &str, namespace: &str, entry_id: &str) -> HostResult<Value> {
        let registries = self.registries.read();
        let entries = registries
            .get(registry)
            .ok_or_else(|| HostError::UnknownRegistry(registry.to_string()))?;

        entries
            .get(&(namespace.to_string(), entry_id.to_string()))
            .cloned()
            .ok_or_else(|| HostError::NotFound {
                registry: registry.to_string(),
                namespace: namespace.to_string(),
                entry_id: entry_id.to_string(),
            })
    }

    pub fn contains(&self, registry: &str, namespace: &str, entry_id: &str) -> bool {
        self.registries
            .read()
            .get(registry)
            .is_some_and(|entries| entries.contains_key(&(namespace.to_string(), entry_id.to_string())))
    }

    /// All entries of one registry, ordered by key.
    pub fn entries(&self, registry: &str) -> HostResult<Vec<RegistryEntry>> {
        let registries = self.registries.read();
        let entries = registries
            .get(registry)
            .ok_or_else(|| HostError::UnknownRegistry(registry.to_string()))?;

        Ok(entries
            .iter()
            .map(|((namespace, entry_id), payload)| RegistryEntry {
                registry: registry.to_string(),
                namespace: namespace.clone(),
                entry_id: entry_id.clone(),
                payload: payload.clone(),
            })
            .collect())
    }

    /// Every entry owned by a namespace, across all registries.
    pub fn entries_for_namespace(&self, namespace: &str) -> Vec<RegistryEntry> {
        let registries = self.registries.read();
        registries
            .iter()
            .flat_map(|(registry, entries)| {
                entries
                    .iter()
                    .filter(|((owner, _), _)| owner == namespace)
                    .map(move |((owner, entry_id), payload)| RegistryEntry {
                        registry: registry.clone(),
                        namespace: owner.clone(),
                        entry_id: entry_id.clone(),
                        payload: payload.clone(),
                    })
            })
            .collect()
    }

    /// Remove every entry owned by `namespace`. Returns how many were removed.
    pub fn revoke_namespace(&self, namespace: &str) -> usize {
        let mut registries = self.registries.write();
        let mut removed = 0;
        for entries in registries.values_mut() {
            let before = entries.len();
            entries.retain(|(owner, _), _| owner != namespace);
            removed += before - entries.len();
        }
        if removed > 0 {
            debug!("Revoked {} registry entries for {}", removed, namespace);
        }
        removed
    }

    /// Keep only entries whose namespace passes `keep`. Registries
    /// themselves are never dropped. Returns the number of entries removed.
    pub fn retain_namespaces(&self, keep: impl Fn(&str) -> bool) -> usize {
        let mut registries = self.registries.write();
        let mut removed = 0;
        for entries in registries.values_mut() {
            let before = entries.len();
            entries.retain(|(owner, _), _| keep(owner));
            removed += before - entries.len();
        }
        removed
    }

    /// Total number of entries across all registries.
    pub fn len(&self) -> usize {
        self.registries.read().values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_registries_exist() {
        let store = RegistryStore::new();
        assert_eq!(store.registry_names(), vec!["fonts", "sounds", "tilesets"]);
        assert!(store.is_empty());
    }

    #[test]
    fn test_register_and_resolve() {
        let store = RegistryStore::new();
        let previous = store
            .register("neon", TILESETS, "neon", "glow", json!({"path": "glow.png"}))
            .unwrap();
        assert!(previous.is_none());

        assert_eq!(
            store.resolve(TILESETS, "neon", "glow").unwrap(),
            json!({"path": "glow.png"})
        );
    }

    #[test]
    fn test_register_replaces_same_key() {
        let store = RegistryStore::new();
        store.register("neon", FONTS, "neon", "mono", json!(1)).unwrap();
        let previous = store.register("neon", FONTS, "neon", "mono", json!(2)).unwrap();

        assert_eq!(previous, Some(json!(1)));
        assert_eq!(store.resolve(FONTS, "neon", "mono").unwrap(), json!(2));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_same_id_in_different_namespaces() {
        let store = RegistryStore::new();
        store.register("a", SOUNDS, "a", "boom", json!("a")).unwrap();
        store.register("b", SOUNDS, "b", "boom", json!("b")).unwrap();

        assert_eq!(store.resolve(SOUNDS, "a", "boom").unwrap(), json!("a"));
        assert_eq!(store.resolve(SOUNDS, "b", "boom").unwrap(), json!("b"));
    }

    #[test]
    fn test_namespace_violation() {
        let store = RegistryStore::new();
        let err = store
            .register("intruder", TILESETS, "victim", "glow", json!({}))
            .unwrap_err();

        assert_eq!(
            err,
            HostError::NamespaceViolation {
                caller: "intruder".to_string(),
                owner: "victim".to_string(),
            }
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_unknown_registry_and_missing_entry() {
        let store = RegistryStore::new();
        assert!(matches!(
            store.register("neon", "weapons", "neon", "sword", json!({})),
            Err(HostError::UnknownRegistry(_))
        ));
        assert!(matches!(
            store.resolve(TILESETS, "neon", "ghost"),
            Err(HostError::NotFound { .. })
        ));
    }

    #[test]
    fn test_create_registry_is_idempotent() {
        let store = RegistryStore::new();
        store.create_registry("weapons").unwrap();
        store.register("neon", "weapons", "neon", "sword", json!(3)).unwrap();
        store.create_registry("weapons").unwrap();

        assert_eq!(store.resolve("weapons", "neon", "sword").unwrap(), json!(3));
    }

    #[test]
    fn test_revoke_namespace() {
        let store = RegistryStore::new();
        store.register("a", TILESETS, "a", "x", json!(1)).unwrap();
        store.register("a", FONTS, "a", "y", json!(2)).unwrap();
        store.register("b", FONTS, "b", "y", json!(3)).unwrap();

        assert_eq!(store.revoke_namespace("a"), 2);
        assert!(store.entries_for_namespace("a").is_empty());
        assert_eq!(store.entries_for_namespace("b").len(), 1);
        assert_eq!(store.revoke_namespace("a"), 0);
    }

    #[test]
    fn test_retain_namespaces() {
        let store = RegistryStore::new();
        store.create_registry("weapons").unwrap();
        store.create_registry("modes").unwrap();
        store.register("neon", "weapons", "neon", "sword", json!(1)).unwrap();
        store.register("core", "modes", "core", "classic", json!(1)).unwrap();
        store.register("neon", TILESETS, "neon", "glow", json!(1)).unwrap();

        let removed = store.retain_namespaces(|ns| ns == "core");

        assert_eq!(removed, 2);
        assert!(store.has_registry("weapons"));
        assert!(!store.contains("weapons", "neon", "sword"));
        assert!(store.has_registry("modes"));
        assert!(store.has_registry(TILESETS));
        assert!(store.contains("modes", "core", "classic"));
    }

    #[test]
    fn test_entries_sorted_by_key() {
        let store = RegistryStore::new();
        store.register("b", TILESETS, "b", "z", json!(1)).unwrap();
        store.register("a", TILESETS, "a", "z", json!(1)).unwrap();
        store.register("a", TILESETS, "a", "m", json!(1)).unwrap();

        let keys: Vec<_> = store
            .entries(TILESETS)
            .unwrap()
            .into_iter()
            .map(|e| format!("{}:{}", e.namespace, e.entry_id))
            .collect();
        assert_eq!(keys, vec!["a:m", "a:z", "b:z"]);
    }
}
