//! Asset lookups layered on the built-in registries.
//!
//! Asset entries are ordinary registry entries whose payload carries a
//! `path` string. Tilesets and fonts fall back to the namespace's `default`
//! entry when the requested id is absent.

use crate::error::{HostError, HostResult};
use crate::registry::{RegistryStore, FONTS, SOUNDS, TILESETS};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Entry id used as a fallback for tilesets and fonts.
pub const DEFAULT_ASSET_ID: &str = "default";

/// Kind of asset, mapping onto a built-in registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Tileset,
    Font,
    Sound,
}

impl AssetKind {
    pub fn registry(&self) -> &'static str {
        match self {
            AssetKind::Tileset => TILESETS,
            AssetKind::Font => FONTS,
            AssetKind::Sound => SOUNDS,
        }
    }

    fn has_default_fallback(&self) -> bool {
        !matches!(self, AssetKind::Sound)
    }
}

impl RegistryStore {
    /// Register an asset path under the caller's namespace.
    pub fn register_asset(
        &self,
        caller: &str,
        kind: AssetKind,
        namespace: &str,
        entry_id: &str,
        path: impl AsRef<Path>,
    ) -> HostResult<()> {
        let path = path.as_ref().to_string_lossy().into_owned();
        self.register(caller, kind.registry(), namespace, entry_id, json!({ "path": path }))?;
        Ok(())
    }

    /// Resolve an asset's path.
    pub fn asset_path(&self, kind: AssetKind, namespace: &str, entry_id: &str) -> HostResult<PathBuf> {
        let registry = kind.registry();
        let payload = match self.resolve(registry, namespace, entry_id) {
            Ok(payload) => payload,
            Err(err @ HostError::NotFound { .. })
                if kind.has_default_fallback() && entry_id != DEFAULT_ASSET_ID =>
            {
                match self.resolve(registry, namespace, DEFAULT_ASSET_ID) {
                    Ok(payload) => {
                        debug!(
                            "{}/{}:{} not found, using default",
                            registry, namespace, entry_id
                        );
                        payload
                    }
                    Err(_) => return Err(err),
                }
            }
            Err(err) => return Err(err),
        };

        payload
            .get("path")
            .and_then(|p| p.as_str())
            .map(PathBuf::from)
            .ok_or_else(|| HostError::MissingAssetPath {
                registry: registry.to_string(),
                namespace: namespace.to_string(),
                entry_id: entry_id.to_string(),
            })
    }

    pub fn get_tileset_path(&self, namespace: &str, entry_id: &str) -> HostResult<PathBuf> {
        self.asset_path(AssetKind::Tileset, namespace, entry_id)
    }

    pub fn get_font_path(&self, namespace: &str, entry_id: &str) -> HostResult<PathBuf> {
        self.asset_path(AssetKind::Font, namespace, entry_id)
    }

    pub fn get_sound_path(&self, namespace: &str, entry_id: &str) -> HostResult<PathBuf> {
        self.asset_path(AssetKind::Sound, namespace, entry_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup_paths() {
        let store = RegistryStore::new();
        store
            .register_asset("neon", AssetKind::Tileset, "neon", "walls", "assets/walls.png")
            .unwrap();
        store
            .register_asset("neon", AssetKind::Sound, "neon", "zap", "assets/zap.ogg")
            .unwrap();

        assert_eq!(
            store.get_tileset_path("neon", "walls").unwrap(),
            PathBuf::from("assets/walls.png")
        );
        assert_eq!(
            store.get_sound_path("neon", "zap").unwrap(),
            PathBuf::from("assets/zap.ogg")
        );
    }

    #[test]
    fn test_tileset_and_font_fall_back_to_default() {
        let store = RegistryStore::new();
        store
            .register_asset("neon", AssetKind::Font, "neon", DEFAULT_ASSET_ID, "mono.ttf")
            .unwrap();

        assert_eq!(
            store.get_font_path("neon", "fancy").unwrap(),
            PathBuf::from("mono.ttf")
        );
    }

    #[test]
    fn test_sound_has_no_fallback() {
        let store = RegistryStore::new();
        store
            .register_asset("neon", AssetKind::Sound, "neon", DEFAULT_ASSET_ID, "beep.ogg")
            .unwrap();

        assert!(matches!(
            store.get_sound_path("neon", "boom"),
            Err(HostError::NotFound { .. })
        ));
    }

    #[test]
    fn test_missing_default_reports_requested_id() {
        let store = RegistryStore::new();
        let err = store.get_tileset_path("neon", "walls").unwrap_err();
        assert_eq!(
            err,
            HostError::NotFound {
                registry: TILESETS.to_string(),
                namespace: "neon".to_string(),
                entry_id: "walls".to_string(),
            }
        );
    }

    #[test]
    fn test_payload_without_path() {
        let store = RegistryStore::new();
        store
            .register("neon", TILESETS, "neon", "broken", json!({ "size": 16 }))
            .unwrap();

        assert!(matches!(
            store.get_tileset_path("neon", "broken"),
            Err(HostError::MissingAssetPath { .. })
        ));
    }
}
