//! # sweepmod-api
//!
//! Host-side mod runtime for Sweepmod.
//!
//! This crate provides:
//! - [`RegistryStore`]: namespaced content registries and asset lookups
//! - [`SettingsStore`]: typed per-mod settings that survive reloads
//! - [`EventBus`]: priority-ordered, suppressible event dispatch
//! - [`ModManager`]: load, unload and hot reload of [`Mod`] implementations
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use sweepmod_api::{Mod, ModCatalog, ModContext, ModError, ModManager, Propagation, RuntimeContext};
//! use sweepmod_runtime::{ModDescriptor, Version};
//!
//! struct Sparkles;
//!
//! impl Mod for Sparkles {
//!     fn initialize(&mut self, ctx: &ModContext) -> Result<(), ModError> {
//!         ctx.register_tileset("default", "assets/sparkles.png")?;
//!         ctx.on("game.win", |event| {
//!             event.data["confetti"] = serde_json::json!(true);
//!             Ok(Propagation::Continue)
//!         })?;
//!         Ok(())
//!     }
//! }
//!
//! let runtime = Arc::new(RuntimeContext::new());
//! let catalog = ModCatalog::new().with("sparkles", |_| Box::new(Sparkles));
//! let manager = ModManager::new(runtime.clone(), catalog);
//!
//! let report = manager
//!     .load_all(vec![ModDescriptor::new("Sparkles", "sparkles", Version::new(1, 0, 0))])
//!     .unwrap();
//! assert_eq!(report.loaded, vec!["sparkles"]);
//!
//! let result = runtime.emit("game.win", serde_json::json!({}));
//! assert_eq!(result.data["confetti"], true);
//! ```

pub mod assets;
pub mod context;
pub mod error;
pub mod events;
pub mod manager;
pub mod mods;
pub mod registry;
pub mod report;
pub mod settings;

pub use assets::{AssetKind, DEFAULT_ASSET_ID};
pub use context::{LogLevel, ModContext, RuntimeContext, HOST_NAMESPACE};
pub use error::{HostError, HostResult, ModError};
pub use events::{
    names, priority, EmitResult, Event, EventBus, HandlerFailure, HandlerId, HandlerInfo,
    HandlerResult, Propagation,
};
pub use manager::{ModInfo, ModManager, MAX_MODS_LOADED};
pub use mods::{Mod, ModCatalog, ModFactory, ModInstance, ModState};
pub use registry::{RegistryEntry, RegistryStore, BUILTIN_REGISTRIES, FONTS, SOUNDS, TILESETS};
pub use report::{FailureReason, LoadReport, ModFailure, ReloadReport, UnloadReport};
pub use settings::{SettingAccess, SettingSpec, SettingType, SettingsSchema, SettingsStore};
