//! # sweepmod-runtime
//!
//! Mod descriptors and load-order resolution for Sweepmod.
//!
//! This crate provides:
//! - Mod manifest parsing (`mod.toml` / `mod.json`)
//! - Mod discovery from search directories
//! - Declared permission levels
//! - Dependency graph resolution into a deterministic load order
//!
//! ## Mod Structure
//!
//! Mods are directories containing a manifest:
//!
//! ```toml
//! permissions = ["cosmetic"]
//!
//! [mod]
//! name = "Neon Tiles"
//! version = "1.0.0"
//! api_version = "1.0.0"
//! namespace = "neon_tiles"
//!
//! [[dependencies]]
//! namespace = "base_pack"
//! kind = "required"
//! ```
//!
//! Nothing here runs mod code; see `sweepmod-api` for the lifecycle side.

pub mod descriptor;
pub mod discovery;
pub mod error;
pub mod manifest;
pub mod permission;
pub mod resolver;

pub use descriptor::{Dependency, DependencyKind, ModDescriptor, Version, API_VERSION};
pub use discovery::{discover_mod, discover_mods, Discovery, DiscoveryError, ModPath};
pub use error::{ResolveError, RuntimeError, RuntimeResult};
pub use manifest::ModManifest;
pub use permission::{Permission, PermissionSet};
pub use resolver::{
    resolve, resolve_best_effort, resolve_best_effort_with, select_enabled, Exclusion, Resolution,
    ResolveOptions, Selection,
};
