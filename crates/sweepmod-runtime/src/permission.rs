//! Declared permission levels for mods.
//!
//! Mods declare the access level they intend to use in their manifest. The
//! runtime records the declaration so hosts can display or audit it; it does
//! not sandbox anything.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A permission level a mod can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// Visual changes only (tilesets, fonts, sounds, UI).
    #[serde(alias = "COSMETIC", alias = "Cosmetic")]
    Cosmetic,

    /// Changes to game rules and game events.
    #[serde(alias = "GAMEPLAY", alias = "Gameplay")]
    Gameplay,

    /// Unrestricted access.
    #[serde(alias = "SYSTEM", alias = "System")]
    System,
}

impl Permission {
    /// Parse a permission level, ignoring case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cosmetic" => Some(Permission::Cosmetic),
            "gameplay" => Some(Permission::Gameplay),
            "system" => Some(Permission::System),
            _ => None,
        }
    }

    /// Convert permission to its manifest spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Cosmetic => "cosmetic",
            Permission::Gameplay => "gameplay",
            Permission::System => "system",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of declared permissions.
///
/// Ordered so diagnostics list permissions the same way every time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet {
    permissions: BTreeSet<Permission>,
}

impl PermissionSet {
    /// Create an empty permission set.
    pub fn new() -> Self {
        Self {
            permissions: BTreeSet::new(),
        }
    }

    /// Add a permission to the set.
    pub fn add(&mut self, permission: Permission) {
        self.permissions.insert(permission);
    }

    /// Check if the set contains a permission.
    pub fn has(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    /// Get all permissions in the set.
    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        self.permissions.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }
}

/// Mods that declare nothing are treated as cosmetic.
impl Default for PermissionSet {
    fn default() -> Self {
        [Permission::Cosmetic].into_iter().collect()
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = Permission>>(iter: T) -> Self {
        Self {
            permissions: iter.into_iter().collect(),
        }
    }
}
