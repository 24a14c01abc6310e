//! Mod descriptors: the immutable identity and dependency declarations of a mod.

use crate::error::{RuntimeError, RuntimeResult};
use crate::permission::{Permission, PermissionSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Mod API version implemented by this runtime.
pub const API_VERSION: Version = Version::new(1, 0, 0);

/// Namespaces reserved for the host.
pub const RESERVED_NAMESPACES: &[&str] = &["core", "base", "system", "builtin"];

/// Maximum namespace length in bytes.
pub const MAX_NAMESPACE_LEN: usize = 32;

/// A `major.minor.patch` version triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Whether a mod built against `self` can run on a host providing `host`.
    ///
    /// Majors must match and the host must be at least as new in the minor.
    pub fn is_compatible_with(&self, host: &Version) -> bool {
        self.major == host.major && self.minor <= host.minor
    }
}

impl FromStr for Version {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(RuntimeError::InvalidVersion(s.to_string()));
        }
        let parse = |part: &str| {
            part.parse::<u64>()
                .map_err(|_| RuntimeError::InvalidVersion(s.to_string()))
        };
        Ok(Self::new(parse(parts[0])?, parse(parts[1])?, parse(parts[2])?))
    }
}

impl TryFrom<String> for Version {
    type Error = RuntimeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// How a mod relates to another mod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// Target must be present and loads first.
    #[serde(alias = "hard_dependency", alias = "REQUIRED")]
    Required,

    /// Target loads first when present.
    #[serde(alias = "soft_dependency", alias = "OPTIONAL")]
    Optional,

    /// This mod loads before the target.
    #[serde(alias = "load_order_before", alias = "BEFORE")]
    Before,

    /// This mod loads after the target.
    #[serde(alias = "load_order_after", alias = "AFTER")]
    After,

    /// This mod cannot load alongside the target.
    #[serde(alias = "conflict", alias = "INCOMPATIBLE")]
    Incompatible,
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DependencyKind::Required => "required",
            DependencyKind::Optional => "optional",
            DependencyKind::Before => "before",
            DependencyKind::After => "after",
            DependencyKind::Incompatible => "incompatible",
        };
        f.write_str(s)
    }
}

/// A single dependency declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Namespace of the target mod.
    pub namespace: String,

    /// Relationship to the target.
    pub kind: DependencyKind,
}

/// Immutable description of a mod, as read from its manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModDescriptor {
    /// Human-readable name.
    pub name: String,

    /// Mod version.
    pub version: Version,

    /// Mod API version the mod was written against.
    pub api_version: Version,

    /// Unique identifier; primary key in every store.
    pub namespace: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Declared access intent. Recorded, not enforced.
    #[serde(default)]
    pub permissions: PermissionSet,

    /// Dependencies in declaration order.
    #[serde(default)]
    pub dependencies: Vec<Dependency>,

    /// Tie-break among unconstrained mods; lower loads earlier.
    #[serde(default)]
    pub load_priority: i32,
}

impl ModDescriptor {
    /// Create a descriptor targeting the current API with no dependencies.
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            api_version: API_VERSION,
            namespace: namespace.into(),
            description: None,
            author: None,
            permissions: PermissionSet::default(),
            dependencies: Vec::new(),
            load_priority: 0,
        }
    }

    /// Add a dependency declaration.
    pub fn with_dependency(mut self, namespace: impl Into<String>, kind: DependencyKind) -> Self {
        self.dependencies.push(Dependency {
            namespace: namespace.into(),
            kind,
        });
        self
    }

    pub fn with_load_priority(mut self, load_priority: i32) -> Self {
        self.load_priority = load_priority;
        self
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.add(permission);
        self
    }

    pub fn with_api_version(mut self, api_version: Version) -> Self {
        self.api_version = api_version;
        self
    }

    /// Namespaces this mod cannot load without.
    pub fn required_dependencies(&self) -> impl Iterator<Item = &str> {
        self.dependencies
            .iter()
            .filter(|dep| dep.kind == DependencyKind::Required)
            .map(|dep| dep.namespace.as_str())
    }

    /// Namespaces this mod refuses to load alongside.
    pub fn incompatibilities(&self) -> impl Iterator<Item = &str> {
        self.dependencies
            .iter()
            .filter(|dep| dep.kind == DependencyKind::Incompatible)
            .map(|dep| dep.namespace.as_str())
    }

    /// Check descriptor fields that the type system can't.
    pub fn validate(&self) -> RuntimeResult<()> {
        if self.name.trim().is_empty() {
            return Err(RuntimeError::InvalidManifest(
                "Mod name cannot be empty".to_string(),
            ));
        }

        validate_namespace(&self.namespace)?;

        for dep in &self.dependencies {
            if dep.namespace.is_empty() {
                return Err(RuntimeError::InvalidManifest(format!(
                    "Mod '{}' declares a {} dependency with an empty namespace",
                    self.namespace, dep.kind
                )));
            }
            if dep.kind == DependencyKind::Incompatible && dep.namespace == self.namespace {
                return Err(RuntimeError::InvalidManifest(format!(
                    "Mod '{}' declares itself incompatible",
                    self.namespace
                )));
            }
        }

        Ok(())
    }

    /// Check that the host API can run this mod.
    pub fn check_api(&self, host: &Version) -> RuntimeResult<()> {
        if self.api_version.is_compatible_with(host) {
            Ok(())
        } else {
            Err(RuntimeError::IncompatibleApi {
                namespace: self.namespace.clone(),
                requested: self.api_version.to_string(),
                provided: host.to_string(),
            })
        }
    }
}

/// Check a namespace against the naming rules.
pub fn validate_namespace(namespace: &str) -> RuntimeResult<()> {
    let invalid = |reason: &str| {
        Err(RuntimeError::InvalidNamespace {
            namespace: namespace.to_string(),
            reason: reason.to_string(),
        })
    };

    if namespace.is_empty() {
        return invalid("namespace cannot be empty");
    }
    if namespace.len() > MAX_NAMESPACE_LEN {
        return invalid("namespace is longer than 32 characters");
    }
    if !namespace
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return invalid("only lowercase letters, digits and '_' are allowed");
    }
    if RESERVED_NAMESPACES.contains(&namespace) {
        return invalid("namespace is reserved for the host");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse_and_display() {
        let version: Version = "1.12.3".parse().unwrap();
        assert_eq!(version, Version::new(1, 12, 3));
        assert_eq!(version.to_string(), "1.12.3");

        assert!("1.2".parse::<Version>().is_err());
        assert!("1.x.0".parse::<Version>().is_err());
    }

    #[test]
    fn test_api_compatibility() {
        let host = Version::new(1, 2, 0);
        assert!(Version::new(1, 0, 5).is_compatible_with(&host));
        assert!(Version::new(1, 2, 9).is_compatible_with(&host));
        assert!(!Version::new(1, 3, 0).is_compatible_with(&host));
        assert!(!Version::new(2, 0, 0).is_compatible_with(&host));
    }

    #[test]
    fn test_namespace_rules() {
        assert!(validate_namespace("better_tiles_2").is_ok());
        assert!(validate_namespace("").is_err());
        assert!(validate_namespace("Better").is_err());
        assert!(validate_namespace("with-dash").is_err());
        assert!(validate_namespace("core").is_err());
        assert!(validate_namespace(&"a".repeat(33)).is_err());
    }

    #[test]
    fn test_check_api_reports_namespace() {
        let descriptor = ModDescriptor::new("Future", "future", Version::new(0, 1, 0))
            .with_api_version(Version::new(2, 0, 0));

        match descriptor.check_api(&API_VERSION) {
            Err(RuntimeError::IncompatibleApi { namespace, .. }) => assert_eq!(namespace, "future"),
            other => panic!("expected IncompatibleApi, got {:?}", other),
        }
    }

    #[test]
    fn test_required_dependencies() {
        let descriptor = ModDescriptor::new("A", "a", Version::new(1, 0, 0))
            .with_dependency("b", DependencyKind::Required)
            .with_dependency("c", DependencyKind::Optional)
            .with_dependency("d", DependencyKind::Required);

        let required: Vec<_> = descriptor.required_dependencies().collect();
        assert_eq!(required, vec!["b", "d"]);
    }

    #[test]
    fn test_incompatible_kind() {
        let kind: DependencyKind = serde_json::from_str(r#""conflict""#).unwrap();
        assert_eq!(kind, DependencyKind::Incompatible);

        let descriptor = ModDescriptor::new("Dark", "dark", Version::new(1, 0, 0))
            .with_dependency("light", DependencyKind::Incompatible)
            .with_dependency("base_pack", DependencyKind::Required);
        assert_eq!(descriptor.incompatibilities().collect::<Vec<_>>(), vec!["light"]);
        assert!(descriptor.validate().is_ok());

        let selfish = ModDescriptor::new("Dark", "dark", Version::new(1, 0, 0))
            .with_dependency("dark", DependencyKind::Incompatible);
        assert!(selfish.validate().is_err());
    }
}
