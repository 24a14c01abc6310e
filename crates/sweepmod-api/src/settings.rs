//! Per-namespace, schema-validated settings.
//!
//! A mod registers a schema during `initialize`; every key then has a typed
//! default and, once someone sets it, an explicit value. Registering again
//! (as happens on every reload) keeps explicit values for keys whose type is
//! unchanged, so user customizations survive hot reloads while untouched keys
//! pick up new defaults.

use crate::error::{HostError, HostResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, warn};

/// Value category of a setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingType {
    Boolean,
    Number,
    String,
}

impl SettingType {
    /// Category of a JSON value, if it has one.
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(_) => Some(SettingType::Boolean),
            Value::Number(_) => Some(SettingType::Number),
            Value::String(_) => Some(SettingType::String),
            _ => None,
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        Self::of(value) == Some(*self)
    }
}

impl fmt::Display for SettingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SettingType::Boolean => "boolean",
            SettingType::Number => "number",
            SettingType::String => "string",
        };
        f.write_str(s)
    }
}

/// Who may change a setting at runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingAccess {
    /// Freely editable.
    #[default]
    User,
    /// Editable, but changes are logged as unusual.
    Framework,
    /// Read-only after registration.
    Core,
}

/// Declaration of a single setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingSpec {
    pub default: Value,

    #[serde(default)]
    pub description: String,

    #[serde(rename = "type")]
    pub value_type: SettingType,

    #[serde(default)]
    pub access: SettingAccess,
}

impl SettingSpec {
    pub fn new(default: impl Into<Value>, value_type: SettingType) -> Self {
        Self {
            default: default.into(),
            description: String::new(),
            value_type,
            access: SettingAccess::User,
        }
    }

    pub fn boolean(default: bool) -> Self {
        Self::new(default, SettingType::Boolean)
    }

    pub fn number(default: f64) -> Self {
        Self::new(default, SettingType::Number)
    }

    pub fn string(default: impl Into<String>) -> Self {
        Self::new(default.into(), SettingType::String)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_access(mut self, access: SettingAccess) -> Self {
        self.access = access;
        self
    }
}

/// Settings schema for one namespace, keyed by setting name.
pub type SettingsSchema = BTreeMap<String, SettingSpec>;

#[derive(Debug, Clone)]
struct Setting {
    spec: SettingSpec,
    /// Explicitly set value; `None` follows the default.
    value: Option<Value>,
}

impl Setting {
    fn current(&self) -> &Value {
        self.value.as_ref().unwrap_or(&self.spec.default)
    }
}

/// Store of all namespaces' settings.
#[derive(Debug, Default)]
pub struct SettingsStore {
    namespaces: RwLock<HashMap<String, BTreeMap<String, Setting>>>,
}

impl SettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the schema for a namespace.
    ///
    /// Keys present in both the old and new schema with the same type keep
    /// an explicitly set value; every other key follows its new default.
    pub fn register_schema(&self, namespace: &str, schema: SettingsSchema) -> HostResult<()> {
        for (key, spec) in &schema {
            if !spec.value_type.matches(&spec.default) {
                return Err(type_mismatch(namespace, key, spec.value_type, &spec.default));
            }
        }

        let mut namespaces = self.namespaces.write();
        let previous = namespaces.remove(namespace).unwrap_or_default();
        let mut preserved = 0;

        let settings = schema
            .into_iter()
            .map(|(key, spec)| {
                let value = match previous.get(&key) {
                    Some(Setting {
                        spec: old,
                        value: Some(value),
                    }) if old.value_type == spec.value_type => {
                        preserved += 1;
                        Some(value.clone())
                    }
                    _ => None,
                };
                (key, Setting { spec, value })
            })
            .collect::<BTreeMap<_, _>>();

        debug!(
            "Registered {} settings for {} ({} values preserved)",
            settings.len(),
            namespace,
            preserved
        );
        namespaces.insert(namespace.to_string(), settings);
        Ok(())
    }

    /// Current value of a setting.
    pub fn get(&self, namespace: &str, key: &str) -> HostResult<Value> {
        let namespaces = self.namespaces.read();
        namespaces
            .get(namespace)
            .and_then(|settings| settings.get(key))
            .map(|setting| setting.current().clone())
            .ok_or_else(|| unknown(namespace, key))
    }

    /// Whether a setting holds an explicitly set value.
    pub fn is_set(&self, namespace: &str, key: &str) -> bool {
        self.namespaces
            .read()
            .get(namespace)
            .and_then(|settings| settings.get(key))
            .is_some_and(|setting| setting.value.is_some())
    }

    /// Change a setting, checking access and type.
    pub fn set(&self, namespace: &str, key: &str, value: Value) -> HostResult<()> {
        let mut namespaces = self.namespaces.write();
        let setting = namespaces
            .get_mut(namespace)
            .and_then(|settings| settings.get_mut(key))
            .ok_or_else(|| unknown(namespace, key))?;

        check_value(namespace, key, &setting.spec, &value)?;
        apply(namespace, key, setting, value);
        Ok(())
    }

    /// Every problem `values` would hit if written to `namespace`.
    ///
    /// An empty list means [`set_values`](Self::set_values) will succeed.
    pub fn validate_values(&self, namespace: &str, values: &BTreeMap<String, Value>) -> Vec<HostError> {
        let namespaces = self.namespaces.read();
        issues(namespaces.get(namespace), namespace, values)
    }

    /// Change several settings of one namespace at once.
    ///
    /// Either every value is written or, when any of them fails validation,
    /// none is and the first problem is returned.
    pub fn set_values(&self, namespace: &str, values: BTreeMap<String, Value>) -> HostResult<()> {
        let mut namespaces = self.namespaces.write();
        if let Some(issue) = issues(namespaces.get(namespace), namespace, &values)
            .into_iter()
            .next()
        {
            return Err(issue);
        }

        if let Some(settings) = namespaces.get_mut(namespace) {
            for (key, value) in values {
                if let Some(setting) = settings.get_mut(&key) {
                    apply(namespace, &key, setting, value);
                }
            }
        }
        Ok(())
    }

    /// Put one setting back to its default.
    pub fn reset(&self, namespace: &str, key: &str) -> HostResult<()> {
        let mut namespaces = self.namespaces.write();
        let setting = namespaces
            .get_mut(namespace)
            .and_then(|settings| settings.get_mut(key))
            .ok_or_else(|| unknown(namespace, key))?;
        setting.value = None;
        Ok(())
    }

    /// Put every setting of a namespace back to its default.
    pub fn reset_namespace(&self, namespace: &str) -> HostResult<()> {
        let mut namespaces = self.namespaces.write();
        let settings = namespaces
            .get_mut(namespace)
            .ok_or_else(|| unknown(namespace, "*"))?;
        for setting in settings.values_mut() {
            setting.value = None;
        }
        Ok(())
    }

    /// Snapshot of a namespace's current values.
    pub fn values(&self, namespace: &str) -> HostResult<BTreeMap<String, Value>> {
        let namespaces = self.namespaces.read();
        let settings = namespaces
            .get(namespace)
            .ok_or_else(|| unknown(namespace, "*"))?;
        Ok(settings
            .iter()
            .map(|(key, setting)| (key.clone(), setting.current().clone()))
            .collect())
    }

    /// Declared spec of a setting.
    pub fn spec(&self, namespace: &str, key: &str) -> HostResult<SettingSpec> {
        let namespaces = self.namespaces.read();
        namespaces
            .get(namespace)
            .and_then(|settings| settings.get(key))
            .map(|setting| setting.spec.clone())
            .ok_or_else(|| unknown(namespace, key))
    }

    pub fn has_schema(&self, namespace: &str) -> bool {
        self.namespaces.read().contains_key(namespace)
    }

    /// Drop a namespace's schema and values entirely.
    pub fn remove_namespace(&self, namespace: &str) -> bool {
        self.namespaces.write().remove(namespace).is_some()
    }

    /// Namespaces with a registered schema, sorted.
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.namespaces.read().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Access and type check for writing `value` to a setting declared as `spec`.
fn check_value(namespace: &str, key: &str, spec: &SettingSpec, value: &Value) -> HostResult<()> {
    if spec.access == SettingAccess::Core {
        return Err(HostError::ReadOnlySetting {
            namespace: namespace.to_string(),
            key: key.to_string(),
        });
    }
    if !spec.value_type.matches(value) {
        return Err(type_mismatch(namespace, key, spec.value_type, value));
    }
    Ok(())
}

fn issues(
    settings: Option<&BTreeMap<String, Setting>>,
    namespace: &str,
    values: &BTreeMap<String, Value>,
) -> Vec<HostError> {
    values
        .iter()
        .filter_map(|(key, value)| {
            match settings.and_then(|settings| settings.get(key)) {
                Some(setting) => check_value(namespace, key, &setting.spec, value).err(),
                None => Some(unknown(namespace, key)),
            }
        })
        .collect()
}

fn apply(namespace: &str, key: &str, setting: &mut Setting, value: Value) {
    if setting.spec.access == SettingAccess::Framework {
        warn!("Modifying framework setting {}.{}", namespace, key);
    }
    setting.value = Some(value);
}

fn unknown(namespace: &str, key: &str) -> HostError {
    HostError::UnknownSetting {
        namespace: namespace.to_string(),
        key: key.to_string(),
    }
}

fn type_mismatch(namespace: &str, key: &str, expected: SettingType, value: &Value) -> HostError {
    let found = match SettingType::of(value) {
        Some(kind) => kind.to_string(),
        None if value.is_null() => "null".to_string(),
        None if value.is_array() => "array".to_string(),
        None => "object".to_string(),
    };
    HostError::TypeMismatch {
        namespace: namespace.to_string(),
        key: key.to_string(),
        expected,
        found,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema(entries: Vec<(&str, SettingSpec)>) -> SettingsSchema {
        entries
            .into_iter()
            .map(|(key, spec)| (key.to_string(), spec))
            .collect()
    }

    #[test]
    fn test_defaults_and_set() {
        let store = SettingsStore::new();
        store
            .register_schema(
                "neon",
                schema(vec![
                    ("glow", SettingSpec::boolean(true).with_description("Glow effect")),
                    ("speed", SettingSpec::number(1.5)),
                ]),
            )
            .unwrap();

        assert_eq!(store.get("neon", "glow").unwrap(), json!(true));
        store.set("neon", "speed", json!(3)).unwrap();
        assert_eq!(store.get("neon", "speed").unwrap(), json!(3));
    }

    #[test]
    fn test_unknown_setting() {
        let store = SettingsStore::new();
        assert!(matches!(
            store.get("nobody", "x"),
            Err(HostError::UnknownSetting { .. })
        ));

        store
            .register_schema("neon", schema(vec![("glow", SettingSpec::boolean(true))]))
            .unwrap();
        assert!(matches!(
            store.set("neon", "missing", json!(1)),
            Err(HostError::UnknownSetting { .. })
        ));
    }

    #[test]
    fn test_type_mismatch() {
        let store = SettingsStore::new();
        store
            .register_schema("neon", schema(vec![("glow", SettingSpec::boolean(true))]))
            .unwrap();

        let err = store.set("neon", "glow", json!("yes")).unwrap_err();
        assert_eq!(
            err,
            HostError::TypeMismatch {
                namespace: "neon".to_string(),
                key: "glow".to_string(),
                expected: SettingType::Boolean,
                found: "string".to_string(),
            }
        );
        assert_eq!(store.get("neon", "glow").unwrap(), json!(true));
    }

    #[test]
    fn test_default_must_match_type() {
        let store = SettingsStore::new();
        let bad = SettingSpec::new(json!(5), SettingType::String);
        assert!(matches!(
            store.register_schema("neon", schema(vec![("label", bad)])),
            Err(HostError::TypeMismatch { .. })
        ));
        assert!(!store.has_schema("neon"));
    }

    #[test]
    fn test_reregister_preserves_compatible_values() {
        let store = SettingsStore::new();
        store
            .register_schema(
                "neon",
                schema(vec![
                    ("glow", SettingSpec::boolean(true)),
                    ("mode", SettingSpec::string("soft")),
                    ("old", SettingSpec::number(1.0)),
                ]),
            )
            .unwrap();
        store.set("neon", "glow", json!(false)).unwrap();
        store.set("neon", "mode", json!("harsh")).unwrap();

        store
            .register_schema(
                "neon",
                schema(vec![
                    ("glow", SettingSpec::boolean(true)),
                    ("mode", SettingSpec::number(2.0)),
                    ("fresh", SettingSpec::string("new")),
                ]),
            )
            .unwrap();

        assert_eq!(store.get("neon", "glow").unwrap(), json!(false));
        assert_eq!(store.get("neon", "mode").unwrap(), json!(2.0));
        assert_eq!(store.get("neon", "fresh").unwrap(), json!("new"));
        assert!(store.get("neon", "old").is_err());
    }

    #[test]
    fn test_access_levels() {
        let store = SettingsStore::new();
        store
            .register_schema(
                "neon",
                schema(vec![
                    ("locked", SettingSpec::boolean(true).with_access(SettingAccess::Core)),
                    ("tuned", SettingSpec::number(1.0).with_access(SettingAccess::Framework)),
                ]),
            )
            .unwrap();

        assert!(matches!(
            store.set("neon", "locked", json!(false)),
            Err(HostError::ReadOnlySetting { .. })
        ));
        store.set("neon", "tuned", json!(4)).unwrap();
        assert_eq!(store.get("neon", "tuned").unwrap(), json!(4));
    }

    #[test]
    fn test_reset() {
        let store = SettingsStore::new();
        store
            .register_schema(
                "neon",
                schema(vec![
                    ("glow", SettingSpec::boolean(true)),
                    ("speed", SettingSpec::number(1.0)),
                ]),
            )
            .unwrap();
        store.set("neon", "glow", json!(false)).unwrap();
        store.set("neon", "speed", json!(9)).unwrap();

        store.reset("neon", "glow").unwrap();
        assert_eq!(store.get("neon", "glow").unwrap(), json!(true));

        store.reset_namespace("neon").unwrap();
        let values = store.values("neon").unwrap();
        assert_eq!(values["speed"], json!(1.0));
    }

    #[test]
    fn test_schema_deserializes() {
        let parsed: SettingsSchema = serde_json::from_value(json!({
            "volume": { "default": 0.8, "type": "number", "description": "Master volume" },
            "muted": { "default": false, "type": "boolean", "access": "framework" }
        }))
        .unwrap();

        assert_eq!(parsed["volume"].value_type, SettingType::Number);
        assert_eq!(parsed["muted"].access, SettingAccess::Framework);
    }

    #[test]
    fn test_reregister_applies_new_default_to_untouched_keys() {
        let store = SettingsStore::new();
        store
            .register_schema(
                "audio",
                schema(vec![
                    ("volume", SettingSpec::number(0.5)),
                    ("pitch", SettingSpec::number(1.0)),
                ]),
            )
            .unwrap();
        store.set("audio", "pitch", json!(1.5)).unwrap();
        assert!(!store.is_set("audio", "volume"));

        store
            .register_schema(
                "audio",
                schema(vec![
                    ("volume", SettingSpec::number(0.8)),
                    ("pitch", SettingSpec::number(2.0)),
                ]),
            )
            .unwrap();

        assert_eq!(store.get("audio", "volume").unwrap(), json!(0.8));
        assert_eq!(store.get("audio", "pitch").unwrap(), json!(1.5));
        assert!(store.is_set("audio", "pitch"));
    }

    #[test]
    fn test_reset_follows_later_defaults() {
        let store = SettingsStore::new();
        store
            .register_schema("audio", schema(vec![("volume", SettingSpec::number(0.5))]))
            .unwrap();
        store.set("audio", "volume", json!(0.1)).unwrap();
        store.reset("audio", "volume").unwrap();

        store
            .register_schema("audio", schema(vec![("volume", SettingSpec::number(0.9))]))
            .unwrap();
        assert_eq!(store.get("audio", "volume").unwrap(), json!(0.9));
    }

    #[test]
    fn test_set_values_is_all_or_nothing() {
        let store = SettingsStore::new();
        store
            .register_schema(
                "neon",
                schema(vec![
                    ("glow", SettingSpec::boolean(true)),
                    ("speed", SettingSpec::number(1.0)),
                    ("locked", SettingSpec::string("yes").with_access(SettingAccess::Core)),
                ]),
            )
            .unwrap();

        let bad: BTreeMap<String, Value> = [
            ("glow".to_string(), json!(false)),
            ("speed".to_string(), json!("fast")),
            ("locked".to_string(), json!("no")),
            ("ghost".to_string(), json!(1)),
        ]
        .into_iter()
        .collect();

        let issues = store.validate_values("neon", &bad);
        assert_eq!(issues.len(), 3);
        assert!(issues
            .iter()
            .any(|e| matches!(e, HostError::UnknownSetting { key, .. } if key == "ghost")));
        assert!(issues.iter().any(|e| matches!(e, HostError::ReadOnlySetting { .. })));
        assert!(issues.iter().any(|e| matches!(e, HostError::TypeMismatch { .. })));

        assert!(store.set_values("neon", bad).is_err());
        assert_eq!(store.get("neon", "glow").unwrap(), json!(true));

        let good: BTreeMap<String, Value> = [
            ("glow".to_string(), json!(false)),
            ("speed".to_string(), json!(4)),
        ]
        .into_iter()
        .collect();
        assert!(store.validate_values("neon", &good).is_empty());
        store.set_values("neon", good).unwrap();
        assert_eq!(store.get("neon", "glow").unwrap(), json!(false));
        assert_eq!(store.get("neon", "speed").unwrap(), json!(4));
    }

    #[test]
    fn test_validate_values_unknown_namespace() {
        let store = SettingsStore::new();
        let values: BTreeMap<String, Value> = [("x".to_string(), json!(1))].into_iter().collect();
        assert_eq!(
            store.validate_values("nobody", &values),
            vec![HostError::UnknownSetting {
                namespace: "nobody".to_string(),
                key: "x".to_string(),
            }]
        );
    }
}
