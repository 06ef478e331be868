//! Migration manifests
//!
//! A manifest declares schemas, their current versions, declarative upgrade
//! and downgrade steps, and named releases. It can be written as JSON or TOML:
//!
//! ```toml
//! [schemas.Widget]
//! version = 3
//!
//! [[schemas.Widget.upgrades.2]]
//! op = "rename"
//! from = "color"
//! to = "hue"
//!
//! [[schemas.Widget.upgrades.3]]
//! op = "set_default"
//! field = "weight"
//! value = 0
//!
//! [releases."1.0"]
//! Widget = 2
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{MigrationError, Result};
use crate::ops::{self, FieldOp};
use crate::registry::SchemaRegistry;
use crate::version::VersionTargets;

/// Declarations for one schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaManifest {
    /// Current version
    pub version: u32,

    /// Fail on any step without a function
    #[serde(default)]
    pub strict: bool,

    /// Operations keyed by the version they upgrade to
    #[serde(default)]
    pub upgrades: BTreeMap<String, Vec<FieldOp>>,

    /// Operations keyed by the version they downgrade from
    #[serde(default)]
    pub downgrades: BTreeMap<String, Vec<FieldOp>>,
}

/// A set of schema declarations and releases
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationManifest {
    #[serde(default)]
    pub schemas: BTreeMap<String, SchemaManifest>,

    #[serde(default)]
    pub releases: BTreeMap<String, VersionTargets>,
}

impl MigrationManifest {
    /// Load from a `.toml` or `.json` file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            _ => Self::from_json_str(&content),
        }
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Register every declaration with `registry`
    pub fn apply(&self, registry: &mut SchemaRegistry) -> Result<()> {
        for (name, schema) in &self.schemas {
            registry.register_schema(name.clone(), schema.version)?;
            if schema.strict {
                registry.require_complete_chain(name.clone());
            }

            for (key, steps) in &schema.upgrades {
                let version = step_version(name, schema.version, key)?;
                registry.register_upgrade(name.clone(), version, ops::compile(steps.clone()))?;
            }
            for (key, steps) in &schema.downgrades {
                let version = step_version(name, schema.version, key)?;
                registry.register_downgrade(name.clone(), version, ops::compile(steps.clone()))?;
            }
        }

        for (label, targets) in &self.releases {
            registry.register_release(label.clone(), targets.clone())?;
        }

        info!(
            schemas = self.schemas.len(),
            releases = self.releases.len(),
            "Applied migration manifest"
        );
        Ok(())
    }
}

fn step_version(schema: &str, current: u32, key: &str) -> Result<u32> {
    let version: u32 = key.trim().parse().map_err(|_| {
        MigrationError::InvalidManifest(format!("{}: step key '{}' is not a version number", schema, key))
    })?;
    if version > current {
        return Err(MigrationError::InvalidManifest(format!(
            "{}: step for version {} is beyond current version {}",
            schema, version, current
        )));
    }
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::Migrator;
    use serde_json::{json, Value};

    const WIDGET_JSON: &str = r#"{
        "schemas": {
            "Widget": {
                "version": 3,
                "upgrades": {
                    "2": [{"op": "rename", "from": "color", "to": "hue"}],
                    "3": [{"op": "set_default", "field": "weight", "value": 0}]
                },
                "downgrades": {
                    "3": [{"op": "remove", "field": "weight"}],
                    "2": [{"op": "rename", "from": "hue", "to": "color"}]
                }
            }
        },
        "releases": {"1.0": {"Widget": 1}}
    }"#;

    const WIDGET_TOML: &str = r#"
        [schemas.Widget]
        version = 3

        [[schemas.Widget.upgrades.2]]
        op = "rename"
        from = "color"
        to = "hue"

        [[schemas.Widget.upgrades.3]]
        op = "set_default"
        field = "weight"
        value = 0

        [releases."1.0"]
        Widget = 2
    "#;

    fn widget_v1() -> crate::FieldDictionary {
        match json!({"color": "red"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_json_manifest_drives_migration() {
        let manifest = MigrationManifest::from_json_str(WIDGET_JSON).unwrap();
        let mut registry = SchemaRegistry::new();
        manifest.apply(&mut registry).unwrap();

        let migrator = Migrator::new(&registry);
        let (upgraded, _) = migrator.upgrade_to_current("Widget", widget_v1(), 1).unwrap();
        assert_eq!(Value::Object(upgraded.clone()), json!({"hue": "red", "weight": 0}));

        let target = registry.release_targets("1.0").unwrap()["Widget"];
        let (downgraded, report) = migrator.downgrade_from_current("Widget", upgraded, target).unwrap();
        assert_eq!(downgraded, widget_v1());
        assert_eq!(report.applied, vec![3, 2]);
    }

    #[test]
    fn test_toml_manifest() {
        let manifest = MigrationManifest::from_toml_str(WIDGET_TOML).unwrap();
        assert_eq!(manifest.schemas["Widget"].upgrades.len(), 2);
        assert_eq!(manifest.releases["1.0"]["Widget"], 2);

        let mut registry = SchemaRegistry::new();
        manifest.apply(&mut registry).unwrap();
        assert_eq!(registry.current_version("Widget").unwrap(), 3);
        assert!(registry.upgrade_fn("Widget", 3).is_some());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("widget.toml");
        std::fs::write(&path, WIDGET_TOML).unwrap();

        let manifest = MigrationManifest::load(&path).unwrap();
        assert!(manifest.schemas.contains_key("Widget"));
    }

    #[test]
    fn test_bad_step_keys() {
        let mut registry = SchemaRegistry::new();
        let manifest = MigrationManifest::from_json_str(
            r#"{"schemas": {"Clip": {"version": 2, "upgrades": {"two": []}}}}"#,
        )
        .unwrap();
        assert!(matches!(
            manifest.apply(&mut registry),
            Err(MigrationError::InvalidManifest(_))
        ));

        let manifest = MigrationManifest::from_json_str(
            r#"{"schemas": {"Clip": {"version": 2, "upgrades": {"5": []}}}}"#,
        )
        .unwrap();
        assert!(matches!(
            manifest.apply(&mut registry),
            Err(MigrationError::InvalidManifest(_))
        ));

        let manifest = MigrationManifest::from_json_str(
            r#"{"schemas": {"Clip": {"version": 2, "downgrades": {"1": []}}}}"#,
        )
        .unwrap();
        assert!(matches!(
            manifest.apply(&mut registry),
            Err(MigrationError::Configuration(_))
        ));
    }
}
