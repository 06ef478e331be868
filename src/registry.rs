//! Schema Registry
//!
//! Holds, per schema name, the current version and the versioned upgrade and
//! downgrade functions. Upgrades are keyed by the version they upgrade *to*,
//! downgrades by the version they downgrade *from*.
//!
//! The registry is populated once while schemas and plugins load, then shared
//! read-only (`&SchemaRegistry`) with every migration.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dictionary::MigrationFn;
use crate::error::{MigrationError, Result};
use crate::version::{Direction, VersionTargets};

/// What to do when a function is registered twice for the same slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Replace the earlier registration
    #[default]
    Overwrite,
    /// Replace the earlier registration and log a warning
    Warn,
    /// Fail with `DuplicateRegistration`
    Reject,
}

/// Registry-wide behaviour switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryOptions {
    pub duplicate_policy: DuplicatePolicy,
    /// Treat every missing step as an error, for all schemas
    pub strict_gaps: bool,
}

#[derive(Debug, Default)]
struct SchemaEntry {
    current: Option<u32>,
    upgrades: BTreeMap<u32, MigrationFn>,
    downgrades: BTreeMap<u32, MigrationFn>,
    strict: bool,
}

/// The table of current versions and migration functions
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, SchemaEntry>,
    releases: BTreeMap<String, VersionTargets>,
    options: RegistryOptions,
}

impl SchemaRegistry {
    /// Create an empty registry with default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry with the given options
    pub fn with_options(options: RegistryOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    /// Declare a schema and its current version
    pub fn register_schema(&mut self, name: impl Into<String>, current_version: u32) -> Result<()> {
        let name = name.into();
        if current_version == 0 {
            return Err(MigrationError::Configuration(format!(
                "schema {} cannot have current version 0",
                name
            )));
        }

        let policy = self.options.duplicate_policy;
        let entry = self.schemas.entry(name.clone()).or_default();
        match entry.current {
            Some(existing) if existing != current_version => match policy {
                DuplicatePolicy::Reject => {
                    return Err(MigrationError::Configuration(format!(
                        "schema {} already declared at version {}",
                        name, existing
                    )));
                }
                DuplicatePolicy::Warn => {
                    warn!(schema = %name, existing, current_version, "Redeclaring schema version");
                }
                DuplicatePolicy::Overwrite => {
                    debug!(schema = %name, existing, current_version, "Redeclaring schema version");
                }
            },
            _ => debug!(schema = %name, current_version, "Declared schema"),
        }
        entry.current = Some(current_version);
        Ok(())
    }

    /// Register the function that upgrades `name` from `to_version - 1` to `to_version`
    pub fn register_upgrade(
        &mut self,
        name: impl Into<String>,
        to_version: u32,
        f: MigrationFn,
    ) -> Result<()> {
        self.register_step(name.into(), Direction::Upgrade, to_version, f)
    }

    /// Register the function that downgrades `name` from `from_version` to `from_version - 1`
    pub fn register_downgrade(
        &mut self,
        name: impl Into<String>,
        from_version: u32,
        f: MigrationFn,
    ) -> Result<()> {
        self.register_step(name.into(), Direction::Downgrade, from_version, f)
    }

    fn register_step(
        &mut self,
        name: String,
        direction: Direction,
        version: u32,
        f: MigrationFn,
    ) -> Result<()> {
        if version <= 1 {
            let what = match direction {
                Direction::Upgrade => "upgrade to",
                Direction::Downgrade => "downgrade from",
            };
            return Err(MigrationError::Configuration(format!(
                "cannot register {} version {} for {}; versions start at 1",
                what, version, name
            )));
        }

        let policy = self.options.duplicate_policy;
        let entry = self.schemas.entry(name.clone()).or_default();
        let slots = match direction {
            Direction::Upgrade => &mut entry.upgrades,
            Direction::Downgrade => &mut entry.downgrades,
        };

        if slots.contains_key(&version) {
            match policy {
                DuplicatePolicy::Reject => {
                    return Err(MigrationError::DuplicateRegistration {
                        schema: name,
                        direction,
                        version,
                    });
                }
                DuplicatePolicy::Warn => {
                    warn!(schema = %name, %direction, version, "Replacing migration function");
                }
                DuplicatePolicy::Overwrite => {
                    debug!(schema = %name, %direction, version, "Replacing migration function");
                }
            }
        } else {
            debug!(schema = %name, %direction, version, "Registered migration function");
        }

        slots.insert(version, f);
        Ok(())
    }

    /// Current version of a declared schema
    pub fn current_version(&self, name: &str) -> Result<u32> {
        self.schemas
            .get(name)
            .and_then(|entry| entry.current)
            .ok_or_else(|| MigrationError::unknown_schema(name, self.declared_names()))
    }

    /// Whether `name` has been declared with a current version
    pub fn contains(&self, name: &str) -> bool {
        self.schemas.get(name).is_some_and(|entry| entry.current.is_some())
    }

    /// Upgrade function into `to_version`, if one is registered
    pub fn upgrade_fn(&self, name: &str, to_version: u32) -> Option<&MigrationFn> {
        self.schemas.get(name)?.upgrades.get(&to_version)
    }

    /// Downgrade function out of `from_version`, if one is registered
    pub fn downgrade_fn(&self, name: &str, from_version: u32) -> Option<&MigrationFn> {
        self.schemas.get(name)?.downgrades.get(&from_version)
    }

    /// Look up a step in either direction
    pub fn step_fn(&self, name: &str, direction: Direction, version: u32) -> Option<&MigrationFn> {
        match direction {
            Direction::Upgrade => self.upgrade_fn(name, version),
            Direction::Downgrade => self.downgrade_fn(name, version),
        }
    }

    /// Registered steps with versions in `low..=high`, ascending
    pub fn registered_steps(
        &self,
        name: &str,
        direction: Direction,
        low: u32,
        high: u32,
    ) -> Vec<(u32, &MigrationFn)> {
        let Some(entry) = self.schemas.get(name) else {
            return Vec::new();
        };
        if low > high {
            return Vec::new();
        }
        let slots = match direction {
            Direction::Upgrade => &entry.upgrades,
            Direction::Downgrade => &entry.downgrades,
        };
        slots.range(low..=high).map(|(version, f)| (*version, f)).collect()
    }

    /// Opt a schema into strict gap checking
    pub fn require_complete_chain(&mut self, name: impl Into<String>) {
        let name = name.into();
        debug!(schema = %name, "Strict gap checking enabled");
        self.schemas.entry(name).or_default().strict = true;
    }

    /// Whether a missing step for `name` is an error
    pub fn is_strict(&self, name: &str) -> bool {
        self.options.strict_gaps || self.schemas.get(name).is_some_and(|entry| entry.strict)
    }

    /// Current version of every declared schema
    pub fn type_version_map(&self) -> BTreeMap<String, u32> {
        self.schemas
            .iter()
            .filter_map(|(name, entry)| entry.current.map(|v| (name.clone(), v)))
            .collect()
    }

    /// Record the schema versions that make up a named release.
    ///
    /// A release registered twice is replaced.
    pub fn register_release(&mut self, label: impl Into<String>, targets: VersionTargets) -> Result<()> {
        let label = label.into();
        if let Some((schema, _)) = targets.iter().find(|(_, version)| **version == 0) {
            return Err(MigrationError::Configuration(format!(
                "release {} targets {} version 0",
                label, schema
            )));
        }
        debug!(release = %label, schemas = targets.len(), "Registered release");
        self.releases.insert(label, targets);
        Ok(())
    }

    /// Version targets of a named release
    pub fn release_targets(&self, label: &str) -> Result<&VersionTargets> {
        self.releases
            .get(label)
            .ok_or_else(|| MigrationError::UnknownRelease(label.to_string()))
    }

    /// All named releases
    pub fn releases(&self) -> &BTreeMap<String, VersionTargets> {
        &self.releases
    }

    /// Names of declared schemas, sorted
    pub fn schema_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.declared_names().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of declared schemas
    pub fn len(&self) -> usize {
        self.declared_names().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn declared_names(&self) -> impl Iterator<Item = &String> {
        self.schemas
            .iter()
            .filter(|(_, entry)| entry.current.is_some())
            .map(|(name, _)| name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::FieldDictionary;
    use serde_json::json;

    fn tag(value: &'static str) -> MigrationFn {
        MigrationFn::infallible(move |mut fields: FieldDictionary| {
            fields.insert("tag".to_string(), json!(value));
            fields
        })
    }

    #[test]
    fn test_current_version() {
        let mut registry = SchemaRegistry::new();
        registry.register_schema("Clip", 2).unwrap();
        assert_eq!(registry.current_version("Clip").unwrap(), 2);
        assert!(registry.contains("Clip"));
    }

    #[test]
    fn test_unknown_schema() {
        let mut registry = SchemaRegistry::new();
        registry.register_schema("Clip", 2).unwrap();
        let err = registry.current_version("Clipp").unwrap_err();
        assert!(matches!(err, MigrationError::UnknownSchema { ref name, .. } if name == "Clipp"));
    }

    #[test]
    fn test_migrations_alone_do_not_declare_schema() {
        let mut registry = SchemaRegistry::new();
        registry.register_upgrade("Clip", 2, tag("a")).unwrap();
        assert!(registry.current_version("Clip").is_err());
        assert!(registry.upgrade_fn("Clip", 2).is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_invalid_registration_versions() {
        let mut registry = SchemaRegistry::new();
        for version in [0, 1] {
            assert!(matches!(
                registry.register_upgrade("Clip", version, tag("a")),
                Err(MigrationError::Configuration(_))
            ));
            assert!(matches!(
                registry.register_downgrade("Clip", version, tag("a")),
                Err(MigrationError::Configuration(_))
            ));
        }
        assert!(matches!(
            registry.register_schema("Clip", 0),
            Err(MigrationError::Configuration(_))
        ));
    }

    #[test]
    fn test_absent_lookup_is_none() {
        let mut registry = SchemaRegistry::new();
        registry.register_upgrade("Clip", 3, tag("a")).unwrap();
        assert!(registry.upgrade_fn("Clip", 2).is_none());
        assert!(registry.downgrade_fn("Clip", 3).is_none());
        assert!(registry.upgrade_fn("Track", 3).is_none());
    }

    #[test]
    fn test_registered_steps_range() {
        let mut registry = SchemaRegistry::new();
        for version in [2, 5, 9] {
            registry.register_upgrade("Clip", version, tag("a")).unwrap();
        }
        let versions: Vec<u32> = registry
            .registered_steps("Clip", Direction::Upgrade, 3, 9)
            .into_iter()
            .map(|(version, _)| version)
            .collect();
        assert_eq!(versions, vec![5, 9]);
        assert!(registry.registered_steps("Clip", Direction::Downgrade, 1, 9).is_empty());
        assert!(registry.registered_steps("Clip", Direction::Upgrade, 9, 3).is_empty());
    }

    #[test]
    fn test_overwrite_keeps_latest() {
        let mut registry = SchemaRegistry::new();
        registry.register_upgrade("Clip", 2, tag("first")).unwrap();
        registry.register_upgrade("Clip", 2, tag("second")).unwrap();

        let out = registry
            .upgrade_fn("Clip", 2)
            .unwrap()
            .apply(FieldDictionary::new())
            .unwrap();
        assert_eq!(out.get("tag"), Some(&json!("second")));
    }

    #[test]
    fn test_reject_duplicates() {
        let mut registry = SchemaRegistry::with_options(RegistryOptions {
            duplicate_policy: DuplicatePolicy::Reject,
            strict_gaps: false,
        });
        registry.register_downgrade("Clip", 2, tag("first")).unwrap();
        let err = registry.register_downgrade("Clip", 2, tag("second")).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::DuplicateRegistration { direction: Direction::Downgrade, version: 2, .. }
        ));

        // Same slot in the other direction is a different registration
        registry.register_upgrade("Clip", 2, tag("up")).unwrap();

        registry.register_schema("Clip", 2).unwrap();
        registry.register_schema("Clip", 2).unwrap();
        assert!(registry.register_schema("Clip", 3).is_err());
    }

    #[test]
    fn test_strictness() {
        let mut registry = SchemaRegistry::new();
        registry.require_complete_chain("Clip");
        assert!(registry.is_strict("Clip"));
        assert!(!registry.is_strict("Track"));

        let strict = SchemaRegistry::with_options(RegistryOptions {
            strict_gaps: true,
            ..RegistryOptions::default()
        });
        assert!(strict.is_strict("Track"));
    }

    #[test]
    fn test_type_version_map_and_releases() {
        let mut registry = SchemaRegistry::new();
        registry.register_schema("Clip", 2).unwrap();
        registry.register_schema("Track", 1).unwrap();
        registry.register_upgrade("Marker", 2, tag("a")).unwrap();

        let map = registry.type_version_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map["Clip"], 2);
        assert_eq!(registry.schema_names(), vec!["Clip", "Track"]);

        let targets = VersionTargets::from([("Clip".to_string(), 1)]);
        registry.register_release("0.15", targets.clone()).unwrap();
        assert_eq!(registry.release_targets("0.15").unwrap(), &targets);
        assert!(matches!(
            registry.release_targets("0.14"),
            Err(MigrationError::UnknownRelease(_))
        ));

        let bad = VersionTargets::from([("Clip".to_string(), 0)]);
        assert!(registry.register_release("bad", bad).is_err());
    }
}
