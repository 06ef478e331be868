//! Configuration management for schema migration
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (schema-migrate.toml)
//! - Environment variables (SCHEMA_MIGRATE__*)
//!
//! ## Example config file (schema-migrate.toml):
//! ```toml
//! [registry]
//! duplicate_policy = "warn"
//! strict_gaps = false
//!
//! [document]
//! schema_key = "OTIO_SCHEMA"
//! allow_unknown_schemas = true
//! indent = 4
//!
//! [manifests]
//! paths = ["schemas/timeline.toml", "plugins/effects.json"]
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::document::{DocumentOptions, DEFAULT_SCHEMA_KEY};
use crate::registry::{DuplicatePolicy, RegistryOptions};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Registry settings
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Document read/write settings
    #[serde(default)]
    pub document: DocumentConfig,

    /// Manifests to load at startup
    #[serde(default)]
    pub manifests: ManifestConfig,
}

/// Registry configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Behaviour on duplicate registration
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,

    /// Fail on any version step without a registered function
    #[serde(default)]
    pub strict_gaps: bool,
}

/// Document configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentConfig {
    /// Field that holds each object's schema label
    #[serde(default = "default_schema_key")]
    pub schema_key: String,

    /// Pass objects of undeclared schemas through untouched
    #[serde(default)]
    pub allow_unknown_schemas: bool,

    /// JSON indentation when writing; negative for compact output
    #[serde(default = "default_indent")]
    pub indent: i32,
}

/// Manifest locations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestConfig {
    #[serde(default)]
    pub paths: Vec<PathBuf>,
}

fn default_schema_key() -> String {
    DEFAULT_SCHEMA_KEY.to_string()
}

fn default_indent() -> i32 {
    4
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            schema_key: default_schema_key(),
            allow_unknown_schemas: false,
            indent: default_indent(),
        }
    }
}

impl MigrationConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, adding a specific file on top of the defaults
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "schema-migrate.toml",
            ".schema-migrate.toml",
            "config/schema-migrate.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "timeline", "schema-migrate") {
            let xdg_config = config_dir.config_dir().join("schema-migrate.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // SCHEMA_MIGRATE__REGISTRY__STRICT_GAPS=true and friends
        builder = builder.add_source(
            Environment::with_prefix("SCHEMA_MIGRATE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            duplicate_policy: self.registry.duplicate_policy,
            strict_gaps: self.registry.strict_gaps,
        }
    }

    pub fn document_options(&self) -> DocumentOptions {
        DocumentOptions {
            schema_key: self.document.schema_key.clone(),
            allow_unknown_schemas: self.document.allow_unknown_schemas,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MigrationConfig::default();
        assert_eq!(config.registry.duplicate_policy, DuplicatePolicy::Overwrite);
        assert!(!config.registry.strict_gaps);
        assert_eq!(config.document.schema_key, "OTIO_SCHEMA");
        assert_eq!(config.document.indent, 4);
        assert!(config.manifests.paths.is_empty());
    }

    #[test]
    fn test_serialize_config() {
        let config = MigrationConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[registry]"));
        assert!(toml_str.contains("[document]"));
        assert!(toml_str.contains("duplicate_policy = \"overwrite\""));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[registry]\nduplicate_policy = \"reject\"\nstrict_gaps = true\n\n\
             [document]\nschema_key = \"kind\"\n\n\
             [manifests]\npaths = [\"a.json\"]\n",
        )
        .unwrap();

        let config = MigrationConfig::load_from(path.to_str()).unwrap();
        let options = config.registry_options();
        assert_eq!(options.duplicate_policy, DuplicatePolicy::Reject);
        assert!(options.strict_gaps);
        assert_eq!(config.document_options().schema_key, "kind");
        assert_eq!(config.document.indent, 4);
        assert_eq!(config.manifests.paths, vec![PathBuf::from("a.json")]);
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.toml");
        let mut config = MigrationConfig::default();
        config.document.allow_unknown_schemas = true;
        config.save(path.to_str().unwrap()).unwrap();

        let loaded = MigrationConfig::load_from(path.to_str()).unwrap();
        assert!(loaded.document.allow_unknown_schemas);
    }
}
