//! Document-level migration
//!
//! Applies the pipeline to every schema-tagged object in a JSON tree. An object
//! is tagged when it carries a `Name.N` label under the schema key. Children are
//! migrated before their parent, so a parent's functions always see children
//! that are already in their final shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::dictionary::FieldDictionary;
use crate::error::{MigrationError, Result};
use crate::migrate::{MigrationReport, Migrator};
use crate::registry::SchemaRegistry;
use crate::version::{SchemaLabel, VersionTargets};

/// Default key holding an object's schema label
pub const DEFAULT_SCHEMA_KEY: &str = "OTIO_SCHEMA";

/// How documents are read and written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentOptions {
    /// Field that holds the `Name.N` label
    #[serde(default = "default_schema_key")]
    pub schema_key: String,

    /// Pass objects of undeclared schemas through instead of failing
    #[serde(default)]
    pub allow_unknown_schemas: bool,
}

fn default_schema_key() -> String {
    DEFAULT_SCHEMA_KEY.to_string()
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            schema_key: default_schema_key(),
            allow_unknown_schemas: false,
        }
    }
}

/// Summary of a document migration
#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentReport {
    /// Tagged objects visited
    pub objects_seen: usize,
    /// One entry per object that actually changed version
    pub migrations: Vec<MigrationReport>,
    /// Labels of objects whose schema was not declared
    pub unknown: Vec<String>,
}

#[derive(Clone, Copy)]
enum Mode<'t> {
    Upgrade,
    Downgrade(&'t VersionTargets),
}

/// Reads and writes documents through a registry
#[derive(Debug, Clone)]
pub struct DocumentMigrator<'a> {
    migrator: Migrator<'a>,
    options: DocumentOptions,
}

impl<'a> DocumentMigrator<'a> {
    pub fn new(registry: &'a SchemaRegistry, options: DocumentOptions) -> Self {
        Self {
            migrator: Migrator::new(registry),
            options,
        }
    }

    pub fn options(&self) -> &DocumentOptions {
        &self.options
    }

    /// Bring every tagged object up to its schema's current version
    pub fn upgrade_value(&self, value: Value) -> Result<(Value, DocumentReport)> {
        let mut report = DocumentReport::default();
        let value = self.visit(value, Mode::Upgrade, &mut report)?;
        Ok((value, report))
    }

    /// Downgrade the tagged objects whose schema appears in `targets`
    pub fn downgrade_value(
        &self,
        value: Value,
        targets: &VersionTargets,
    ) -> Result<(Value, DocumentReport)> {
        let mut report = DocumentReport::default();
        let value = self.visit(value, Mode::Downgrade(targets), &mut report)?;
        Ok((value, report))
    }

    /// Downgrade to the schema versions of a named release
    pub fn downgrade_to_release(&self, value: Value, release: &str) -> Result<(Value, DocumentReport)> {
        let targets = self.migrator.registry().release_targets(release)?;
        self.downgrade_value(value, targets)
    }

    /// Parse a JSON document and upgrade it
    pub fn read_str(&self, input: &str) -> Result<(Value, DocumentReport)> {
        let value: Value = serde_json::from_str(input)?;
        self.upgrade_value(value)
    }

    /// Downgrade a document and print it.
    ///
    /// A negative `indent` gives compact output.
    pub fn write_string(&self, value: Value, targets: &VersionTargets, indent: i32) -> Result<String> {
        let (value, _) = self.downgrade_value(value, targets)?;
        to_json_string(&value, indent)
    }

    /// Upgrade several documents; each succeeds or fails on its own
    pub fn upgrade_batch(&self, documents: Vec<Value>) -> Vec<Result<(Value, DocumentReport)>> {
        documents
            .into_iter()
            .enumerate()
            .map(|(index, doc)| {
                self.upgrade_value(doc).inspect_err(|err| {
                    warn!(index, error = %err, "Document upgrade failed");
                })
            })
            .collect()
    }

    /// Downgrade several documents; each succeeds or fails on its own
    pub fn downgrade_batch(
        &self,
        documents: Vec<Value>,
        targets: &VersionTargets,
    ) -> Vec<Result<(Value, DocumentReport)>> {
        documents
            .into_iter()
            .enumerate()
            .map(|(index, doc)| {
                self.downgrade_value(doc, targets).inspect_err(|err| {
                    warn!(index, error = %err, "Document downgrade failed");
                })
            })
            .collect()
    }

    /// Labels of all tagged objects, parents before children
    pub fn labels(&self, value: &Value) -> Result<Vec<SchemaLabel>> {
        let mut labels = Vec::new();
        self.collect_labels(value, &mut labels)?;
        Ok(labels)
    }

    fn collect_labels(&self, value: &Value, labels: &mut Vec<SchemaLabel>) -> Result<()> {
        match value {
            Value::Object(map) => {
                if let Some(Value::String(label)) = map.get(&self.options.schema_key) {
                    labels.push(SchemaLabel::parse(label)?);
                }
                for child in map.values() {
                    self.collect_labels(child, labels)?;
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.collect_labels(item, labels)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn visit(&self, value: Value, mode: Mode<'_>, report: &mut DocumentReport) -> Result<Value> {
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| self.visit(item, mode, report))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut fields = FieldDictionary::new();
                for (key, child) in map {
                    fields.insert(key, self.visit(child, mode, report)?);
                }
                self.migrate_object(fields, mode, report).map(Value::Object)
            }
            other => Ok(other),
        }
    }

    fn migrate_object(
        &self,
        mut fields: FieldDictionary,
        mode: Mode<'_>,
        report: &mut DocumentReport,
    ) -> Result<FieldDictionary> {
        let key = &self.options.schema_key;
        let label = match fields.get(key) {
            Some(Value::String(label)) => SchemaLabel::parse(label)?,
            _ => return Ok(fields),
        };
        report.objects_seen += 1;

        let registry = self.migrator.registry();
        let current = match registry.current_version(&label.name) {
            Ok(current) => current,
            Err(MigrationError::UnknownSchema { .. }) if self.options.allow_unknown_schemas => {
                debug!(%label, "Passing through object of unknown schema");
                report.unknown.push(label.to_string());
                return Ok(fields);
            }
            Err(err) => return Err(err),
        };

        if label.version > current {
            return Err(MigrationError::UnsupportedVersion {
                schema: label.name,
                version: label.version,
                current,
            });
        }

        let target = match mode {
            Mode::Upgrade => current,
            Mode::Downgrade(targets) => {
                let Some(&target) = targets.get(&label.name) else {
                    return Ok(fields);
                };
                if target > current {
                    return Err(MigrationError::DowngradeNotPossible {
                        schema: label.name,
                        from: current,
                        to: target,
                        reason: "target is newer than the current version".to_string(),
                    });
                }
                target.min(label.version)
            }
        };

        if target == label.version {
            return Ok(fields);
        }

        fields.remove(key);
        let (mut fields, migration) =
            self.migrator
                .migrate(&label.name, fields, label.version, target)?;
        fields.insert(key.clone(), Value::String(label.with_version(target).to_string()));
        report.migrations.push(migration);
        Ok(fields)
    }
}

/// Print JSON with `indent` spaces per level, or compactly when negative
pub fn to_json_string(value: &Value, indent: i32) -> Result<String> {
    let Ok(width) = usize::try_from(indent) else {
        return Ok(serde_json::to_string(value)?);
    };

    let indent = vec![b' '; width];
    let formatter = serde_json::ser::PrettyFormatter::with_indent(&indent);
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    String::from_utf8(out)
        .map_err(|e| MigrationError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}
