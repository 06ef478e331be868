//! Schema Migrations
//!
//! Versioned upgrade/downgrade pipeline for serialized timeline objects.
//!
//! Every serialized object carries a schema label such as `Clip.2`. When a
//! document written by an older release is read, each object's field
//! dictionary is walked forward through the registered upgrade functions
//! until it matches the current version. When writing for an older release,
//! the walk goes backward through the downgrade functions.
//!
//! ## Features
//!
//! - **Explicit registry**: current versions and migration functions live in a
//!   [`SchemaRegistry`] value, not in global state
//! - **Step-wise walks**: one function per version step, applied strictly in order
//! - **Gap handling**: missing steps pass through, or fail in strict mode
//! - **Declarative ops**: renames, defaults and removals as data via [`FieldOp`]
//! - **Manifests & releases**: JSON/TOML manifests and named release targets
//!
//! ## Example
//!
//! ```
//! use schema_migrations::{MigrationFn, Migrator, SchemaRegistry};
//! use serde_json::json;
//!
//! let mut registry = SchemaRegistry::new();
//! registry.register_schema("Widget", 2).unwrap();
//! registry
//!     .register_upgrade("Widget", 2, MigrationFn::infallible(|mut fields| {
//!         if let Some(color) = fields.remove("color") {
//!             fields.insert("hue".to_string(), color);
//!         }
//!         fields
//!     }))
//!     .unwrap();
//!
//! let fields = json!({"color": "red"}).as_object().cloned().unwrap();
//! let (fields, _) = Migrator::new(&registry)
//!     .upgrade_to_current("Widget", fields, 1)
//!     .unwrap();
//! assert_eq!(fields["hue"], "red");
//! ```

pub mod config;
pub mod dictionary;
pub mod document;
pub mod error;
pub mod manifest;
pub mod migrate;
pub mod ops;
pub mod registry;
pub mod version;

pub use config::MigrationConfig;
pub use dictionary::{FieldDictionary, MigrationFn};
pub use document::{DocumentMigrator, DocumentOptions, DocumentReport};
pub use error::{BoxError, MigrationError, Result};
pub use manifest::MigrationManifest;
pub use migrate::{MigrationReport, Migrator};
pub use ops::{FieldOp, FieldOpError};
pub use registry::{DuplicatePolicy, RegistryOptions, SchemaRegistry};
pub use version::{Direction, SchemaLabel, VersionTargets};
