//! Schema labels, migration direction and version targets

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::MigrationError;

/// Per-schema output versions requested by a serializer (schema name -> version)
pub type VersionTargets = BTreeMap<String, u32>;

/// Which way a migration walks the version chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Older stored version into the current in-memory shape
    Upgrade,
    /// Current shape into an older wire version
    Downgrade,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upgrade => write!(f, "upgrade"),
            Direction::Downgrade => write!(f, "downgrade"),
        }
    }
}

fn label_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\.([0-9]+)$").expect("label pattern is valid")
    })
}

/// A schema name paired with a version, written as `Name.N` on the wire
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaLabel {
    pub name: String,
    pub version: u32,
}

impl SchemaLabel {
    /// Create a label. Fails on version 0.
    pub fn new(name: impl Into<String>, version: u32) -> Result<Self, MigrationError> {
        let name = name.into();
        if version == 0 {
            return Err(MigrationError::InvalidLabel(format!("{}.0", name)));
        }
        Ok(Self { name, version })
    }

    /// Parse a `Name.N` label
    pub fn parse(label: &str) -> Result<Self, MigrationError> {
        let captures = label_pattern()
            .captures(label)
            .ok_or_else(|| MigrationError::InvalidLabel(label.to_string()))?;

        let version: u32 = captures[2]
            .parse()
            .map_err(|_| MigrationError::InvalidLabel(label.to_string()))?;

        Self::new(&captures[1], version).map_err(|_| MigrationError::InvalidLabel(label.to_string()))
    }

    /// Same schema, different version
    pub fn with_version(&self, version: u32) -> Self {
        Self {
            name: self.name.clone(),
            version,
        }
    }
}

impl fmt::Display for SchemaLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.version)
    }
}

impl FromStr for SchemaLabel {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
