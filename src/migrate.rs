//! Migration Pipeline
//!
//! Walks a field dictionary from a source version to a target version one
//! step at a time. Upgrades apply the functions registered *to* each version in
//! ascending order; downgrades apply the functions registered *from* each
//! version in descending order. A step with no function passes the dictionary
//! through unchanged, unless the schema is strict.

use serde::Serialize;
use tracing::{debug, trace};

use crate::dictionary::{FieldDictionary, MigrationFn};
use crate::error::{MigrationError, Result};
use crate::registry::SchemaRegistry;
use crate::version::Direction;

/// What a single walk did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub schema: String,
    pub direction: Direction,
    pub from: u32,
    pub to: u32,
    /// Versions whose function was applied, in application order
    pub applied: Vec<u32>,
    /// Spans of versions with no registered function, as inclusive
    /// `(first, last)` pairs in walk order
    pub skipped: Vec<(u32, u32)>,
}

impl MigrationReport {
    fn new(schema: &str, direction: Direction, from: u32, to: u32) -> Self {
        Self {
            schema: schema.to_string(),
            direction,
            from,
            to,
            applied: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// True when source and target were the same version
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }

    /// Number of version steps walked
    pub fn steps(&self) -> u64 {
        let skipped: u64 = self
            .skipped
            .iter()
            .map(|&(first, last)| u64::from(first.abs_diff(last)) + 1)
            .sum();
        self.applied.len() as u64 + skipped
    }
}

/// Drives dictionaries through the functions of a registry
#[derive(Debug, Clone, Copy)]
pub struct Migrator<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> Migrator<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'a SchemaRegistry {
        self.registry
    }

    /// Move `fields` from version `from` to version `to`, in whichever direction is needed
    pub fn migrate(
        &self,
        schema: &str,
        fields: FieldDictionary,
        from: u32,
        to: u32,
    ) -> Result<(FieldDictionary, MigrationReport)> {
        if from > to {
            self.downgrade(schema, fields, from, to)
        } else {
            self.upgrade(schema, fields, from, to)
        }
    }

    /// Apply upgrade steps `from + 1 ..= to`
    pub fn upgrade(
        &self,
        schema: &str,
        fields: FieldDictionary,
        from: u32,
        to: u32,
    ) -> Result<(FieldDictionary, MigrationReport)> {
        if from == 0 || to == 0 {
            return Err(MigrationError::Configuration(format!(
                "cannot migrate {} between versions {} and {}; versions start at 1",
                schema, from, to
            )));
        }
        if from > to {
            return self.downgrade(schema, fields, from, to);
        }
        if from == to {
            return Ok((fields, MigrationReport::new(schema, Direction::Upgrade, from, to)));
        }

        self.walk(schema, fields, Direction::Upgrade, from, to)
    }

    /// Apply downgrade steps `from ..= to + 1`, newest first
    pub fn downgrade(
        &self,
        schema: &str,
        fields: FieldDictionary,
        from: u32,
        to: u32,
    ) -> Result<(FieldDictionary, MigrationReport)> {
        if to == 0 {
            return Err(not_possible(schema, from, to, "versions start at 1"));
        }
        if from == 0 {
            return Err(MigrationError::Configuration(format!(
                "cannot downgrade {} from version 0",
                schema
            )));
        }
        if from < to {
            return Err(not_possible(
                schema,
                from,
                to,
                "target is newer than the source version",
            ));
        }
        if from == to {
            return Ok((fields, MigrationReport::new(schema, Direction::Downgrade, from, to)));
        }

        self.walk(schema, fields, Direction::Downgrade, from, to)
    }

    /// Upgrade a dictionary stored at `stored` to the schema's current version
    pub fn upgrade_to_current(
        &self,
        schema: &str,
        fields: FieldDictionary,
        stored: u32,
    ) -> Result<(FieldDictionary, MigrationReport)> {
        let current = self.registry.current_version(schema)?;
        if stored > current {
            return Err(MigrationError::UnsupportedVersion {
                schema: schema.to_string(),
                version: stored,
                current,
            });
        }
        self.upgrade(schema, fields, stored, current)
    }

    /// Downgrade a dictionary in the schema's current shape to `target`
    pub fn downgrade_from_current(
        &self,
        schema: &str,
        fields: FieldDictionary,
        target: u32,
    ) -> Result<(FieldDictionary, MigrationReport)> {
        let current = self.registry.current_version(schema)?;
        if target > current {
            return Err(not_possible(
                schema,
                current,
                target,
                "target is newer than the current version",
            ));
        }
        self.downgrade(schema, fields, current, target)
    }

    /// Registered steps between `from` and `to` in walk order, with the gaps
    /// between them collapsed into spans. Requires `from != to`.
    fn plan(&self, schema: &str, direction: Direction, from: u32, to: u32) -> Vec<Step<'a>> {
        let mut plan = Vec::new();
        match direction {
            Direction::Upgrade => {
                let mut reached = from;
                for (version, step) in self.registry.registered_steps(schema, direction, from + 1, to) {
                    if version > reached + 1 {
                        plan.push(Step::Skip(reached + 1, version - 1));
                    }
                    plan.push(Step::Apply(version, step));
                    reached = version;
                }
                if reached < to {
                    plan.push(Step::Skip(reached + 1, to));
                }
            }
            Direction::Downgrade => {
                let mut reached = from;
                for (version, step) in self
                    .registry
                    .registered_steps(schema, direction, to + 1, from)
                    .into_iter()
                    .rev()
                {
                    if version < reached {
                        plan.push(Step::Skip(reached, version + 1));
                    }
                    plan.push(Step::Apply(version, step));
                    reached = version - 1;
                }
                if reached > to {
                    plan.push(Step::Skip(reached, to + 1));
                }
            }
        }
        plan
    }

    fn walk(
        &self,
        schema: &str,
        mut fields: FieldDictionary,
        direction: Direction,
        from: u32,
        to: u32,
    ) -> Result<(FieldDictionary, MigrationReport)> {
        let plan = self.plan(schema, direction, from, to);

        if self.registry.is_strict(schema) {
            if let Some(&Step::Skip(missing, _)) = plan.iter().find(|s| matches!(s, Step::Skip(..))) {
                return Err(match direction {
                    Direction::Upgrade => MigrationError::VersionGap {
                        schema: schema.to_string(),
                        direction,
                        version: missing,
                    },
                    Direction::Downgrade => not_possible(
                        schema,
                        from,
                        to,
                        &format!("no downgrade function registered from version {}", missing),
                    ),
                });
            }
        }

        let mut report = MigrationReport::new(schema, direction, from, to);
        for step in plan {
            match step {
                Step::Apply(version, step) => {
                    fields = step.apply(fields).map_err(|source| {
                        MigrationError::MigrationFunctionFailure {
                            schema: schema.to_string(),
                            direction,
                            version,
                            source,
                        }
                    })?;
                    debug!(schema, %direction, version, "Applied migration step");
                    report.applied.push(version);
                }
                Step::Skip(first, last) => {
                    trace!(schema, %direction, first, last, "No migration function, passing through");
                    report.skipped.push((first, last));
                }
            }
        }

        Ok((fields, report))
    }
}

enum Step<'r> {
    Apply(u32, &'r MigrationFn),
    /// Inclusive span of versions without a function, in walk order
    Skip(u32, u32),
}

fn not_possible(schema: &str, from: u32, to: u32, reason: &str) -> MigrationError {
    MigrationError::DowngradeNotPossible {
        schema: schema.to_string(),
        from,
        to,
        reason: reason.to_string(),
    }
}
