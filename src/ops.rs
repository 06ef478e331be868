//! Declarative field operations
//!
//! Most schema changes are renames, new fields with a default, or dropped
//! fields. These can be written as data (in a manifest) instead of code and
//! compiled into a [`MigrationFn`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::dictionary::{FieldDictionary, MigrationFn};

/// Failure while applying a field operation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldOpError {
    #[error("cannot rename '{from}' to '{to}': target field already present")]
    RenameConflict { from: String, to: String },
}

/// One declarative step in a migration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FieldOp {
    /// Move a value to a new key, if present
    Rename { from: String, to: String },
    /// Insert a value only when the field is absent
    SetDefault { field: String, value: Value },
    /// Always overwrite the field
    Set { field: String, value: Value },
    /// Drop the field
    Remove { field: String },
}

impl FieldOp {
    /// Apply this operation to a dictionary in place
    pub fn apply(&self, fields: &mut FieldDictionary) -> Result<(), FieldOpError> {
        match self {
            FieldOp::Rename { from, to } => {
                if from == to {
                    return Ok(());
                }
                if let Some(value) = fields.remove(from) {
                    if fields.contains_key(to) {
                        fields.insert(from.clone(), value);
                        return Err(FieldOpError::RenameConflict {
                            from: from.clone(),
                            to: to.clone(),
                        });
                    }
                    fields.insert(to.clone(), value);
                }
            }
            FieldOp::SetDefault { field, value } => {
                fields.entry(field.clone()).or_insert_with(|| value.clone());
            }
            FieldOp::Set { field, value } => {
                fields.insert(field.clone(), value.clone());
            }
            FieldOp::Remove { field } => {
                fields.remove(field);
            }
        }
        Ok(())
    }
}

/// Compile a list of operations into a single migration function
pub fn compile(ops: Vec<FieldOp>) -> MigrationFn {
    MigrationFn::new(move |mut fields| {
        for op in &ops {
            op.apply(&mut fields)?;
        }
        Ok(fields)
    })
}
