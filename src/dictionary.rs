//! Field dictionaries and migration functions

use std::fmt;
use std::sync::Arc;

use crate::error::BoxError;

/// Raw persisted representation of one object, without its schema label
pub type FieldDictionary = serde_json::Map<String, serde_json::Value>;

/// A registered upgrade or downgrade step.
///
/// Takes the dictionary shaped for one version and returns it shaped for the
/// adjacent version. Cloning is cheap; the function itself is shared.
#[derive(Clone)]
pub struct MigrationFn(Arc<dyn Fn(FieldDictionary) -> Result<FieldDictionary, BoxError> + Send + Sync>);

impl MigrationFn {
    /// Wrap a fallible function
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(FieldDictionary) -> Result<FieldDictionary, BoxError> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Wrap a function that cannot fail
    pub fn infallible<F>(f: F) -> Self
    where
        F: Fn(FieldDictionary) -> FieldDictionary + Send + Sync + 'static,
    {
        Self(Arc::new(move |fields| Ok(f(fields))))
    }

    /// Apply the step
    pub fn apply(&self, fields: FieldDictionary) -> Result<FieldDictionary, BoxError> {
        (self.0)(fields)
    }
}

impl fmt::Debug for MigrationFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MigrationFn(..)")
    }
}
