//! Error types for the migration pipeline

use thiserror::Error;

use crate::version::Direction;

/// Boxed error returned by migration functions
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for migration operations
pub type Result<T> = std::result::Result<T, MigrationError>;

/// Migration pipeline errors
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Unknown schema: {name}{hint}")]
    UnknownSchema { name: String, hint: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Duplicate {direction} function for {schema} version {version}")]
    DuplicateRegistration {
        schema: String,
        direction: Direction,
        version: u32,
    },

    #[error("{direction} function for {schema} version {version} failed: {source}")]
    MigrationFunctionFailure {
        schema: String,
        direction: Direction,
        version: u32,
        #[source]
        source: BoxError,
    },

    #[error("Cannot downgrade {schema} from version {from} to {to}: {reason}")]
    DowngradeNotPossible {
        schema: String,
        from: u32,
        to: u32,
        reason: String,
    },

    #[error("No {direction} function registered for {schema} version {version} (strict mode)")]
    VersionGap {
        schema: String,
        direction: Direction,
        version: u32,
    },

    #[error("{schema} version {version} is newer than the supported version {current}")]
    UnsupportedVersion {
        schema: String,
        version: u32,
        current: u32,
    },

    #[error("Unknown release: {0}")]
    UnknownRelease(String),

    #[error("Invalid schema label: {0}")]
    InvalidLabel(String),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl MigrationError {
    /// Build an `UnknownSchema` error, suggesting the closest known name
    pub(crate) fn unknown_schema<'a>(
        name: &str,
        known: impl IntoIterator<Item = &'a String>,
    ) -> Self {
        use fuzzy_matcher::skim::SkimMatcherV2;
        use fuzzy_matcher::FuzzyMatcher;

        let matcher = SkimMatcherV2::default();
        let best = known
            .into_iter()
            .filter_map(|candidate| {
                matcher
                    .fuzzy_match(candidate, name)
                    .or_else(|| matcher.fuzzy_match(name, candidate))
                    .map(|score| (score, candidate))
            })
            .max_by_key(|(score, _)| *score);

        let hint = match best {
            Some((_, candidate)) => format!(" (did you mean '{}'?)", candidate),
            None => String::new(),
        };

        MigrationError::UnknownSchema {
            name: name.to_string(),
            hint,
        }
    }
}
