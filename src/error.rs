//! Error types shared outside the container core.
//!
//! Container lifecycle errors live in [`crate::postgres::error`]; this module
//! covers configuration and the migration/scenario collaborators.

use std::path::PathBuf;

use thiserror::Error;

/// Boxed error returned by [`crate::db::SqlExecutor`] implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable or option had a value that could not be used.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors from running `*.up.sql` migration files.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The migration directory could not be turned into a glob pattern.
    #[error("Invalid migration pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    /// A directory entry matched by the glob could not be read.
    #[error("Failed to list migrations: {0}")]
    Glob(#[from] glob::GlobError),

    /// A migration file could not be read.
    #[error("Failed to read migration {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The database rejected a migration file.
    #[error("Failed to execute migration {}: {source}", path.display())]
    Exec {
        path: PathBuf,
        #[source]
        source: BoxError,
    },
}

/// Errors from loading a YAML scenario into the database.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// The scenario file could not be read.
    #[error("Failed to read scenario {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The scenario file is not valid YAML.
    #[error("Failed to parse scenario {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yml::Error,
    },

    /// The YAML is valid but not a mapping of tables to rows.
    #[error("Malformed scenario: {reason}")]
    Shape { reason: String },

    /// An INSERT was rejected by the database.
    #[error("Failed to insert into '{table}': {source}")]
    Exec {
        table: String,
        #[source]
        source: BoxError,
    },
}
