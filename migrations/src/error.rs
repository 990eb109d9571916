//! Engine errors

use std::path::PathBuf;

use crate::file::Action;

/// Boxed error returned by an [`Executor`](crate::Executor).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while discovering, planning or applying migrations
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("invalid migration pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("failed to read {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("invalid migration file name '{0}' (expected <version>.<do|undo>[.<name>].sql)")]
    InvalidFileName(String),

    #[error("Two migrations found with version {version} and action {action}: {first}, {second}")]
    VersionConflict {
        version: u64,
        action: Action,
        first: String,
        second: String,
    },

    #[error("cannot migrate down from version {0}: no undo migration found")]
    MissingUndo(u64),

    #[error("checksum failed for migration {version} ({filename}): file was changed after it was applied")]
    ChecksumMismatch { version: u64, filename: String },

    #[error("table {0} does not exist")]
    SchemaTableMissing(String),

    #[error("query failed: {source}")]
    Query {
        sql: String,
        #[source]
        source: BoxError,
    },

    #[error("migration {filename} failed: {source}")]
    StepFailed {
        filename: String,
        #[source]
        source: BoxError,
    },

    /// Failure reported only as a message, with no structured cause
    #[error("{0}")]
    Message(String),
}

impl MigrationError {
    pub(crate) fn query(sql: &str, source: BoxError) -> Self {
        Self::Query {
            sql: sql.to_string(),
            source,
        }
    }
}
