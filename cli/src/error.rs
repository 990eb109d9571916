//! Error types for the CLI

use std::path::PathBuf;

use thiserror::Error;

use grator_migrations::MigrationError;

/// CLI errors
#[derive(Debug, Error)]
pub enum CliError {
    #[error("unsupported driver '{0}' (expected postgres, mysql, sqlserver or sqlite)")]
    UnsupportedDriver(String),

    #[error("invalid version '{0}': expected 'max' or a non-negative integer")]
    InvalidVersion(String),

    #[error("invalid command '{0}'")]
    InvalidCommand(String),

    #[error("Config file not found: {}", .0.display())]
    ConfigFileNotFound(PathBuf),

    #[error("failed to parse {}: {}", .0.display(), .1)]
    ConfigParse(PathBuf, String),

    #[error("No migration files found from \"{0}\"")]
    NoMigrationsFound(String),

    /// Transport or driver failure while opening or using a connection
    #[error("connection failed: {0}")]
    Connection(String),

    /// Backend rejected the credentials; message is the backend's own
    #[error("{0}")]
    Authentication(String),

    #[error("{0}")]
    VersionConflict(String),

    #[error("table {0} does not exist")]
    SchemaTableMissing(String),

    #[error("password prompt failed: {0}")]
    Prompt(String),

    /// Driver compiled out of this build
    #[error("{driver} driver not enabled. Rebuild with --features {feature}")]
    MissingDriver {
        driver: &'static str,
        feature: &'static str,
    },

    /// Command line did not match the accepted shape
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Migration(MigrationError),

    /// Engine failure that carried only a message
    #[error("{0}")]
    UnknownEngine(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Errors about the shape of the command line, which are printed after usage text
    pub fn shows_usage(&self) -> bool {
        matches!(self, Self::Usage(_) | Self::InvalidCommand(_))
    }
}

impl From<MigrationError> for CliError {
    fn from(err: MigrationError) -> Self {
        match err {
            MigrationError::VersionConflict { .. } => Self::VersionConflict(err.to_string()),
            MigrationError::SchemaTableMissing(table) => Self::SchemaTableMissing(table),
            MigrationError::Message(message) => Self::UnknownEngine(message),
            other => Self::Migration(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grator_migrations::Action;

    #[test]
    fn engine_errors_become_structured() {
        let conflict = MigrationError::VersionConflict {
            version: 2,
            action: Action::Do,
            first: "002.do.a.sql".into(),
            second: "002.do.b.sql".into(),
        };
        let err = CliError::from(conflict);
        assert!(matches!(err, CliError::VersionConflict(_)));
        assert!(err.to_string().contains("version 2 and action do"));

        let err = CliError::from(MigrationError::Message("boom".into()));
        assert!(matches!(err, CliError::UnknownEngine(ref m) if m == "boom"));

        let err = CliError::from(MigrationError::SchemaTableMissing("\"t\"".into()));
        assert_eq!(err.to_string(), "table \"t\" does not exist");
    }

    #[test]
    fn only_shape_errors_show_usage() {
        assert!(CliError::Usage("bad flag".into()).shows_usage());
        assert!(CliError::InvalidCommand("nope".into()).shows_usage());
        assert!(!CliError::NoMigrationsFound("m/*".into()).shows_usage());
        assert!(!CliError::InvalidVersion("x".into()).shows_usage());
    }
}
