//! Migration engine
//!
//! [`MigrationEngine`] is the contract the CLI drives. [`Migrator`] implements
//! it on top of any [`Executor`]:
//! - Load migration files from a glob pattern
//! - Track applied versions in a schema table
//! - Apply `do` files going up and `undo` files going down, in version order

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use crate::dialect::Dialect;
use crate::error::MigrationError;
use crate::executor::{Executor, QueryResult};
use crate::file::{Action, MigrationFile};
use crate::set::{Direction, MigrationSet};

// ============================================================================
// Target
// ============================================================================

/// Version to migrate to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Target {
    /// Highest version among the migration files
    #[default]
    Max,
    Version(u64),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Max => f.write_str("max"),
            Self::Version(v) => write!(f, "{v}"),
        }
    }
}

/// Raised when a target is neither `max` nor a non-negative integer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid version '{0}': expected 'max' or a non-negative integer")]
pub struct ParseTargetError(pub String);

impl FromStr for Target {
    type Err = ParseTargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed == "max" {
            return Ok(Self::Max);
        }
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseTargetError(s.to_string()));
        }
        trimmed
            .parse()
            .map(Self::Version)
            .map_err(|_| ParseTargetError(s.to_string()))
    }
}

// ============================================================================
// Records and events
// ============================================================================

/// One migration step that was applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    pub version: u64,
    pub action: Action,
    pub filename: String,
    pub checksum: Option<String>,
}

impl From<&MigrationFile> for MigrationRecord {
    fn from(file: &MigrationFile) -> Self {
        Self {
            version: file.version,
            action: file.action,
            filename: file.filename.clone(),
            checksum: Some(file.checksum.clone()),
        }
    }
}

/// Lifecycle events emitted once per file, in processing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// An applied file's checksum is about to be verified
    ValidationStarted,
    /// A file is about to run
    MigrationStarted,
}

pub type EventHandler = Box<dyn Fn(&MigrationFile) + Send + Sync>;

// ============================================================================
// Engine contract
// ============================================================================

/// Operations the orchestrator needs from a migration engine
#[async_trait]
pub trait MigrationEngine: Send {
    /// Register an observer for a lifecycle event
    fn on(&mut self, event: Event, handler: EventHandler);

    /// All migration files, ordered by version
    async fn migrations(&mut self) -> Result<Vec<MigrationFile>, MigrationError>;

    async fn max_version(&mut self) -> Result<u64, MigrationError>;

    /// Current database version; `SchemaTableMissing` when the table is absent
    async fn database_version(&mut self) -> Result<u64, MigrationError>;

    /// Apply the steps needed to reach `target`
    async fn migrate(&mut self, target: Target) -> Result<Vec<MigrationRecord>, MigrationError>;

    fn quoted_schema_table(&self) -> String;

    async fn schema_table_exists(&mut self) -> Result<bool, MigrationError>;

    async fn run_query(&mut self, sql: &str) -> Result<QueryResult, MigrationError>;
}

// ============================================================================
// Migrator
// ============================================================================

/// Settings for a [`Migrator`]
#[derive(Debug, Clone)]
pub struct MigratorOptions {
    pub dialect: Dialect,
    pub schema_table: String,
    pub migration_pattern: String,
    pub validate_checksum: bool,
}

/// Applied version and its stored checksum
#[derive(Debug, Clone)]
struct Applied {
    version: u64,
    checksum: Option<String>,
}

/// Engine implementation running SQL through an [`Executor`]
pub struct Migrator<E> {
    executor: E,
    options: MigratorOptions,
    set: Option<MigrationSet>,
    handlers: Vec<(Event, EventHandler)>,
}

impl<E: Executor> Migrator<E> {
    pub fn new(executor: E, options: MigratorOptions) -> Self {
        Self {
            executor,
            options,
            set: None,
            handlers: Vec::new(),
        }
    }

    pub fn options(&self) -> &MigratorOptions {
        &self.options
    }

    /// Give back the executor
    pub fn into_inner(self) -> E {
        self.executor
    }

    fn emit(&self, event: Event, file: &MigrationFile) {
        for (_, handler) in self.handlers.iter().filter(|(e, _)| *e == event) {
            handler(file);
        }
    }

    /// Load the migration set once per migrator
    fn load(&mut self) -> Result<&MigrationSet, MigrationError> {
        if self.set.is_none() {
            self.set = Some(MigrationSet::from_pattern(&self.options.migration_pattern)?);
        }
        match &self.set {
            Some(set) => Ok(set),
            None => Err(MigrationError::Message("migration set not loaded".into())),
        }
    }

    async fn query(&mut self, sql: &str) -> Result<QueryResult, MigrationError> {
        tracing::debug!(sql, "grator.query");
        self.executor
            .execute(sql)
            .await
            .map_err(|e| MigrationError::query(sql, e))
    }

    async fn table_exists(&mut self) -> Result<bool, MigrationError> {
        let sql = self.options.dialect.table_exists_sql(&self.options.schema_table);
        Ok(!self.query(&sql).await?.rows.is_empty())
    }

    async fn applied(&mut self) -> Result<Vec<Applied>, MigrationError> {
        let sql = self.options.dialect.select_applied_sql(&self.options.schema_table);
        let result = self.query(&sql).await?;

        result
            .rows
            .iter()
            .map(|row| {
                let version = row
                    .get(0)
                    .and_then(|v| v.as_i64())
                    .and_then(|v| u64::try_from(v).ok())
                    .ok_or_else(|| {
                        MigrationError::Message(format!(
                            "unexpected version value in {}: {:?}",
                            self.quoted_schema_table(),
                            row.get(0)
                        ))
                    })?;
                let checksum = row
                    .get(1)
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
                Ok(Applied { version, checksum })
            })
            .collect()
    }

    async fn ensure_table(&mut self) -> Result<(), MigrationError> {
        if !self.table_exists().await? {
            let sql = self.options.dialect.create_table_sql(&self.options.schema_table);
            self.query(&sql).await?;
        }
        Ok(())
    }

    fn validate(&self, set: &MigrationSet, applied: &[Applied], current: u64) -> Result<(), MigrationError> {
        for file in set
            .all()
            .iter()
            .filter(|f| f.action == Action::Do && f.version <= current)
        {
            let Some(stored) = applied
                .iter()
                .find(|a| a.version == file.version)
                .and_then(|a| a.checksum.as_deref())
            else {
                continue;
            };

            self.emit(Event::ValidationStarted, file);
            if stored != file.checksum {
                return Err(MigrationError::ChecksumMismatch {
                    version: file.version,
                    filename: file.filename.clone(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<E: Executor> MigrationEngine for Migrator<E> {
    fn on(&mut self, event: Event, handler: EventHandler) {
        self.handlers.push((event, handler));
    }

    async fn migrations(&mut self) -> Result<Vec<MigrationFile>, MigrationError> {
        Ok(self.load()?.all().to_vec())
    }

    async fn max_version(&mut self) -> Result<u64, MigrationError> {
        Ok(self.load()?.max_version())
    }

    async fn database_version(&mut self) -> Result<u64, MigrationError> {
        if !self.table_exists().await? {
            return Err(MigrationError::SchemaTableMissing(self.quoted_schema_table()));
        }
        let applied = self.applied().await?;
        Ok(applied.iter().map(|a| a.version).max().unwrap_or(0))
    }

    async fn migrate(&mut self, target: Target) -> Result<Vec<MigrationRecord>, MigrationError> {
        let set = self.load()?.clone();
        let target = match target {
            Target::Max => set.max_version(),
            Target::Version(v) => v,
        };

        self.ensure_table().await?;
        let applied = self.applied().await?;
        let current = applied.iter().map(|a| a.version).max().unwrap_or(0);

        if self.options.validate_checksum {
            self.validate(&set, &applied, current)?;
        }

        let versions: Vec<u64> = applied.iter().map(|a| a.version).collect();
        let (direction, steps) = set.plan(current, target, &versions)?;
        tracing::debug!(current, target, %direction, steps = steps.len(), "planned migration");

        let dialect = self.options.dialect;
        let table = self.options.schema_table.clone();
        let mut records = Vec::with_capacity(steps.len());

        for file in steps {
            self.emit(Event::MigrationStarted, file);

            self.executor
                .execute(&file.sql)
                .await
                .map_err(|source| MigrationError::StepFailed {
                    filename: file.filename.clone(),
                    source,
                })?;

            let bookkeeping = match direction {
                Direction::Up => dialect.record_sql(&table, file.version, &file.name, &file.checksum),
                Direction::Down => dialect.forget_sql(&table, file.version),
            };
            self.query(&bookkeeping).await?;

            records.push(MigrationRecord::from(file));
        }

        Ok(records)
    }

    fn quoted_schema_table(&self) -> String {
        self.options.dialect.quote_table(&self.options.schema_table)
    }

    async fn schema_table_exists(&mut self) -> Result<bool, MigrationError> {
        self.table_exists().await
    }

    async fn run_query(&mut self, sql: &str) -> Result<QueryResult, MigrationError> {
        self.query(sql).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_targets() {
        assert_eq!("max".parse::<Target>().unwrap(), Target::Max);
        assert_eq!("0".parse::<Target>().unwrap(), Target::Version(0));
        assert_eq!("0003".parse::<Target>().unwrap(), Target::Version(3));
        assert!("-1".parse::<Target>().is_err());
        assert!("1.5".parse::<Target>().is_err());
        assert!("latest".parse::<Target>().is_err());
        assert!("".parse::<Target>().is_err());
    }

    #[test]
    fn target_display() {
        assert_eq!(Target::Max.to_string(), "max");
        assert_eq!(Target::Version(12).to_string(), "12");
    }
}
