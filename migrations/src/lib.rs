//! grator migrations - the migration engine behind the `grator` CLI
//!
//! This crate provides:
//! - Discovery of versioned migration files from a glob pattern
//! - Version-conflict detection and checksums
//! - Schema-tracking table statements for PostgreSQL, MySQL, SQL Server and SQLite
//! - The [`MigrationEngine`] contract and its [`Migrator`] implementation
//!
//! # Migration files
//!
//! Files are named `<version>.<do|undo>[.<name>].sql`:
//!
//! ```text
//! migrations/
//!   001.do.create-users.sql
//!   001.undo.create-users.sql
//!   002.do.add-email.sql
//!   002.undo.add-email.sql
//! ```
//!
//! # Running migrations
//!
//! The engine only needs something that can run SQL text, an [`Executor`]:
//!
//! ```ignore
//! use grator_migrations::{Dialect, MigrationEngine, Migrator, MigratorOptions, Target};
//!
//! let mut migrator = Migrator::new(&mut client, MigratorOptions {
//!     dialect: Dialect::Postgres,
//!     schema_table: "schemaversion".into(),
//!     migration_pattern: "/app/migrations/*".into(),
//!     validate_checksum: true,
//! });
//!
//! let applied = migrator.migrate(Target::Max).await?;
//! ```

pub mod dialect;
pub mod error;
pub mod executor;
pub mod file;
pub mod migrator;
pub mod set;

pub use dialect::Dialect;
pub use error::{BoxError, MigrationError};
pub use executor::{Executor, QueryResult, Row, Value};
pub use file::{Action, MigrationFile};
pub use migrator::{
    Event, EventHandler, MigrationEngine, MigrationRecord, Migrator, MigratorOptions,
    ParseTargetError, Target,
};
pub use set::{Direction, MigrationSet};
