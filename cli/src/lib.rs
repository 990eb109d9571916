//! grator - versioned SQL migrations from the command line
//!
//! Runs numbered migration files against PostgreSQL, MySQL, SQL Server or
//! SQLite, tracking the applied version in a schema table.
//!
//! # Quick Start
//!
//! ```text
//! migrations/
//!   001.do.create-users.sql
//!   001.undo.create-users.sql
//!   002.do.add-email.sql
//!   002.undo.add-email.sql
//! ```
//!
//! ```text
//! grator --driver sqlite --database app.db      # migrate to the latest version
//! grator 1 --driver sqlite --database app.db    # migrate to version 1
//! grator drop-schema --driver sqlite --database app.db
//! ```
//!
//! # Configuration
//!
//! Settings can live in `grator.config.toml` (or `grator.json`, `.gratorrc`)
//! in the working directory or any parent; command-line flags win:
//!
//! ```toml
//! driver = "pg"
//! host = "localhost"
//! database = "app"
//! username = "migrator"
//! password = { prompt = true }
//! migrationPattern = "db/migrations/*"
//! ```

pub mod args;
pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod orchestrator;
pub mod output;

use std::path::PathBuf;
use std::sync::Arc;

use grator_migrations::MigrationRecord;

use crate::args::{Command, Parsed};
use crate::credentials::{PasswordPrompt, TerminalPrompt};
use crate::output::{ConsoleLog, LogSink};

pub use crate::error::CliError;

/// Per-invocation environment: where we run, where lifecycle messages go,
/// and how passwords are read
pub struct Context {
    pub cwd: PathBuf,
    pub log: Arc<dyn LogSink>,
    pub prompt: Box<dyn PasswordPrompt>,
}

impl Context {
    /// Console logging and a terminal password prompt
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            log: Arc::new(ConsoleLog),
            prompt: Box::new(TerminalPrompt),
        }
    }
}

/// Run one invocation
///
/// `argv` excludes the binary name. Returns the applied migrations for the
/// migrate command and `None` for help, version and `drop-schema`.
pub async fn run<I, S>(argv: I, ctx: &Context) -> Result<Option<Vec<MigrationRecord>>, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let invocation = match args::parse(argv)? {
        Parsed::Help => {
            println!("{}", args::usage());
            return Ok(None);
        }
        Parsed::Version => {
            println!("{}", args::version_line());
            return Ok(None);
        }
        Parsed::Run(invocation) => invocation,
    };

    let file = config::load_file(
        invocation.options.config.as_deref(),
        invocation.options.no_config,
        &ctx.cwd,
    )
    .await?;
    let config = config::resolve(&invocation, file, &ctx.cwd)?;
    tracing::debug!(
        driver = %config.driver,
        target = %config.target,
        pattern = %config.migration_pattern,
        "resolved configuration"
    );

    match invocation.command {
        Command::Migrate(_) => orchestrator::migrate(&config, ctx).await.map(Some),
        Command::DropSchema => {
            orchestrator::drop_schema(&config, ctx).await?;
            Ok(None)
        }
    }
}
