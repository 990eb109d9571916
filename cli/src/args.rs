//! Command-line parsing
//!
//! The one positional argument picks the command wherever it appears among
//! the options. `--to` is only accepted by the plain `migrate` form.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::{Args, CommandFactory, Parser};
use grator_migrations::Target;

use crate::error::CliError;

const USAGE: &str = "grator [[--to=]version | migrate | drop-schema] [--database=<db>] [--driver=<driver>] [--host=<host>] [--port=<port>] [--username=<username>] [--password=<password>] [--no-config]";

const EXAMPLES: &str = "\
Examples:
  1. Specify parameters on command line
     grator 23 --host 127.0.0.1 --database sampledb --username testuser --password testpassword

  2. Explicitly disable loading configuration file
     grator 2 --no-config

  3. Use default configuration file to migrate to version 5
     grator 5

  4. Migrate to latest version using the configuration files
     grator

  5. Drop the schema version table
     grator drop-schema --driver sqlite --database ./app.db";

/// What to do with the database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Migrate; the target is set when it came from the command token
    Migrate(Option<Target>),
    DropSchema,
}

/// Options shared by every command
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    /// Version to migrate to or 'max'. Only accepted by `migrate`.
    #[arg(skip)]
    pub to: Option<String>,

    /// Database driver: postgres, mysql, sqlserver or sqlite. Default: postgres
    #[arg(short = 'r', long, value_name = "DRIVER")]
    pub driver: Option<String>,

    /// Host. Default: 127.0.0.1
    #[arg(short = 'h', long, value_name = "HOSTNAME")]
    pub host: Option<String>,

    /// Port. Default: the driver's standard port
    #[arg(short = 'o', long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Database name, or file path for sqlite
    #[arg(short = 'd', long, value_name = "DATABASE")]
    pub database: Option<String>,

    #[arg(short = 'u', long, value_name = "USERNAME")]
    pub username: Option<String>,

    /// Password. Given without a value, the password is asked for.
    #[arg(short = 'p', long, value_name = "PASSWORD", num_args = 0..=1)]
    pub password: Option<Option<String>>,

    /// Ask for the password when it is empty or missing
    #[arg(long)]
    pub prompt_password: bool,

    /// Pattern matching migration files. Default: migrations/*
    #[arg(short = 'm', long, value_name = "PATTERN")]
    pub migration_pattern: Option<String>,

    /// Table created to track schema version. Default: schemaversion
    #[arg(short = 't', long, value_name = "TABLE")]
    pub schema_table: Option<String>,

    /// Validate checksums of already applied migration files. Default: true
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true", value_parser = BoolishValueParser::new())]
    pub validate_checksum: Option<bool>,

    /// Enable TLS. An optional value names an ssl mode or profile.
    #[arg(short = 's', long, value_name = "PROFILE", num_args = 0..=1)]
    pub ssl: Option<Option<String>>,

    /// Config file to load instead of searching for one
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Do not load any config file
    #[arg(long)]
    pub no_config: bool,

    /// Print version
    #[arg(short = 'v', long)]
    pub version: bool,

    /// Print this usage guide
    #[arg(short = '?', long)]
    pub help: bool,
}

#[derive(Parser, Debug)]
#[command(
    name = "grator",
    about = "Versioned SQL migrations for PostgreSQL, MySQL, SQL Server and SQLite",
    override_usage = USAGE,
    after_help = EXAMPLES,
    no_binary_name = true,
    disable_help_flag = true,
    disable_version_flag = true
)]
struct Cli {
    /// Version to migrate to, 'max', 'migrate' or 'drop-schema'. May follow the options.
    #[arg(value_name = "COMMAND")]
    command: Option<String>,

    /// Version number of the file to migrate to or 'max'. Default: max
    #[arg(long, value_name = "VERSION")]
    to: Option<String>,

    #[command(flatten)]
    options: Options,
}

/// A command and its options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: Command,
    pub options: Options,
}

/// Result of parsing the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    Help,
    Version,
    Run(Invocation),
}

/// Parse arguments, not including the binary name
pub fn parse<I, S>(argv: I) -> Result<Parsed, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let argv: Vec<String> = argv.into_iter().map(Into::into).collect();
    let cli = Cli::try_parse_from(&argv).map_err(usage_error)?;

    let command = match cli.command.as_deref() {
        Some(token) => command_token(token)?,
        None => Command::Migrate(None),
    };

    if cli.to.is_some() && command != Command::Migrate(None) {
        return Err(CliError::Usage(
            "'--to' is only accepted by the migrate command".to_string(),
        ));
    }

    let options = Options {
        to: cli.to,
        ..cli.options
    };

    if options.help {
        return Ok(Parsed::Help);
    }
    if options.version {
        return Ok(Parsed::Version);
    }

    Ok(Parsed::Run(Invocation { command, options }))
}

/// Arguments as UTF-8 strings; anything else is a usage error
pub fn utf8_args<I>(argv: I) -> Result<Vec<String>, CliError>
where
    I: IntoIterator<Item = OsString>,
{
    argv.into_iter()
        .map(|arg| {
            arg.into_string().map_err(|raw| {
                CliError::Usage(format!(
                    "argument is not valid UTF-8: {}",
                    raw.to_string_lossy()
                ))
            })
        })
        .collect()
}

fn command_token(token: &str) -> Result<Command, CliError> {
    match token {
        "migrate" => Ok(Command::Migrate(None)),
        "drop-schema" => Ok(Command::DropSchema),
        other => other
            .parse::<Target>()
            .map(|target| Command::Migrate(Some(target)))
            .map_err(|_| CliError::InvalidCommand(other.to_string())),
    }
}

fn usage_error(err: clap::Error) -> CliError {
    let text = err.to_string();
    let first = text.lines().next().unwrap_or_default();
    CliError::Usage(first.strip_prefix("error: ").unwrap_or(first).to_string())
}

/// Full usage guide
pub fn usage() -> String {
    Cli::command().render_help().to_string()
}

pub fn version_line() -> String {
    format!("Version: {}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(argv: &[&str]) -> Invocation {
        match parse(argv.iter().copied()).unwrap() {
            Parsed::Run(inv) => inv,
            other => panic!("expected a run, got {other:?}"),
        }
    }

    #[test]
    fn positional_picks_command() {
        assert_eq!(run(&[]).command, Command::Migrate(None));
        assert_eq!(run(&["migrate"]).command, Command::Migrate(None));
        assert_eq!(run(&["max"]).command, Command::Migrate(Some(Target::Max)));
        assert_eq!(run(&["12"]).command, Command::Migrate(Some(Target::Version(12))));
        assert_eq!(run(&["drop-schema"]).command, Command::DropSchema);
        assert_eq!(run(&["--host", "x"]).command, Command::Migrate(None));
    }

    #[test]
    fn command_may_follow_options() {
        assert_eq!(
            run(&["--no-config", "2"]).command,
            Command::Migrate(Some(Target::Version(2)))
        );
        assert_eq!(
            run(&["--driver", "sqlite", "max"]).command,
            Command::Migrate(Some(Target::Max))
        );

        let inv = run(&["-d", "app.db", "drop-schema", "--no-config"]);
        assert_eq!(inv.command, Command::DropSchema);
        assert_eq!(inv.options.database.as_deref(), Some("app.db"));
        assert!(inv.options.no_config);

        let inv = run(&["--host", "db", "migrate", "--to", "4"]);
        assert_eq!(inv.command, Command::Migrate(None));
        assert_eq!(inv.options.to.as_deref(), Some("4"));
    }

    #[test]
    fn second_positional_is_usage_error() {
        assert!(matches!(parse(["2", "3"]), Err(CliError::Usage(_))));
    }

    #[test]
    fn unknown_token_is_invalid_command() {
        let err = parse(["upgrade"]).unwrap_err();
        assert!(matches!(err, CliError::InvalidCommand(ref t) if t == "upgrade"));
        assert!(err.shows_usage());

        let err = parse(["--no-config", "upgrade"]).unwrap_err();
        assert!(matches!(err, CliError::InvalidCommand(ref t) if t == "upgrade"));
    }

    #[test]
    fn to_only_in_migrate_form() {
        assert_eq!(run(&["migrate", "--to", "3"]).options.to.as_deref(), Some("3"));
        assert_eq!(run(&["--to=max"]).options.to.as_deref(), Some("max"));

        let err = parse(["drop-schema", "--to", "3"]).unwrap_err();
        assert!(matches!(err, CliError::Usage(_)));
        let err = parse(["5", "--to", "3"]).unwrap_err();
        assert!(matches!(err, CliError::Usage(_)));
        let err = parse(["--to", "3", "drop-schema"]).unwrap_err();
        assert!(matches!(err, CliError::Usage(_)));
    }

    #[test]
    fn short_flags() {
        let inv = run(&[
            "-r", "mysql", "-h", "db", "-o", "3307", "-d", "app", "-u", "root", "-p", "pw", "-m",
            "sql/*", "-t", "versions", "-c", "conf.json",
        ]);
        let o = inv.options;
        assert_eq!(o.driver.as_deref(), Some("mysql"));
        assert_eq!(o.host.as_deref(), Some("db"));
        assert_eq!(o.port, Some(3307));
        assert_eq!(o.database.as_deref(), Some("app"));
        assert_eq!(o.username.as_deref(), Some("root"));
        assert_eq!(o.password, Some(Some("pw".into())));
        assert_eq!(o.migration_pattern.as_deref(), Some("sql/*"));
        assert_eq!(o.schema_table.as_deref(), Some("versions"));
        assert_eq!(o.config, Some(PathBuf::from("conf.json")));
    }

    #[test]
    fn optional_values() {
        let o = run(&["--password", "--ssl"]).options;
        assert_eq!(o.password, Some(None));
        assert_eq!(o.ssl, Some(None));

        let o = run(&["--validate-checksum"]).options;
        assert_eq!(o.validate_checksum, Some(true));
        let o = run(&["--validate-checksum", "false"]).options;
        assert_eq!(o.validate_checksum, Some(false));
        let o = run(&["--validate-checksum=no"]).options;
        assert_eq!(o.validate_checksum, Some(false));
    }

    #[test]
    fn help_and_version_short_circuit() {
        assert_eq!(parse(["-?"]).unwrap(), Parsed::Help);
        assert_eq!(parse(["--help"]).unwrap(), Parsed::Help);
        assert_eq!(parse(["-v"]).unwrap(), Parsed::Version);
        assert_eq!(parse(["drop-schema", "--version"]).unwrap(), Parsed::Version);
    }

    #[test]
    fn bad_flag_is_usage_error() {
        let err = parse(["--bogus"]).unwrap_err();
        match err {
            CliError::Usage(message) => assert!(message.contains("--bogus"), "{message}"),
            other => panic!("expected usage error, got {other:?}"),
        }

        assert!(matches!(parse(["--port", "many"]), Err(CliError::Usage(_))));
    }

    #[test]
    fn utf8_arguments_pass_through() {
        let argv = utf8_args([OsString::from("--host"), OsString::from("db")]).unwrap();
        assert_eq!(argv, vec!["--host", "db"]);
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_argument_is_usage_error() {
        use std::os::unix::ffi::OsStringExt;

        let argv = [OsString::from("--host"), OsString::from_vec(vec![b'd', 0xff])];
        let err = utf8_args(argv).unwrap_err();
        assert!(matches!(err, CliError::Usage(ref m) if m.contains("not valid UTF-8")));
        assert!(err.shows_usage());
    }

    #[test]
    fn usage_has_examples() {
        let text = usage();
        assert!(text.contains("Examples"));
        assert!(text.contains("--migration-pattern"));
        assert!(text.contains("drop-schema"));
    }

    #[test]
    fn version_line_format() {
        assert_eq!(version_line(), format!("Version: {}", env!("CARGO_PKG_VERSION")));
    }
}
