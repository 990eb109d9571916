//! Configuration for the grator CLI
//!
//! Merges command-line options, an optional config file and built-in
//! defaults into one [`EffectiveConfig`]. Command-line flags win over the
//! file, the file wins over defaults.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use grator_migrations::{Dialect, Target};
use serde::Deserialize;

use crate::args::{Command, Invocation};
use crate::error::CliError;

/// Files searched for, in order, in the working directory and each ancestor
pub const CONFIG_FILES: &[&str] = &[
    "grator.config.toml",
    ".gratorrc.toml",
    "grator.json",
    ".gratorrc.json",
    ".gratorrc",
];

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_MIGRATION_PATTERN: &str = "migrations/*";
pub const DEFAULT_SCHEMA_TABLE: &str = "schemaversion";

// ============================================================================
// Driver
// ============================================================================

/// Database backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Driver {
    #[default]
    Postgres,
    Mysql,
    SqlServer,
    Sqlite,
}

impl Driver {
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::SqlServer => "sqlserver",
            Self::Sqlite => "sqlite",
        }
    }

    /// Port used when neither the command line nor the file sets one
    #[inline]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Postgres => 5432,
            Self::Mysql => 3306,
            Self::SqlServer => 1433,
            Self::Sqlite => 0,
        }
    }

    #[inline]
    pub const fn dialect(self) -> Dialect {
        match self {
            Self::Postgres => Dialect::Postgres,
            Self::Mysql => Dialect::Mysql,
            Self::SqlServer => Dialect::SqlServer,
            Self::Sqlite => Dialect::Sqlite,
        }
    }
}

impl FromStr for Driver {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" | "postgresql" => Ok(Self::Postgres),
            "mysql" => Ok(Self::Mysql),
            "sqlserver" | "mssql" => Ok(Self::SqlServer),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            _ => Err(CliError::UnsupportedDriver(s.to_string())),
        }
    }
}

impl std::fmt::Display for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Password and TLS
// ============================================================================

/// Where the password comes from
///
/// An empty `Provided` string is passed through as-is. Only `Prompt` asks.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Password {
    #[default]
    Absent,
    Provided(String),
    Prompt,
}

/// TLS setting: off, on, or a named profile the adapter interprets
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Secure {
    #[default]
    Disabled,
    Enabled,
    Profile(String),
}

impl Secure {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "true" => Self::Enabled,
            "false" => Self::Disabled,
            _ => Self::Profile(value.trim().to_string()),
        }
    }
}

// ============================================================================
// Config file
// ============================================================================

/// Raw config file contents
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    pub to: Option<RawVersion>,
    pub driver: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    #[serde(alias = "user")]
    pub username: Option<String>,
    pub password: Option<RawPassword>,
    pub prompt_password: Option<bool>,
    pub migration_pattern: Option<String>,
    pub schema_table: Option<String>,
    pub validate_checksum: Option<bool>,
    pub ssl: Option<SslVal>,

    /// File this config was read from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawVersion {
    Number(u64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawPassword {
    Text(String),
    Prompt { prompt: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SslVal {
    Bool(bool),
    Profile(String),
}

impl FileConfig {
    /// Parse file contents; `.toml` files are TOML, everything else JSON
    pub fn parse(path: &Path, content: &str) -> Result<Self, CliError> {
        let is_toml = path.extension().is_some_and(|ext| ext == "toml");
        let mut config: Self = if is_toml {
            toml::from_str(content).map_err(|e| CliError::ConfigParse(path.into(), e.to_string()))?
        } else {
            serde_json::from_str(content)
                .map_err(|e| CliError::ConfigParse(path.into(), e.to_string()))?
        };
        config.source = Some(path.to_path_buf());
        Ok(config)
    }
}

/// Load the config file, if any
///
/// `no_config` skips loading even when `explicit` is set. An explicit path
/// that does not exist is an error; a failed discovery is not.
pub async fn load_file(
    explicit: Option<&Path>,
    no_config: bool,
    cwd: &Path,
) -> Result<Option<FileConfig>, CliError> {
    if no_config {
        return Ok(None);
    }

    let path = match explicit {
        Some(path) => absolute(cwd, path),
        None => match discover(cwd).await {
            Some(path) => path,
            None => {
                tracing::debug!(cwd = %cwd.display(), "no config file found");
                return Ok(None);
            }
        },
    };

    let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CliError::ConfigFileNotFound(path.clone())
        } else {
            CliError::Io(e)
        }
    })?;

    tracing::debug!(path = %path.display(), "loading config file");
    FileConfig::parse(&path, &content).map(Some)
}

async fn discover(cwd: &Path) -> Option<PathBuf> {
    for dir in cwd.ancestors() {
        for name in CONFIG_FILES {
            let candidate = dir.join(name);
            if tokio::fs::metadata(&candidate)
                .await
                .is_ok_and(|meta| meta.is_file())
            {
                return Some(candidate);
            }
        }
    }
    None
}

// ============================================================================
// Effective configuration
// ============================================================================

/// Final settings for one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub target: Target,
    pub driver: Driver,
    pub host: String,
    pub port: u16,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Password,
    pub migration_pattern: String,
    pub schema_table: String,
    pub validate_checksum: bool,
    pub secure: Secure,
    pub config_path: Option<PathBuf>,
    pub no_config: bool,
}

/// Merge command-line options, the config file and defaults
pub fn resolve(
    invocation: &Invocation,
    file: Option<FileConfig>,
    cwd: &Path,
) -> Result<EffectiveConfig, CliError> {
    let cli = &invocation.options;
    let file = file.unwrap_or_default();

    let target = match &invocation.command {
        Command::Migrate(Some(target)) => *target,
        Command::Migrate(None) => match (&cli.to, &file.to) {
            (Some(raw), _) | (None, Some(RawVersion::Text(raw))) => parse_target(raw)?,
            (None, Some(RawVersion::Number(n))) => Target::Version(*n),
            (None, None) => Target::Max,
        },
        Command::DropSchema => Target::Max,
    };

    let driver = match cli.driver.as_deref().or(file.driver.as_deref()) {
        Some(raw) => raw.parse()?,
        None => Driver::default(),
    };

    let mut password = match (&cli.password, &file.password) {
        (Some(Some(value)), _) => Password::Provided(value.clone()),
        (Some(None), _) => Password::Prompt,
        (None, Some(RawPassword::Text(value))) => Password::Provided(value.clone()),
        (None, Some(RawPassword::Prompt { prompt: true })) => Password::Prompt,
        (None, Some(RawPassword::Prompt { prompt: false })) | (None, None) => Password::Absent,
    };
    let prompt_if_empty = cli.prompt_password || file.prompt_password.unwrap_or(false);
    let missing = match &password {
        Password::Absent => true,
        Password::Provided(p) => p.is_empty(),
        Password::Prompt => false,
    };
    if prompt_if_empty && missing {
        password = Password::Prompt;
    }

    let secure = match (&cli.ssl, &file.ssl) {
        (Some(None), _) => Secure::Enabled,
        (Some(Some(value)), _) => Secure::parse(value),
        (None, Some(SslVal::Bool(true))) => Secure::Enabled,
        (None, Some(SslVal::Bool(false))) | (None, None) => Secure::Disabled,
        (None, Some(SslVal::Profile(value))) => Secure::parse(value),
    };

    let migration_pattern = cli
        .migration_pattern
        .clone()
        .or(file.migration_pattern)
        .unwrap_or_else(|| DEFAULT_MIGRATION_PATTERN.to_string());

    let config_path = file
        .source
        .or_else(|| cli.config.as_deref().map(|p| absolute(cwd, p)));

    Ok(EffectiveConfig {
        target,
        driver,
        host: non_empty(cli.host.clone())
            .or(non_empty(file.host))
            .unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: cli.port.or(file.port).unwrap_or(driver.default_port()),
        database: non_empty(cli.database.clone()).or(non_empty(file.database)),
        username: non_empty(cli.username.clone()).or(non_empty(file.username)),
        password,
        migration_pattern: normalize(&absolute(cwd, Path::new(&migration_pattern))),
        schema_table: non_empty(cli.schema_table.clone())
            .or(non_empty(file.schema_table))
            .unwrap_or_else(|| DEFAULT_SCHEMA_TABLE.to_string()),
        validate_checksum: cli.validate_checksum.or(file.validate_checksum).unwrap_or(true),
        secure,
        config_path,
        no_config: cli.no_config,
    })
}

fn parse_target(raw: &str) -> Result<Target, CliError> {
    raw.parse().map_err(|_| CliError::InvalidVersion(raw.to_string()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn absolute(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

/// Path as a string with `/` separators only
fn normalize(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

// ============================================================================
// Tests
// ============================================================================
