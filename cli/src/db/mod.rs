//! Database clients
//!
//! Every backend is wrapped behind the same [`Client`] contract
//! (`connect`, `query`, `end`). [`ClientHandle`] picks the adapter once from
//! the configured driver; drivers left out of the build fail with
//! [`CliError::MissingDriver`].

#[cfg(not(any(
    feature = "postgres",
    feature = "mysql",
    feature = "sqlserver",
    feature = "sqlite"
)))]
compile_error!("enable at least one driver feature: postgres, mysql, sqlserver or sqlite");

#[cfg(feature = "sqlserver")]
pub mod mssql;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;
#[cfg(feature = "postgres")]
pub mod tls;

use async_trait::async_trait;
use grator_migrations::{BoxError, Executor, QueryResult};
use thiserror::Error;

use crate::config::{Driver, EffectiveConfig, Secure};
use crate::error::CliError;

/// Everything an adapter needs to open a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub secure: Secure,
}

impl ConnectionParams {
    /// Connection settings from the config and the already resolved password
    pub fn from_config(config: &EffectiveConfig, password: Option<String>) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            database: config.database.clone(),
            username: config.username.clone(),
            password,
            secure: config.secure.clone(),
        }
    }
}

/// Adapter failures
#[derive(Debug, Error)]
pub enum ClientError {
    /// Backend rejected the credentials
    #[error("{0}")]
    Authentication(String),

    #[error("{0}")]
    Connection(String),

    #[error("{0}")]
    Query(String),

    #[error("client is not connected")]
    NotConnected,
}

impl From<ClientError> for CliError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Authentication(message) => Self::Authentication(message),
            other => Self::Connection(other.to_string()),
        }
    }
}

/// Uniform contract over one database connection
#[async_trait]
pub trait Client: Send {
    /// Open the connection
    async fn connect(&mut self) -> Result<(), ClientError>;

    /// Run SQL text, possibly several statements, and return the last result set
    async fn query(&mut self, sql: &str) -> Result<QueryResult, ClientError>;

    /// Close the connection; a no-op when it is not open
    async fn end(&mut self) -> Result<(), ClientError>;
}

/// One adapter per supported backend
pub enum ClientHandle {
    #[cfg(feature = "postgres")]
    Postgres(postgres::PostgresClient),
    #[cfg(feature = "mysql")]
    Mysql(mysql::MysqlClient),
    #[cfg(feature = "sqlserver")]
    SqlServer(mssql::MssqlClient),
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite::SqliteClient),
}

macro_rules! dispatch {
    ($self:ident, $client:ident => $body:expr) => {
        match $self {
            #[cfg(feature = "postgres")]
            ClientHandle::Postgres($client) => $body,
            #[cfg(feature = "mysql")]
            ClientHandle::Mysql($client) => $body,
            #[cfg(feature = "sqlserver")]
            ClientHandle::SqlServer($client) => $body,
            #[cfg(feature = "sqlite")]
            ClientHandle::Sqlite($client) => $body,
        }
    };
}

impl ClientHandle {
    /// Build a not yet connected client for `driver`
    pub fn new(driver: Driver, params: ConnectionParams) -> Result<Self, CliError> {
        tracing::debug!(%driver, host = %params.host, port = params.port, "creating client");
        match driver {
            #[cfg(feature = "postgres")]
            Driver::Postgres => Ok(Self::Postgres(postgres::PostgresClient::new(params)?)),
            #[cfg(not(feature = "postgres"))]
            Driver::Postgres => Err(CliError::MissingDriver {
                driver: "PostgreSQL",
                feature: "postgres",
            }),

            #[cfg(feature = "mysql")]
            Driver::Mysql => Ok(Self::Mysql(mysql::MysqlClient::new(params))),
            #[cfg(not(feature = "mysql"))]
            Driver::Mysql => Err(CliError::MissingDriver {
                driver: "MySQL",
                feature: "mysql",
            }),

            #[cfg(feature = "sqlserver")]
            Driver::SqlServer => Ok(Self::SqlServer(mssql::MssqlClient::new(params))),
            #[cfg(not(feature = "sqlserver"))]
            Driver::SqlServer => Err(CliError::MissingDriver {
                driver: "SQL Server",
                feature: "sqlserver",
            }),

            #[cfg(feature = "sqlite")]
            Driver::Sqlite => Ok(Self::Sqlite(sqlite::SqliteClient::new(params))),
            #[cfg(not(feature = "sqlite"))]
            Driver::Sqlite => Err(CliError::MissingDriver {
                driver: "SQLite",
                feature: "sqlite",
            }),
        }
    }
}

#[async_trait]
impl Client for ClientHandle {
    async fn connect(&mut self) -> Result<(), ClientError> {
        dispatch!(self, client => client.connect().await)
    }

    async fn query(&mut self, sql: &str) -> Result<QueryResult, ClientError> {
        dispatch!(self, client => client.query(sql).await)
    }

    async fn end(&mut self) -> Result<(), ClientError> {
        dispatch!(self, client => client.end().await)
    }
}

#[async_trait]
impl Executor for ClientHandle {
    async fn execute(&mut self, sql: &str) -> Result<QueryResult, BoxError> {
        Ok(Client::query(self, sql).await?)
    }
}
