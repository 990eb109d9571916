//! PostgreSQL adapter over `tokio-postgres`

use std::future::Future;

use async_trait::async_trait;
use grator_migrations::{QueryResult, Row, Value};
use tokio::task::JoinHandle;
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, SimpleQueryMessage};
use tokio_postgres_rustls::MakeRustlsConnect;

use super::tls::{self, SslMode};
use super::{Client, ClientError, ConnectionParams};

pub struct PostgresClient {
    config: tokio_postgres::Config,
    tls: Option<MakeRustlsConnect>,
    client: Option<tokio_postgres::Client>,
    connection: Option<JoinHandle<()>>,
}

impl PostgresClient {
    pub fn new(params: ConnectionParams) -> Result<Self, ClientError> {
        let mode = SslMode::from_secure(&params.secure)?;

        let mut config = tokio_postgres::Config::new();
        config.host(&params.host).port(params.port);
        if let Some(database) = &params.database {
            config.dbname(database);
        }
        // libpq falls back to PGUSER, then the OS user
        let user = params
            .username
            .or_else(|| std::env::var("PGUSER").ok())
            .or_else(|| std::env::var("USER").ok());
        if let Some(user) = &user {
            config.user(user);
        }
        if let Some(password) = &params.password {
            config.password(password);
        }
        config.ssl_mode(if mode.requires_tls() {
            tokio_postgres::config::SslMode::Require
        } else {
            tokio_postgres::config::SslMode::Disable
        });

        Ok(Self {
            config,
            tls: tls::connector(mode)?,
            client: None,
            connection: None,
        })
    }
}

fn spawn_connection<F>(connection: F) -> JoinHandle<()>
where
    F: Future<Output = Result<(), tokio_postgres::Error>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::warn!(error = %e, "PostgreSQL connection error");
        }
    })
}

fn classify(err: tokio_postgres::Error) -> ClientError {
    let auth = matches!(
        err.code(),
        Some(code) if *code == SqlState::INVALID_PASSWORD
            || *code == SqlState::INVALID_AUTHORIZATION_SPECIFICATION
    );
    match err.as_db_error() {
        Some(db) if auth => ClientError::Authentication(db.message().to_string()),
        Some(db) => ClientError::Query(db.message().to_string()),
        None => ClientError::Connection(err.to_string()),
    }
}

/// Simple-query protocol messages that shape a result
#[derive(Debug)]
enum Reply {
    Columns(Vec<String>),
    Row(Vec<Value>),
    Complete,
}

/// Rows of the last statement; a statement without a result set yields an empty one
fn last_result(replies: impl IntoIterator<Item = Reply>) -> QueryResult {
    let mut last = QueryResult::default();
    let mut current = QueryResult::default();
    for reply in replies {
        match reply {
            Reply::Columns(columns) => {
                current = QueryResult {
                    columns,
                    rows: Vec::new(),
                };
            }
            Reply::Row(values) => current.rows.push(Row(values)),
            Reply::Complete => last = std::mem::take(&mut current),
        }
    }
    last
}

#[async_trait]
impl Client for PostgresClient {
    async fn connect(&mut self) -> Result<(), ClientError> {
        if self.client.is_some() {
            return Ok(());
        }

        let (client, connection) = match &self.tls {
            Some(tls) => {
                let (client, conn) = self.config.connect(tls.clone()).await.map_err(classify)?;
                (client, spawn_connection(conn))
            }
            None => {
                let (client, conn) = self.config.connect(NoTls).await.map_err(classify)?;
                (client, spawn_connection(conn))
            }
        };

        self.client = Some(client);
        self.connection = Some(connection);
        Ok(())
    }

    async fn query(&mut self, sql: &str) -> Result<QueryResult, ClientError> {
        let client = self.client.as_ref().ok_or(ClientError::NotConnected)?;
        let messages = client.simple_query(sql).await.map_err(classify)?;

        // Simple-query values arrive as text
        Ok(last_result(messages.iter().filter_map(|message| match message {
            SimpleQueryMessage::RowDescription(columns) => Some(Reply::Columns(
                columns.iter().map(|c| c.name().to_string()).collect(),
            )),
            SimpleQueryMessage::Row(row) => Some(Reply::Row(
                (0..row.len())
                    .map(|i| match row.get(i) {
                        Some(text) => Value::Text(text.to_string()),
                        None => Value::Null,
                    })
                    .collect(),
            )),
            SimpleQueryMessage::CommandComplete(_) => Some(Reply::Complete),
            _ => None,
        })))
    }

    async fn end(&mut self) -> Result<(), ClientError> {
        // Dropping the client closes the connection and ends its task
        drop(self.client.take());
        if let Some(connection) = self.connection.take() {
            connection
                .await
                .map_err(|e| ClientError::Connection(e.to_string()))?;
        }
        Ok(())
    }
}
