//! SQL Server adapter over `tiberius`
//!
//! Query text is split into batches on lines holding only `GO`. Batches run
//! in order on one connection; the first failure stops the run, and only
//! the final batch's rows are returned.

use async_trait::async_trait;
use grator_migrations::{QueryResult, Row, Value};
use tiberius::{AuthMethod, ColumnData, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use super::{Client, ClientError, ConnectionParams};
use crate::config::Secure;

/// Login failed for user
const LOGIN_FAILED: u32 = 18456;

pub struct MssqlClient {
    config: Config,
    client: Option<tiberius::Client<Compat<TcpStream>>>,
}

impl MssqlClient {
    pub fn new(params: ConnectionParams) -> Self {
        let mut config = Config::new();
        config.host(&params.host);
        config.port(params.port);
        if let Some(database) = &params.database {
            config.database(database);
        }
        if let Some(username) = &params.username {
            config.authentication(AuthMethod::sql_server(
                username,
                params.password.as_deref().unwrap_or_default(),
            ));
        }

        match &params.secure {
            Secure::Disabled => config.encryption(EncryptionLevel::Off),
            Secure::Enabled => {
                config.trust_cert();
                config.encryption(EncryptionLevel::Required);
            }
            Secure::Profile(profile) => {
                let verify = matches!(
                    profile.to_ascii_lowercase().as_str(),
                    "verify-ca" | "verify-full"
                );
                if !verify {
                    config.trust_cert();
                }
                config.encryption(EncryptionLevel::Required);
            }
        }

        Self {
            config,
            client: None,
        }
    }
}

/// Split query text on lines consisting solely of `GO`, case-insensitive
pub fn split_batches(sql: &str) -> Vec<String> {
    let mut batches = Vec::new();
    let mut current = String::new();
    for line in sql.lines() {
        if line.trim().eq_ignore_ascii_case("go") {
            batches.push(std::mem::take(&mut current));
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    batches.push(current);
    batches
}

fn classify(err: tiberius::error::Error) -> ClientError {
    match err {
        tiberius::error::Error::Server(token) if token.code() == LOGIN_FAILED => {
            ClientError::Authentication(token.message().to_string())
        }
        tiberius::error::Error::Server(token) => ClientError::Query(token.message().to_string()),
        tiberius::error::Error::Io { message, .. } => ClientError::Connection(message),
        other => ClientError::Query(other.to_string()),
    }
}

fn convert(data: &ColumnData<'_>) -> Value {
    match data {
        ColumnData::U8(v) => v.map_or(Value::Null, |v| Value::Integer(i64::from(v))),
        ColumnData::I16(v) => v.map_or(Value::Null, |v| Value::Integer(i64::from(v))),
        ColumnData::I32(v) => v.map_or(Value::Null, |v| Value::Integer(i64::from(v))),
        ColumnData::I64(v) => v.map_or(Value::Null, Value::Integer),
        ColumnData::F32(v) => v.map_or(Value::Null, |v| Value::Real(f64::from(v))),
        ColumnData::F64(v) => v.map_or(Value::Null, Value::Real),
        ColumnData::Bit(v) => v.map_or(Value::Null, |v| Value::Integer(i64::from(v))),
        ColumnData::String(v) => v
            .as_ref()
            .map_or(Value::Null, |s| Value::Text(s.to_string())),
        ColumnData::Binary(v) => v
            .as_ref()
            .map_or(Value::Null, |b| Value::Blob(b.to_vec())),
        ColumnData::Numeric(v) => v.map_or(Value::Null, |n| Value::Text(n.to_string())),
        ColumnData::Guid(v) => v.map_or(Value::Null, |g| Value::Text(g.to_string())),
        other => Value::Text(format!("{other:?}")),
    }
}

/// Runs one `GO`-free batch
#[async_trait]
trait BatchRunner: Send {
    async fn run_batch(&mut self, batch: String) -> Result<QueryResult, ClientError>;
}

#[async_trait]
impl BatchRunner for tiberius::Client<Compat<TcpStream>> {
    async fn run_batch(&mut self, batch: String) -> Result<QueryResult, ClientError> {
        let sets = self
            .simple_query(batch)
            .await
            .map_err(classify)?
            .into_results()
            .await
            .map_err(classify)?;

        Ok(match sets.into_iter().last() {
            Some(rows) => QueryResult {
                columns: rows
                    .first()
                    .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
                    .unwrap_or_default(),
                rows: rows
                    .iter()
                    .map(|row| Row(row.cells().map(|(_, data)| convert(data)).collect()))
                    .collect(),
            },
            None => QueryResult::default(),
        })
    }
}

/// Run each batch in order, stopping at the first failure
///
/// Blank batches are not sent. The result is the final batch's, so a
/// trailing `GO` yields an empty result.
async fn run_batches<R>(runner: &mut R, sql: &str) -> Result<QueryResult, ClientError>
where
    R: BatchRunner + ?Sized,
{
    let mut last = QueryResult::default();
    for batch in split_batches(sql) {
        last = if batch.trim().is_empty() {
            QueryResult::default()
        } else {
            runner.run_batch(batch).await?
        };
    }
    Ok(last)
}

#[async_trait]
impl Client for MssqlClient {
    async fn connect(&mut self) -> Result<(), ClientError> {
        if self.client.is_some() {
            return Ok(());
        }

        let tcp = TcpStream::connect(self.config.get_addr())
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))?;
        tcp.set_nodelay(true)
            .map_err(|e| ClientError::Connection(e.to_string()))?;

        let client = tiberius::Client::connect(self.config.clone(), tcp.compat_write())
            .await
            .map_err(classify)?;
        self.client = Some(client);
        Ok(())
    }

    async fn query(&mut self, sql: &str) -> Result<QueryResult, ClientError> {
        let client = self.client.as_mut().ok_or(ClientError::NotConnected)?;
        run_batches(client, sql).await
    }

    async fn end(&mut self) -> Result<(), ClientError> {
        if let Some(client) = self.client.take() {
            client
                .close()
                .await
                .map_err(|e| ClientError::Connection(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_go_lines() {
        let sql = "CREATE TABLE a (id INT)\nGO\nCREATE TABLE b (id INT)\n  go  \nSELECT 1";
        let batches = split_batches(sql);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].trim(), "CREATE TABLE a (id INT)");
        assert_eq!(batches[1].trim(), "CREATE TABLE b (id INT)");
        assert_eq!(batches[2].trim(), "SELECT 1");
    }

    #[test]
    fn go_inside_a_line_is_not_a_separator() {
        let batches = split_batches("SELECT 'GO' AS go_value\nGOTO_LABEL:\nSELECT 2");
        assert_eq!(batches.len(), 1);
    }

    #[test]
    fn no_separator_is_one_batch() {
        assert_eq!(split_batches("SELECT 1;\nSELECT 2;").len(), 1);
    }

    #[test]
    fn converts_values() {
        assert_eq!(convert(&ColumnData::I64(Some(3))), Value::Integer(3));
        assert_eq!(convert(&ColumnData::I32(None)), Value::Null);
        assert_eq!(
            convert(&ColumnData::String(Some("abc".into()))),
            Value::Text("abc".into())
        );
        assert_eq!(convert(&ColumnData::Bit(Some(true))), Value::Integer(1));
    }

    /// Answers each batch with its index, failing on a chosen one
    struct Scripted {
        seen: Vec<String>,
        fail_on: Option<usize>,
    }

    #[async_trait]
    impl BatchRunner for Scripted {
        async fn run_batch(&mut self, batch: String) -> Result<QueryResult, ClientError> {
            let index = self.seen.len();
            self.seen.push(batch.trim().to_string());
            if self.fail_on == Some(index) {
                return Err(ClientError::Query(format!("batch {index} failed")));
            }
            Ok(QueryResult {
                columns: vec!["batch".into()],
                rows: vec![Row(vec![Value::Integer(index as i64)])],
            })
        }
    }

    #[tokio::test]
    async fn failing_batch_stops_the_rest() {
        let mut runner = Scripted {
            seen: Vec::new(),
            fail_on: Some(1),
        };
        let err = run_batches(&mut runner, "SELECT 1\nGO\nSELECT 2\nGO\nSELECT 3")
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Query(ref m) if m == "batch 1 failed"));
        assert_eq!(runner.seen, vec!["SELECT 1", "SELECT 2"]);
    }

    #[tokio::test]
    async fn result_comes_from_the_final_batch() {
        let mut runner = Scripted {
            seen: Vec::new(),
            fail_on: None,
        };
        let result = run_batches(&mut runner, "SELECT 1\nGO\nSELECT 2").await.unwrap();
        assert_eq!(result.rows, vec![Row(vec![Value::Integer(1)])]);

        let mut runner = Scripted {
            seen: Vec::new(),
            fail_on: None,
        };
        let result = run_batches(&mut runner, "SELECT 1\nGO\n").await.unwrap();
        assert_eq!(runner.seen, vec!["SELECT 1"]);
        assert_eq!(result, QueryResult::default());
    }

    #[tokio::test]
    async fn end_without_connect_is_noop() {
        let mut client = MssqlClient::new(ConnectionParams {
            host: "localhost".into(),
            port: 1433,
            database: None,
            username: None,
            password: None,
            secure: Secure::Disabled,
        });
        client.end().await.unwrap();
        assert!(matches!(client.query("SELECT 1").await, Err(ClientError::NotConnected)));
    }
}
