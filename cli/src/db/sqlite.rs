//! SQLite adapter over `rusqlite`

use async_trait::async_trait;
use grator_migrations::{QueryResult, Row, Value};
use rusqlite::fallible_iterator::FallibleIterator;
use rusqlite::types::ValueRef;

use super::{Client, ClientError, ConnectionParams};

const IN_MEMORY: &str = ":memory:";

pub struct SqliteClient {
    path: String,
    conn: Option<rusqlite::Connection>,
}

impl SqliteClient {
    /// The database parameter is the file path; none means in-memory
    pub fn new(params: ConnectionParams) -> Self {
        Self {
            path: params.database.unwrap_or_else(|| IN_MEMORY.to_string()),
            conn: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

fn query_error(err: rusqlite::Error) -> ClientError {
    ClientError::Query(err.to_string())
}

fn convert(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

/// Run each statement in turn, keeping the rows of the last one that returns columns
fn run_batch(conn: &rusqlite::Connection, sql: &str) -> Result<QueryResult, rusqlite::Error> {
    let mut batch = rusqlite::Batch::new(conn, sql);
    let mut last = QueryResult::default();

    while let Some(mut stmt) = batch.next()? {
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let count = columns.len();
        let mut rows = stmt.query([])?;
        let mut collected = Vec::new();
        while let Some(row) = rows.next()? {
            let values = (0..count)
                .map(|i| row.get_ref(i).map(convert))
                .collect::<Result<Vec<_>, _>>()?;
            collected.push(Row(values));
        }
        if count > 0 {
            last = QueryResult {
                columns,
                rows: collected,
            };
        }
    }

    Ok(last)
}

#[async_trait]
impl Client for SqliteClient {
    async fn connect(&mut self) -> Result<(), ClientError> {
        if self.conn.is_none() {
            let conn = rusqlite::Connection::open(&self.path)
                .map_err(|e| ClientError::Connection(format!("{}: {e}", self.path)))?;
            self.conn = Some(conn);
        }
        Ok(())
    }

    async fn query(&mut self, sql: &str) -> Result<QueryResult, ClientError> {
        let conn = self.conn.as_ref().ok_or(ClientError::NotConnected)?;
        run_batch(conn, sql).map_err(query_error)
    }

    async fn end(&mut self) -> Result<(), ClientError> {
        if let Some(conn) = self.conn.take() {
            conn.close()
                .map_err(|(_, e)| ClientError::Connection(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Secure;

    fn client(database: Option<&str>) -> SqliteClient {
        SqliteClient::new(ConnectionParams {
            host: "127.0.0.1".into(),
            port: 0,
            database: database.map(String::from),
            username: None,
            password: None,
            secure: Secure::Disabled,
        })
    }

    #[test]
    fn missing_database_is_in_memory() {
        assert_eq!(client(None).path(), ":memory:");
        assert_eq!(client(Some("app.db")).path(), "app.db");
    }

    #[tokio::test]
    async fn multi_statement_returns_last_rows() {
        let mut db = client(None);
        db.connect().await.unwrap();

        let result = db
            .query(
                "CREATE TABLE t (id INTEGER, name TEXT);
                 INSERT INTO t VALUES (1, 'a'), (2, NULL);
                 SELECT id, name FROM t ORDER BY id;",
            )
            .await
            .unwrap();

        assert_eq!(result.columns, vec!["id", "name"]);
        assert_eq!(
            result.rows,
            vec![
                Row(vec![Value::Integer(1), Value::Text("a".into())]),
                Row(vec![Value::Integer(2), Value::Null]),
            ]
        );

        let result = db.query("INSERT INTO t VALUES (3, 'c')").await.unwrap();
        assert!(result.columns.is_empty());
        assert!(result.rows.is_empty());

        db.end().await.unwrap();
    }

    #[tokio::test]
    async fn errors_stop_the_batch() {
        let mut db = client(None);
        db.connect().await.unwrap();
        let err = db
            .query("CREATE TABLE t (id INTEGER); INSERT INTO missing VALUES (1); CREATE TABLE u (id INTEGER);")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Query(_)));

        let tables = db
            .query("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .await
            .unwrap();
        assert_eq!(tables.rows, vec![Row(vec![Value::Text("t".into())])]);
    }

    #[tokio::test]
    async fn end_is_idempotent() {
        let mut db = client(None);
        db.end().await.unwrap();
        db.connect().await.unwrap();
        db.end().await.unwrap();
        db.end().await.unwrap();
        assert!(matches!(db.query("SELECT 1").await, Err(ClientError::NotConnected)));
    }
}
