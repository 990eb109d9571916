//! MySQL adapter over `mysql_async`

use async_trait::async_trait;
use grator_migrations::{QueryResult, Row, Value};
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, SslOpts};

use super::{Client, ClientError, ConnectionParams};
use crate::config::Secure;

/// Server error for rejected credentials
const ER_ACCESS_DENIED: u16 = 1045;

pub struct MysqlClient {
    opts: Opts,
    conn: Option<Conn>,
}

impl MysqlClient {
    pub fn new(params: ConnectionParams) -> Self {
        let mut builder = OptsBuilder::default()
            .ip_or_hostname(params.host)
            .tcp_port(params.port)
            .db_name(params.database)
            .user(params.username)
            .pass(params.password);

        if let Some(ssl) = ssl_opts(&params.secure) {
            builder = builder.ssl_opts(ssl);
        }

        Self {
            opts: Opts::from(builder),
            conn: None,
        }
    }
}

/// TLS options for a secure setting; profile names follow the ssl-mode table
fn ssl_opts(secure: &Secure) -> Option<SslOpts> {
    let insecure = || SslOpts::default().with_danger_accept_invalid_certs(true);
    match secure {
        Secure::Disabled => None,
        Secure::Enabled => Some(insecure()),
        Secure::Profile(profile) => match profile.to_ascii_lowercase().as_str() {
            "disable" => None,
            "prefer" | "require" => Some(insecure()),
            "verify-ca" | "verify_ca" | "verify-full" | "verify_identity" => Some(SslOpts::default()),
            _ => {
                tracing::warn!(profile = %profile, "unknown MySQL ssl profile, using 'require'");
                Some(insecure())
            }
        },
    }
}

fn classify(err: mysql_async::Error) -> ClientError {
    match err {
        mysql_async::Error::Server(server) if server.code == ER_ACCESS_DENIED => {
            ClientError::Authentication(server.message)
        }
        mysql_async::Error::Server(server) => ClientError::Query(server.message),
        other => ClientError::Connection(other.to_string()),
    }
}

fn convert(value: &mysql_async::Value) -> Value {
    use mysql_async::Value as My;
    match value {
        My::NULL => Value::Null,
        My::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => Value::Text(text.to_string()),
            Err(_) => Value::Blob(bytes.clone()),
        },
        My::Int(i) => Value::Integer(*i),
        My::UInt(u) => match i64::try_from(*u) {
            Ok(i) => Value::Integer(i),
            Err(_) => Value::Text(u.to_string()),
        },
        My::Float(f) => Value::Real(f64::from(*f)),
        My::Double(d) => Value::Real(*d),
        My::Date(y, mo, d, h, mi, s, us) => Value::Text(format!(
            "{y:04}-{mo:02}-{d:02} {h:02}:{mi:02}:{s:02}.{us:06}"
        )),
        My::Time(neg, days, h, mi, s, us) => Value::Text(format!(
            "{}{}:{mi:02}:{s:02}.{us:06}",
            if *neg { "-" } else { "" },
            u32::from(*h) + days * 24
        )),
    }
}

#[async_trait]
impl Client for MysqlClient {
    async fn connect(&mut self) -> Result<(), ClientError> {
        if self.conn.is_none() {
            self.conn = Some(Conn::new(self.opts.clone()).await.map_err(classify)?);
        }
        Ok(())
    }

    async fn query(&mut self, sql: &str) -> Result<QueryResult, ClientError> {
        let conn = self.conn.as_mut().ok_or(ClientError::NotConnected)?;
        let mut result = conn.query_iter(sql).await.map_err(classify)?;

        let mut last = QueryResult::default();
        while !result.is_empty() {
            let columns: Vec<String> = result
                .columns_ref()
                .iter()
                .map(|c| c.name_str().into_owned())
                .collect();
            let rows: Vec<mysql_async::Row> = result.collect().await.map_err(classify)?;
            if !columns.is_empty() {
                let rows = rows
                    .iter()
                    .map(|row| {
                        Row((0..row.len())
                            .map(|i| row.as_ref(i).map_or(Value::Null, convert))
                            .collect())
                    })
                    .collect();
                last = QueryResult { columns, rows };
            }
        }
        Ok(last)
    }

    async fn end(&mut self) -> Result<(), ClientError> {
        if let Some(conn) = self.conn.take() {
            conn.disconnect()
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
    fn ssl_profiles() {
        assert!(ssl_opts(&Secure::Disabled).is_none());
        assert!(ssl_opts(&Secure::Profile("disable".into())).is_none());

        let opts = ssl_opts(&Secure::Enabled).unwrap();
        assert!(opts.accept_invalid_certs());

        let opts = ssl_opts(&Secure::Profile("verify-full".into())).unwrap();
        assert!(!opts.accept_invalid_certs());

        let opts = ssl_opts(&Secure::Profile("Amazon RDS".into())).unwrap();
        assert!(opts.accept_invalid_certs());
    }

    #[test]
    fn absent_fields_are_not_forwarded() {
        let client = MysqlClient::new(ConnectionParams {
            host: "db".into(),
            port: 3307,
            database: None,
            username: None,
            password: None,
            secure: Secure::Disabled,
        });
        assert_eq!(client.opts.ip_or_hostname(), "db");
        assert_eq!(client.opts.tcp_port(), 3307);
        assert_eq!(client.opts.db_name(), None);
        assert_eq!(client.opts.user(), None);
        assert_eq!(client.opts.pass(), None);
    }

    #[test]
    fn converts_text_protocol_values() {
        assert_eq!(convert(&mysql_async::Value::Bytes(b"7".to_vec())), Value::Text("7".into()));
        assert_eq!(convert(&mysql_async::Value::NULL), Value::Null);
        assert_eq!(convert(&mysql_async::Value::Int(-3)), Value::Integer(-3));
        assert_eq!(convert(&mysql_async::Value::UInt(u64::MAX)), Value::Text(u64::MAX.to_string()));
    }
}
