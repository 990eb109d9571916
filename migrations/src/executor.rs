//! Query execution seam between the engine and a database client

use async_trait::async_trait;

use crate::error::BoxError;

/// A single column value, normalised across drivers
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    /// Integer view of the value; text is parsed since some drivers only return text
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Real(f) if f.fract() == 0.0 => Some(*f as i64),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// One result row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(pub Vec<Value>);

impl Row {
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.0.get(idx)
    }
}

/// Rows returned by the last statement of a query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// Runs SQL text against an open connection
///
/// The text may contain several statements. Implementations return the rows
/// of the last statement that produced a result set.
#[async_trait]
pub trait Executor: Send {
    async fn execute(&mut self, sql: &str) -> Result<QueryResult, BoxError>;
}

#[async_trait]
impl<E: Executor + ?Sized> Executor for &mut E {
    async fn execute(&mut self, sql: &str) -> Result<QueryResult, BoxError> {
        (**self).execute(sql).await
    }
}
