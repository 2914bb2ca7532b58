//!
//! The two row-set backends the engine pulls data from.
//!

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::cache::NamedTables;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub mod sqlite;

/// One record: column name to scalar, in column order.
pub type Row = Map<String, Value>;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Turn JSON objects into rows. Anything that is not an object is skipped.
pub fn to_rows(values: Vec<Value>) -> Vec<Row> {
    values
        .into_iter()
        .filter_map(|value| match value {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect()
}

/// What a remote query may answer with: the rows themselves, or a result
/// object carrying them in `rows`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryResponse {
    Rows(Vec<Row>),
    Wrapped { rows: Vec<Row> },
}

impl QueryResponse {
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            QueryResponse::Rows(rows) => rows,
            QueryResponse::Wrapped { rows } => rows,
        }
    }
}

impl From<Vec<Row>> for QueryResponse {
    fn from(rows: Vec<Row>) -> Self {
        QueryResponse::Rows(rows)
    }
}

///
/// Query execution against the live database.
///
/// The connection is owned and managed by the implementor; the engine only
/// ever issues `query` calls, one at a time per build.
///
#[async_trait]
pub trait RemoteQuery: Send + Sync {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResponse, BoxError>;
}

#[async_trait]
impl<T: RemoteQuery + ?Sized> RemoteQuery for &T {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResponse, BoxError> {
        (**self).query(sql, params).await
    }
}

#[async_trait]
impl<T: RemoteQuery + ?Sized> RemoteQuery for Arc<T> {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResponse, BoxError> {
        (**self).query(sql, params).await
    }
}

///
/// Query execution over named in-memory row sets.
///
/// Runs synchronously on data that is already local.
///
pub trait MemQuery: Send + Sync {
    fn query(
        &self,
        sql: &str,
        params: &[Value],
        tables: &NamedTables<'_>,
    ) -> Result<Vec<Row>, BoxError>;
}

impl<T: MemQuery + ?Sized> MemQuery for &T {
    fn query(
        &self,
        sql: &str,
        params: &[Value],
        tables: &NamedTables<'_>,
    ) -> Result<Vec<Row>, BoxError> {
        (**self).query(sql, params, tables)
    }
}

impl<T: MemQuery + ?Sized> MemQuery for Arc<T> {
    fn query(
        &self,
        sql: &str,
        params: &[Value],
        tables: &NamedTables<'_>,
    ) -> Result<Vec<Row>, BoxError> {
        (**self).query(sql, params, tables)
    }
}

/// No in-memory engine: every in-memory query fails.
impl MemQuery for () {
    fn query(
        &self,
        sql: &str,
        _params: &[Value],
        _tables: &NamedTables<'_>,
    ) -> Result<Vec<Row>, BoxError> {
        Err(format!("no in-memory query engine configured for: {}", sql).into())
    }
}
