//! The storage engine seam.

use std::future::Future;
use std::pin::Pin;

use indexmap::IndexMap;

use crate::error::QueryResult;
use crate::sql::Dialect;
use crate::value::Value;

/// A boxed future that is Send.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One result row: column name to value, in select order.
pub type Row = IndexMap<String, Value>;

/// Result of a multi-row insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InsertOutcome {
    /// Rows written.
    pub rows_affected: u64,
    /// First id generated by the statement, when the engine can tell.
    pub first_id: Option<i64>,
}

/// Executes rendered SQL.
///
/// Object safe so a client can hold `Arc<dyn QueryEngine>`.
pub trait QueryEngine: Send + Sync {
    /// Dialect the engine speaks.
    fn dialect(&self) -> Dialect;

    /// Run a SELECT and return its rows.
    fn query(&self, sql: &str, params: Vec<Value>) -> BoxFuture<'_, QueryResult<Vec<Row>>>;

    /// Run a statement and return the affected row count.
    fn execute(&self, sql: &str, params: Vec<Value>) -> BoxFuture<'_, QueryResult<u64>>;

    /// Run a multi-row INSERT (or REPLACE) into `table`.
    fn insert(
        &self,
        table: &str,
        sql: &str,
        params: Vec<Value>,
    ) -> BoxFuture<'_, QueryResult<InsertOutcome>>;
}
