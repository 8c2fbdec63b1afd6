//! SQLite connection wrapper.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use eloquent_query::{InsertOutcome, Row, Value};
use parking_lot::Mutex;
use rusqlite::TransactionBehavior;
use tokio::sync::OwnedSemaphorePermit;
use tokio_rusqlite::Connection;
use tracing::{debug, trace};

use crate::error::{SqliteError, SqliteResult};
use crate::types::{read_row, to_sqlite};

/// An idle connection waiting in the pool.
pub(crate) struct PooledConnection {
    pub conn: Connection,
    pub created_at: Instant,
    pub last_used: Instant,
}

impl PooledConnection {
    pub fn new(conn: Connection) -> Self {
        let now = Instant::now();
        Self {
            conn,
            created_at: now,
            last_used: now,
        }
    }
}

pub(crate) type IdleQueue = Arc<Mutex<VecDeque<PooledConnection>>>;

fn quote_table(table: &str) -> String {
    format!("\"{}\"", table.replace('"', "\"\""))
}

/// A checked-out SQLite connection.
///
/// Dropping it returns the connection to its pool.
pub struct SqliteConnection {
    conn: Connection,
    _permit: OwnedSemaphorePermit,
    return_to_pool: Option<IdleQueue>,
    created_at: Instant,
}

impl SqliteConnection {
    pub(crate) fn new(
        conn: Connection,
        permit: OwnedSemaphorePermit,
        return_to_pool: Option<IdleQueue>,
        created_at: Instant,
    ) -> Self {
        Self {
            conn,
            _permit: permit,
            return_to_pool,
            created_at,
        }
    }

    /// Run a query and return its rows.
    pub async fn query(&self, sql: &str, params: Vec<Value>) -> SqliteResult<Vec<Row>> {
        let sql = sql.to_string();
        debug!(sql = %sql, "Executing query");

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let columns: Vec<String> = stmt
                    .column_names()
                    .iter()
                    .map(|s| s.to_string())
                    .collect();
                let params: Vec<_> = params.iter().map(to_sqlite).collect();

                let rows = stmt.query_map(rusqlite::params_from_iter(params), |row| {
                    read_row(row, &columns)
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(SqliteError::from)
    }

    /// Run a statement and return the number of affected rows.
    pub async fn execute(&self, sql: &str, params: Vec<Value>) -> SqliteResult<u64> {
        let sql = sql.to_string();
        debug!(sql = %sql, "Executing statement");

        self.conn
            .call(move |conn| {
                let params: Vec<_> = params.iter().map(to_sqlite).collect();
                Ok(conn.execute(&sql, rusqlite::params_from_iter(params))? as u64)
            })
            .await
            .map_err(SqliteError::from)
    }

    /// Run a multi-row insert into `table`.
    ///
    /// The first generated id is the table's largest rowid plus one. It is
    /// read in the same immediate transaction as the insert, so writers on
    /// other connections wait until the insert commits.
    pub async fn insert(
        &self,
        table: &str,
        sql: &str,
        params: Vec<Value>,
    ) -> SqliteResult<InsertOutcome> {
        let sql = sql.to_string();
        let next_id_sql = format!(
            "SELECT COALESCE(MAX(rowid), 0) + 1 FROM {}",
            quote_table(table)
        );
        debug!(sql = %sql, "Executing insert");

        self.conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let first_id: i64 = tx.query_row(&next_id_sql, [], |row| row.get(0))?;
                let params: Vec<_> = params.iter().map(to_sqlite).collect();
                let rows_affected = tx.execute(&sql, rusqlite::params_from_iter(params))? as u64;
                tx.commit()?;
                Ok(InsertOutcome {
                    rows_affected,
                    first_id: Some(first_id),
                })
            })
            .await
            .map_err(SqliteError::from)
    }

    /// Run several statements separated by semicolons.
    pub async fn execute_batch(&self, sql: &str) -> SqliteResult<()> {
        let sql = sql.to_string();
        debug!(sql = %sql, "Executing batch");

        self.conn
            .call(move |conn| Ok(conn.execute_batch(&sql)?))
            .await
            .map_err(SqliteError::from)
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        if let Some(pool) = self.return_to_pool.take() {
            trace!("Returning connection to pool");
            pool.lock().push_back(PooledConnection {
                conn: self.conn.clone(),
                created_at: self.created_at,
                last_used: Instant::now(),
            });
        }
    }
}
