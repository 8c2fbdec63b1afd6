//! SQLite query engine.

use eloquent_query::{BoxFuture, Dialect, InsertOutcome, QueryEngine, QueryResult, Row, Value};
use tracing::{debug, instrument};

use crate::config::SqliteConfig;
use crate::error::SqliteResult;
use crate::pool::SqlitePool;

/// Runs the query layer's SQL on a SQLite pool.
#[derive(Clone)]
pub struct SqliteEngine {
    pool: SqlitePool,
}

impl SqliteEngine {
    /// Create an engine over an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool for `config` and wrap it.
    pub async fn connect(config: SqliteConfig) -> SqliteResult<Self> {
        Ok(Self::new(SqlitePool::new(config).await?))
    }

    /// Open a fresh in-memory database.
    pub async fn memory() -> SqliteResult<Self> {
        Self::connect(SqliteConfig::memory()).await
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run a SELECT and return its rows.
    #[instrument(skip(self, params), fields(sql = %sql))]
    pub async fn fetch(&self, sql: &str, params: Vec<Value>) -> SqliteResult<Vec<Row>> {
        let conn = self.pool.get().await?;
        let rows = conn.query(sql, params).await?;
        debug!(rows = rows.len(), "fetched");
        Ok(rows)
    }

    /// Run a statement and return the affected row count.
    #[instrument(skip(self, params), fields(sql = %sql))]
    pub async fn run(&self, sql: &str, params: Vec<Value>) -> SqliteResult<u64> {
        let conn = self.pool.get().await?;
        conn.execute(sql, params).await
    }

    /// Run a multi-row insert and report the first generated id.
    #[instrument(skip(self, sql, params), fields(table = %table))]
    pub async fn insert_rows(
        &self,
        table: &str,
        sql: &str,
        params: Vec<Value>,
    ) -> SqliteResult<InsertOutcome> {
        let conn = self.pool.get().await?;
        let outcome = conn.insert(table, sql, params).await?;
        debug!(
            rows = outcome.rows_affected,
            first_id = ?outcome.first_id,
            "inserted"
        );
        Ok(outcome)
    }

    /// Run several statements, such as a schema, in one batch.
    ///
    /// ```rust,ignore
    /// engine.execute_batch(r#"
    ///     CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);
    ///     CREATE TABLE posts (id INTEGER PRIMARY KEY, createdById INTEGER);
    /// "#).await?;
    /// ```
    #[instrument(skip(self, sql))]
    pub async fn execute_batch(&self, sql: &str) -> SqliteResult<()> {
        let conn = self.pool.get().await?;
        conn.execute_batch(sql).await
    }
}

impl QueryEngine for SqliteEngine {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(&self, sql: &str, params: Vec<Value>) -> BoxFuture<'_, QueryResult<Vec<Row>>> {
        let sql = sql.to_string();
        Box::pin(async move { Ok(self.fetch(&sql, params).await?) })
    }

    fn execute(&self, sql: &str, params: Vec<Value>) -> BoxFuture<'_, QueryResult<u64>> {
        let sql = sql.to_string();
        Box::pin(async move { Ok(self.run(&sql, params).await?) })
    }

    fn insert(
        &self,
        table: &str,
        sql: &str,
        params: Vec<Value>,
    ) -> BoxFuture<'_, QueryResult<InsertOutcome>> {
        let table = table.to_string();
        let sql = sql.to_string();
        Box::pin(async move { Ok(self.insert_rows(&table, &sql, params).await?) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn engine() -> SqliteEngine {
        let engine = SqliteEngine::memory().await.unwrap();
        engine
            .execute_batch(
                "CREATE TABLE tags (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE, createdAt TEXT);",
            )
            .await
            .unwrap();
        engine
    }

    #[tokio::test]
    async fn test_insert_reports_first_id() {
        let engine = engine().await;
        let outcome = engine
            .insert("tags", "INSERT INTO tags (name) VALUES (?), (?)", vec!["a".into(), "b".into()])
            .await
            .unwrap();
        assert_eq!(outcome, InsertOutcome { rows_affected: 2, first_id: Some(1) });

        let outcome = engine
            .insert("tags", "INSERT INTO tags (id, name) VALUES (?, ?)", vec![10.into(), "c".into()])
            .await
            .unwrap();
        assert_eq!(outcome.first_id, Some(3));

        let outcome = engine
            .insert("tags", "INSERT INTO tags (name) VALUES (?)", vec!["d".into()])
            .await
            .unwrap();
        assert_eq!(outcome.first_id, Some(11));
    }

    #[tokio::test]
    async fn test_query_round_trip() {
        let engine = engine().await;
        engine
            .execute(
                "INSERT INTO tags (name, createdAt) VALUES (?, ?)",
                vec!["rust".into(), Value::Null],
            )
            .await
            .unwrap();

        let rows = engine
            .query("SELECT id, name, createdAt FROM tags WHERE name = ?", vec!["rust".into()])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], Value::Int(1));
        assert_eq!(rows[0]["name"], Value::String("rust".into()));
        assert_eq!(rows[0]["createdAt"], Value::Null);
    }

    #[tokio::test]
    async fn test_errors_map_to_query_errors() {
        let engine = engine().await;
        let err = engine
            .query("SELECT * FROM missing", Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.code, eloquent_query::ErrorCode::DatabaseError);

        engine
            .execute("INSERT INTO tags (name) VALUES (?)", vec!["x".into()])
            .await
            .unwrap();
        let err = engine
            .execute("INSERT INTO tags (name) VALUES (?)", vec!["x".into()])
            .await
            .unwrap_err();
        assert!(err.message.contains("UNIQUE"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_report_their_own_ids() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SqliteEngine::connect(SqliteConfig::file(dir.path().join("ids.db")))
            .await
            .unwrap();
        engine
            .execute_batch("CREATE TABLE tags (id INTEGER PRIMARY KEY, name TEXT NOT NULL);")
            .await
            .unwrap();

        let mut handles = Vec::new();
        for writer in 0..8 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                let names: Vec<Value> =
                    (0..3).map(|n| Value::from(format!("w{}-{}", writer, n))).collect();
                let outcome = engine
                    .insert("tags", "INSERT INTO tags (name) VALUES (?), (?), (?)", names)
                    .await
                    .unwrap();
                (writer, outcome.first_id.unwrap())
            }));
        }

        for handle in handles {
            let (writer, first_id) = handle.await.unwrap();
            let rows = engine
                .fetch(
                    "SELECT name FROM tags WHERE id >= ? AND id < ? ORDER BY id",
                    vec![first_id.into(), (first_id + 3).into()],
                )
                .await
                .unwrap();
            let names: Vec<Value> = rows.into_iter().map(|row| row["name"].clone()).collect();
            let expected: Vec<Value> =
                (0..3).map(|n| Value::from(format!("w{}-{}", writer, n))).collect();
            assert_eq!(names, expected);
        }
    }
}
