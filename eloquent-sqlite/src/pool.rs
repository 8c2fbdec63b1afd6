//! Connection pool for SQLite.
//!
//! File databases keep a queue of idle connections and reuse them. An
//! in-memory database lives as long as its one connection, so every
//! checkout of a memory pool shares that connection.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_rusqlite::Connection;
use tracing::{debug, info, trace};

use crate::config::SqliteConfig;
use crate::connection::{IdleQueue, PooledConnection, SqliteConnection};
use crate::error::{SqliteError, SqliteResult};

/// A connection pool for SQLite.
///
/// ```rust,ignore
/// let pool = SqlitePool::new(SqliteConfig::file("data.db")).await?;
/// let conn = pool.get().await?;
/// // returned to the pool when dropped
/// ```
#[derive(Clone)]
pub struct SqlitePool {
    config: Arc<SqliteConfig>,
    pool_config: Arc<PoolConfig>,
    semaphore: Arc<Semaphore>,
    idle: IdleQueue,
    /// The single connection of an in-memory database.
    shared: Option<Connection>,
    stats: Arc<Mutex<PoolStats>>,
}

/// Statistics about pool usage.
#[derive(Debug, Default, Clone)]
pub struct PoolStats {
    /// Number of connection reuses.
    pub reuses: u64,
    /// Number of new connections opened.
    pub opens: u64,
    /// Number of idle connections closed for age.
    pub expirations: u64,
}

impl SqlitePool {
    /// Create a pool with default pool settings.
    pub async fn new(config: SqliteConfig) -> SqliteResult<Self> {
        Self::with_pool_config(config, PoolConfig::default()).await
    }

    /// Create a pool with explicit pool settings.
    pub async fn with_pool_config(
        config: SqliteConfig,
        pool_config: PoolConfig,
    ) -> SqliteResult<Self> {
        if pool_config.max_connections == 0 {
            return Err(SqliteError::config("max_connections must be at least 1"));
        }
        info!(
            path = %config.path_str(),
            max_connections = %pool_config.max_connections,
            "SQLite connection pool created"
        );

        // Fails fast on a bad path; an in-memory pool keeps this one.
        let first = Self::open_connection(&config).await?;
        let mut idle = VecDeque::with_capacity(pool_config.max_connections);
        let shared = if config.path.is_memory() {
            Some(first)
        } else {
            idle.push_back(PooledConnection::new(first));
            None
        };

        Ok(Self {
            config: Arc::new(config),
            semaphore: Arc::new(Semaphore::new(pool_config.max_connections)),
            pool_config: Arc::new(pool_config),
            idle: Arc::new(Mutex::new(idle)),
            shared,
            stats: Arc::new(Mutex::new(PoolStats {
                opens: 1,
                ..PoolStats::default()
            })),
        })
    }

    async fn open_connection(config: &SqliteConfig) -> SqliteResult<Connection> {
        let init_sql = config.init_sql();

        let conn = if config.path.is_memory() {
            Connection::open_in_memory().await?
        } else {
            Connection::open(config.path_str()).await?
        };

        conn.call(move |conn| {
            conn.execute_batch(&init_sql)?;
            Ok(())
        })
        .await?;

        Ok(conn)
    }

    fn take_idle(&self) -> Option<PooledConnection> {
        let mut idle = self.idle.lock();
        let mut stats = self.stats.lock();
        while let Some(pooled) = idle.pop_front() {
            let too_old = self
                .pool_config
                .max_lifetime
                .is_some_and(|lifetime| pooled.created_at.elapsed() > lifetime);
            let idle_too_long = self
                .pool_config
                .idle_timeout
                .is_some_and(|timeout| pooled.last_used.elapsed() > timeout);

            if too_old || idle_too_long {
                stats.expirations += 1;
                continue;
            }
            stats.reuses += 1;
            return Some(pooled);
        }
        None
    }

    /// Check out a connection.
    ///
    /// Waits up to the configured connection timeout for a free slot.
    pub async fn get(&self) -> SqliteResult<SqliteConnection> {
        trace!("Acquiring connection from pool");

        let acquire = self.semaphore.clone().acquire_owned();
        let permit = match self.pool_config.connection_timeout {
            Some(timeout) => tokio::time::timeout(timeout, acquire)
                .await
                .map_err(|_| SqliteError::PoolExhausted(self.pool_config.max_connections))?,
            None => acquire.await,
        }
        .map_err(|e| SqliteError::pool(format!("failed to acquire permit: {}", e)))?;

        if let Some(shared) = &self.shared {
            return Ok(SqliteConnection::new(
                shared.clone(),
                permit,
                None,
                Instant::now(),
            ));
        }

        if let Some(pooled) = self.take_idle() {
            return Ok(SqliteConnection::new(
                pooled.conn,
                permit,
                Some(self.idle.clone()),
                pooled.created_at,
            ));
        }

        debug!("No idle connections, opening new connection");
        let conn = Self::open_connection(&self.config).await?;
        self.stats.lock().opens += 1;
        Ok(SqliteConnection::new(
            conn,
            permit,
            Some(self.idle.clone()),
            Instant::now(),
        ))
    }

    /// Get the database configuration.
    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Get the pool settings.
    pub fn pool_config(&self) -> &PoolConfig {
        &self.pool_config
    }

    /// Get pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.stats.lock().clone()
    }

    /// Number of connections that can still be checked out.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Number of idle connections in the pool.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }
}

/// Pool settings.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of concurrent checkouts.
    pub max_connections: usize,
    /// How long to wait for a free connection.
    pub connection_timeout: Option<Duration>,
    /// Maximum idle time before a connection is closed.
    pub idle_timeout: Option<Duration>,
    /// Maximum lifetime of a connection before it is recycled.
    pub max_lifetime: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            connection_timeout: Some(Duration::from_secs(30)),
            idle_timeout: Some(Duration::from_secs(300)),
            max_lifetime: Some(Duration::from_secs(1800)),
        }
    }
}

impl PoolConfig {
    /// Set the maximum number of connections.
    pub fn max_connections(mut self, n: usize) -> Self {
        self.max_connections = n;
        self
    }

    /// Set the connection timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_pool_shares_one_database() {
        let pool = SqlitePool::new(SqliteConfig::memory()).await.unwrap();
        {
            let conn = pool.get().await.unwrap();
            conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY)")
                .await
                .unwrap();
        }
        let conn = pool.get().await.unwrap();
        let rows = conn.query("SELECT * FROM t", Vec::new()).await.unwrap();
        assert!(rows.is_empty());
        assert_eq!(pool.stats().opens, 1);
    }

    #[tokio::test]
    async fn test_file_pool_reuses_connections() {
        let dir = tempfile::tempdir().unwrap();
        let pool = SqlitePool::new(SqliteConfig::file(dir.path().join("pool.db")))
            .await
            .unwrap();

        drop(pool.get().await.unwrap());
        drop(pool.get().await.unwrap());

        let stats = pool.stats();
        assert_eq!(stats.opens, 1);
        assert_eq!(stats.reuses, 2);
        assert_eq!(pool.idle_count(), 1);
    }

    #[tokio::test]
    async fn test_pool_exhausted() {
        let pool = SqlitePool::with_pool_config(
            SqliteConfig::memory(),
            PoolConfig::default()
                .max_connections(1)
                .connection_timeout(Duration::from_millis(10)),
        )
        .await
        .unwrap();

        let _held = pool.get().await.unwrap();
        assert!(matches!(pool.get().await, Err(SqliteError::PoolExhausted(1))));
    }

    #[tokio::test]
    async fn test_zero_connections_rejected() {
        let result = SqlitePool::with_pool_config(
            SqliteConfig::memory(),
            PoolConfig::default().max_connections(0),
        )
        .await;
        assert!(matches!(result, Err(SqliteError::Config(_))));
    }
}
