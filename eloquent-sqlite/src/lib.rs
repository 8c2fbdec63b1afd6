//! SQLite engine for eloquent.
//!
//! Runs the SQL rendered by `eloquent-query` on SQLite through
//! `tokio-rusqlite`, and reports the first generated id of multi-row
//! inserts so bulk writers can hand ids back to their rows.
//!
//! # Example
//!
//! ```rust,ignore
//! use eloquent_query::Eloquent;
//! use eloquent_sqlite::{SqliteConfig, SqliteEngine};
//!
//! let engine = SqliteEngine::connect(SqliteConfig::from_url("sqlite://./app.db")?).await?;
//! engine.execute_batch("CREATE TABLE IF NOT EXISTS tags (id INTEGER PRIMARY KEY, name TEXT)").await?;
//!
//! let client = Eloquent::new(engine, schema);
//! ```

pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod pool;
pub mod types;

pub use config::{DatabasePath, JournalMode, SqliteConfig, SynchronousMode};
pub use connection::SqliteConnection;
pub use engine::SqliteEngine;
pub use error::{SqliteError, SqliteResult};
pub use pool::{PoolConfig, PoolStats, SqlitePool};
