//! # Eloquent
//!
//! Relation-aware querying and bulk row matching over SQL databases.
//!
//! Eloquent provides:
//! - Eager loading of nested, aliased relation paths
//! - `where_has` / `with_count` filters built as correlated subqueries
//! - Bulk inserts that hand generated ids back to in-memory rows
//! - `select_by` / `insert_by` matching rows to storage by unique keys
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use eloquent::prelude::*;
//! use eloquent::sqlite::SqliteEngine;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = SqliteEngine::memory().await?;
//!     let schema = Schema::new()
//!         .model(ModelDef::new("User", "users").has_many("posts", "Post", "createdById"))
//!         .model(ModelDef::new("Post", "posts").belongs_to("createdBy", "User", "createdById"));
//!     let client = Eloquent::new(engine, schema);
//!
//!     let users = client
//!         .query("User")?
//!         .where_has("posts")?
//!         .with("posts as articles")?
//!         .get()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Query building, eager loading and bulk writes.
pub mod query {
    pub use eloquent_query::*;
}

/// The SQLite engine.
pub mod sqlite {
    pub use eloquent_sqlite::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use eloquent_query::prelude::*;
}

// Re-export key types at the crate root
pub use eloquent_query::{Eloquent, QueryError, QueryResult};
