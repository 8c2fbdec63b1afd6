//! # eloquent-query
//!
//! Relation-aware querying on top of a plain SQL engine.
//!
//! This crate provides:
//! - Eager loading of nested, aliased relation paths (`with`)
//! - Relation existence and count filters (`where_has`, `where_has_count`)
//! - Relation count columns (`with_count`)
//! - Bulk inserts that hand back generated ids
//! - Matching in-memory rows to stored rows by unique keys (`select_by`,
//!   `insert_by`)
//!
//! ## Models
//!
//! Models and their relations are declared up front:
//!
//! ```rust
//! use eloquent_query::{ModelDef, Schema};
//!
//! let schema = Schema::new()
//!     .model(
//!         ModelDef::new("User", "users")
//!             .soft_delete("deletedAt")
//!             .has_many("posts", "Post", "createdById")
//!             .belongs_to_many("roles", "Role", "user_has_roles", "userId", "roleId"),
//!     )
//!     .model(ModelDef::new("Post", "posts").belongs_to("createdBy", "User", "createdById"))
//!     .model(ModelDef::new("Role", "roles"));
//!
//! let user = schema.get("User").unwrap();
//! let chain = schema.resolve_chain(&user, ["posts", "createdBy"]).unwrap();
//! assert_eq!(chain[1].target.table(), "users");
//! ```
//!
//! ## Relation paths
//!
//! ```rust
//! use eloquent_query::RelationPath;
//!
//! let path = RelationPath::parse("posts.comments as p.c").unwrap();
//! assert_eq!(path.segments()[1].alias, "c");
//! assert!(RelationPath::parse("posts.comments as p").is_err());
//! ```
//!
//! ## Queries
//!
//! ```rust,ignore
//! let client = Eloquent::new(engine, schema);
//!
//! let users = client
//!     .query("User")?
//!     .where_has("posts.comments")?
//!     .with("roles.roles")?
//!     .with_count("posts")?
//!     .get()
//!     .await?;
//!
//! let roles = users.records()[0].many("roles");
//! ```
//!
//! ## Bulk writes
//!
//! ```rust,ignore
//! let mut tags = client.collection("Tag")?;
//! tags.push(Record::from_pairs([("name", "rust")]));
//!
//! let writer = client.bulk("Tag")?;
//! writer.insert_by(&mut tags, &["name"], &[]).await?;
//! assert!(tags.records()[0].has("id"));
//! ```

pub mod bulk;
pub mod client;
pub mod config;
pub mod eager;
pub mod engine;
pub mod error;
pub mod filter;
pub mod logging;
pub mod model;
pub mod operator;
pub mod path;
pub mod query;
pub mod record;
mod relation_filter;
pub mod select;
pub mod sql;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;
pub mod value;

pub use bulk::{BulkWriter, RowIdentity, Serializer};
pub use client::Eloquent;
pub use config::{EloquentConfig, StorageQuirks, TimestampPrecision};
pub use eager::EagerLoadSpec;
pub use engine::{BoxFuture, InsertOutcome, QueryEngine, Row};
pub use error::{ErrorCode, ErrorContext, QueryError, QueryResult, Suggestion};
pub use filter::{Filter, KeySource};
pub use model::{
    JoinTable, ModelDef, RelationDef, RelationDescriptor, RelationKind, Schema,
};
pub use operator::{Comparison, IntoOperands, Operand, Operator};
pub use path::{Constraint, IntoRelations, PathSegment, RelationPath, Relations, constraint};
pub use query::Query;
pub use record::{Collection, Record, Related};
pub use select::{SelectItem, SelectQuery};
pub use sql::{Dialect, SqlBuilder};
pub use types::{OrderByField, SortOrder};
pub use value::{DATETIME_FORMAT, Key, Value, parse_datetime};

// Re-export logging utilities
pub use logging::{get_log_format, get_log_level, init as init_logging, init_with_level, is_debug_enabled};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::bulk::{BulkWriter, Serializer};
    pub use crate::client::Eloquent;
    pub use crate::config::EloquentConfig;
    pub use crate::engine::QueryEngine;
    pub use crate::error::{QueryError, QueryResult};
    pub use crate::filter::Filter;
    pub use crate::model::{ModelDef, RelationDef, Schema};
    pub use crate::path::{IntoRelations, Relations, constraint};
    pub use crate::query::Query;
    pub use crate::record::{Collection, Record, Related};
    pub use crate::sql::Dialect;
    pub use crate::types::SortOrder;
    pub use crate::value::Value;
}
