//! Test doubles: a recording [`MockEngine`] and a small blog schema.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::client::Eloquent;
use crate::config::EloquentConfig;
use crate::engine::{BoxFuture, InsertOutcome, QueryEngine, Row};
use crate::error::QueryResult;
use crate::model::{ModelDef, RelationDef, Schema};
use crate::sql::Dialect;
use crate::value::Value;

#[derive(Default)]
struct MockState {
    statements: Vec<(String, Vec<Value>)>,
    responses: Vec<(String, Vec<Row>)>,
    insert_outcome: InsertOutcome,
}

/// An engine that records statements and answers from canned rows.
///
/// A SELECT returns the rows of the first response whose pattern occurs in
/// the SQL, or nothing.
#[derive(Clone, Default)]
pub struct MockEngine {
    dialect: Dialect,
    state: Arc<Mutex<MockState>>,
}

impl MockEngine {
    /// A SQLite-flavoured mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock for another dialect.
    pub fn with_dialect(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }

    /// Build a row from pairs.
    pub fn row<const N: usize>(pairs: [(&str, Value); N]) -> Row {
        pairs
            .into_iter()
            .map(|(column, value)| (column.to_string(), value))
            .collect()
    }

    /// Answer SELECTs containing `pattern` with `rows`.
    pub fn respond(&self, pattern: impl Into<String>, rows: Vec<Row>) {
        self.state.lock().responses.push((pattern.into(), rows));
    }

    /// Outcome reported by every insert.
    pub fn insert_outcome(&self, outcome: InsertOutcome) {
        self.state.lock().insert_outcome = outcome;
    }

    /// Every statement run so far.
    pub fn statements(&self) -> Vec<(String, Vec<Value>)> {
        self.state.lock().statements.clone()
    }

    /// Number of statements run.
    pub fn statement_count(&self) -> usize {
        self.state.lock().statements.len()
    }

    /// The most recent statement.
    pub fn last_statement(&self) -> Option<(String, Vec<Value>)> {
        self.state.lock().statements.last().cloned()
    }

    fn record(&self, sql: &str, params: Vec<Value>) {
        self.state.lock().statements.push((sql.to_string(), params));
    }
}

impl QueryEngine for MockEngine {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn query(&self, sql: &str, params: Vec<Value>) -> BoxFuture<'_, QueryResult<Vec<Row>>> {
        self.record(sql, params);
        let rows = self
            .state
            .lock()
            .responses
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default();
        Box::pin(async move { Ok(rows) })
    }

    fn execute(&self, sql: &str, params: Vec<Value>) -> BoxFuture<'_, QueryResult<u64>> {
        self.record(sql, params);
        Box::pin(async { Ok(0) })
    }

    fn insert(
        &self,
        _table: &str,
        sql: &str,
        params: Vec<Value>,
    ) -> BoxFuture<'_, QueryResult<InsertOutcome>> {
        self.record(sql, params);
        let outcome = self.state.lock().insert_outcome;
        Box::pin(async move { Ok(outcome) })
    }
}

/// Users, roles, posts, comments and tags, plus two relation-free tables.
///
/// Users and posts soft-delete through `deletedAt`; roles relate to users
/// and to each other through join tables. `Empty` stamps `createdAt` and
/// `updatedAt` on insert; `EmptySoftDelete` soft-deletes.
pub fn blog_schema() -> Schema {
    Schema::new()
        .model(
            ModelDef::new("User", "users")
                .soft_delete("deletedAt")
                .has_many("posts", "Post", "createdById")
                .has_many("comments", "Comment", "createdById")
                .belongs_to_many("roles", "Role", "user_has_roles", "userId", "roleId"),
        )
        .model(
            ModelDef::new("Role", "roles")
                .belongs_to_many("roles", "Role", "role_has_roles", "fromRoleId", "toRoleId")
                .belongs_to_many("users", "User", "user_has_roles", "roleId", "userId"),
        )
        .model(
            ModelDef::new("Post", "posts")
                .soft_delete("deletedAt")
                .belongs_to("createdBy", "User", "createdById")
                .has_many("comments", "Comment", "postId")
                .belongs_to_many("tags", "Tag", "post_has_tags", "postId", "tagId")
                .relation(
                    "relatedPosts",
                    RelationDef::HasMany {
                        target: "Post".into(),
                        foreign_key: "createdById".into(),
                        source_key: Some("createdById".into()),
                    },
                ),
        )
        .model(
            ModelDef::new("Comment", "comments")
                .belongs_to("post", "Post", "postId")
                .belongs_to("createdBy", "User", "createdById"),
        )
        .model(ModelDef::new("Tag", "tags"))
        .model(ModelDef::new("Empty", "empty").timestamps("createdAt", "updatedAt"))
        .model(ModelDef::new("EmptySoftDelete", "empty_soft_delete").soft_delete("deletedAt"))
}

/// A client over `engine` and [`blog_schema`].
pub fn client(engine: MockEngine) -> Eloquent {
    Eloquent::new(engine, blog_schema())
}

/// A client over `engine` and [`blog_schema`] with a configuration.
///
/// The engine takes the configured dialect.
pub fn client_with(engine: MockEngine, config: EloquentConfig) -> QueryResult<Eloquent> {
    let engine = MockEngine {
        dialect: config.dialect,
        ..engine
    };
    Eloquent::with_config(engine, blog_schema(), config)
}
