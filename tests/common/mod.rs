//! A seeded in-memory blog database shared by the integration tests.

#![allow(dead_code)]

use eloquent::query::testing::blog_schema;
use eloquent::query::{Eloquent, Record, Value};
use eloquent::sqlite::SqliteEngine;

pub const SCHEMA: &str = r#"
CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, deletedAt TEXT);
CREATE TABLE roles (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
CREATE TABLE user_has_roles (userId INTEGER NOT NULL, roleId INTEGER NOT NULL);
CREATE TABLE role_has_roles (fromRoleId INTEGER NOT NULL, toRoleId INTEGER NOT NULL);
CREATE TABLE posts (id INTEGER PRIMARY KEY, title TEXT NOT NULL, createdById INTEGER, deletedAt TEXT);
CREATE TABLE comments (id INTEGER PRIMARY KEY, postId INTEGER, createdById INTEGER, body TEXT);
CREATE TABLE tags (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE, weight INTEGER);
CREATE TABLE empty (id INTEGER PRIMARY KEY, code TEXT, rank INTEGER, createdAt TEXT, updatedAt TEXT);
CREATE TABLE empty_soft_delete (id INTEGER PRIMARY KEY, code TEXT, deletedAt TEXT);
"#;

/// Four users (dave soft-deleted), three roles with a role hierarchy, four
/// posts (one soft-deleted) and four comments.
pub const SEED: &str = r#"
INSERT INTO users (id, name, deletedAt) VALUES
    (1, 'alice', NULL), (2, 'bob', NULL), (3, 'carol', NULL), (4, 'dave', '2024-01-01 00:00:00.000');
INSERT INTO roles (id, name) VALUES (1, 'admin'), (2, 'editor'), (3, 'viewer');
INSERT INTO user_has_roles (userId, roleId) VALUES (1, 1), (1, 2), (2, 3);
INSERT INTO role_has_roles (fromRoleId, toRoleId) VALUES (1, 2), (1, 3), (2, 3);
INSERT INTO posts (id, title, createdById, deletedAt) VALUES
    (1, 'Hello', 1, NULL), (2, 'Rust tips', 1, NULL),
    (3, 'Draft', 2, '2024-01-01 00:00:00.000'), (4, 'News', 3, NULL);
INSERT INTO comments (id, postId, createdById, body) VALUES
    (1, 1, 2, 'nice'), (2, 1, 3, 'agreed'), (3, 2, 2, 'useful'), (4, 4, 1, 'thanks');
"#;

pub async fn seeded() -> (Eloquent, SqliteEngine) {
    let engine = SqliteEngine::memory().await.expect("open database");
    engine.execute_batch(SCHEMA).await.expect("create schema");
    engine.execute_batch(SEED).await.expect("seed");
    (Eloquent::new(engine.clone(), blog_schema()), engine)
}

pub fn int(record: &Record, column: &str) -> i64 {
    record
        .get(column)
        .and_then(Value::as_i64)
        .unwrap_or_else(|| panic!("{} is not an integer on {:?}", column, record))
}

pub fn ids<'a>(records: impl IntoIterator<Item = &'a Record>) -> Vec<i64> {
    let mut ids: Vec<i64> = records.into_iter().map(|r| int(r, "id")).collect();
    ids.sort_unstable();
    ids
}
