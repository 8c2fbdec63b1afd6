//! Eager loading of relation trees onto fetched records.
//!
//! Every node of the tree issues one query for all parent keys at once,
//! split into concurrent chunks when the keys outnumber the configured chunk
//! size. Sibling nodes load concurrently and nested nodes load as part of
//! their parent's query, so a tree of depth `d` costs `d` round trips.

use std::collections::{HashMap, HashSet};

use futures::future::try_join_all;
use indexmap::IndexMap;

use crate::engine::{BoxFuture, Row};
use crate::error::{QueryError, QueryResult};
use crate::filter::Filter;
use crate::model::{RelationDescriptor, RelationKind};
use crate::path::PathSegment;
use crate::query::Query;
use crate::record::{Collection, Record, Related};
use crate::select::{SelectItem, SelectQuery};
use crate::value::{Key, Value};

/// One node of the eager-load tree.
///
/// The node's query carries its constraint, select list and children.
#[derive(Debug)]
pub struct EagerLoadSpec {
    segment: PathSegment,
    descriptor: RelationDescriptor,
    query: Query,
}

impl EagerLoadSpec {
    pub(crate) fn new(segment: PathSegment, descriptor: RelationDescriptor, query: Query) -> Self {
        Self {
            segment,
            descriptor,
            query,
        }
    }

    /// Relation name.
    pub fn relation(&self) -> &str {
        &self.segment.name
    }

    /// Key the results are attached under.
    pub fn alias(&self) -> &str {
        &self.segment.alias
    }

    /// Resolved relation metadata.
    pub fn descriptor(&self) -> &RelationDescriptor {
        &self.descriptor
    }

    /// The query that loads this node.
    pub fn query(&self) -> &Query {
        &self.query
    }

    pub(crate) fn query_mut(&mut self) -> &mut Query {
        &mut self.query
    }

    /// Nested nodes.
    pub fn children(&self) -> impl Iterator<Item = &EagerLoadSpec> {
        self.query.eager_loads().values()
    }
}

enum Matches {
    Grouped(HashMap<Key, Vec<Record>>),
    Single(HashMap<Key, Record>),
    Pivot {
        links: HashMap<Key, Vec<Key>>,
        targets: HashMap<Key, Record>,
    },
}

struct Loaded {
    alias: String,
    source_key: String,
    target_id: String,
    matches: Matches,
}

fn collect_keys(records: &[Record], descriptor: &RelationDescriptor) -> QueryResult<Vec<Value>> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for record in records {
        let value = record.get(&descriptor.source_key).ok_or_else(|| {
            QueryError::missing_column(
                &descriptor.source_key,
                &descriptor.source_table,
                &descriptor.name,
            )
        })?;
        if let Some(key) = value.key() {
            if seen.insert(key) {
                keys.push(value.clone());
            }
        }
    }
    Ok(keys)
}

fn index_by(records: Vec<Record>, column: &str) -> HashMap<Key, Vec<Record>> {
    let mut index: HashMap<Key, Vec<Record>> = HashMap::new();
    for record in records {
        if let Some(key) = record.get(column).and_then(Value::key) {
            index.entry(key).or_default().push(record);
        }
    }
    index
}

fn load_branch(spec: EagerLoadSpec, keys: Vec<Value>) -> BoxFuture<'static, QueryResult<Loaded>> {
    Box::pin(async move {
        let EagerLoadSpec {
            segment,
            descriptor,
            mut query,
        } = spec;
        let mut loaded = Loaded {
            alias: segment.alias,
            source_key: descriptor.source_key.clone(),
            target_id: descriptor.target.id().to_string(),
            matches: match descriptor.kind {
                RelationKind::OneToOne => Matches::Single(HashMap::new()),
                RelationKind::OneToMany => Matches::Grouped(HashMap::new()),
                RelationKind::ManyToMany => Matches::Pivot {
                    links: HashMap::new(),
                    targets: HashMap::new(),
                },
            },
        };
        if keys.is_empty() {
            return Ok(loaded);
        }

        crate::eloquent_trace!(
            relation = %descriptor.name,
            kind = %descriptor.kind,
            keys = keys.len(),
            "eager load"
        );

        match descriptor.kind {
            RelationKind::OneToOne | RelationKind::OneToMany => {
                query.ensure_selected(&descriptor.target_key);
                let records = query.fetch_where_in(&descriptor.target_key, keys).await?;
                let grouped = index_by(records, &descriptor.target_key);

                loaded.matches = if descriptor.kind == RelationKind::OneToOne {
                    Matches::Single(
                        grouped
                            .into_iter()
                            .filter_map(|(key, mut records)| {
                                if records.is_empty() {
                                    None
                                } else {
                                    Some((key, records.swap_remove(0)))
                                }
                            })
                            .collect(),
                    )
                } else {
                    Matches::Grouped(grouped)
                };
            }
            RelationKind::ManyToMany => {
                let join = descriptor.join.as_ref().ok_or_else(|| {
                    QueryError::internal(format!(
                        "many-to-many relation '{}' has no join table",
                        descriptor.name
                    ))
                })?;

                let pivot = SelectQuery::new(&join.table);
                let pivot_source = pivot.qualify(&join.source_key);
                let pivot = pivot.columns(vec![
                    SelectItem::Column(join.source_key.clone()),
                    SelectItem::Column(join.target_key.clone()),
                ]);
                let chunk_size = query.context().config.bulk_chunk_size.max(1);
                let statements = keys
                    .chunks(chunk_size)
                    .map(|chunk| {
                        pivot
                            .clone()
                            .filter(Filter::in_values(pivot_source.clone(), chunk.to_vec()))
                            .build(query.dialect())
                    })
                    .collect::<QueryResult<Vec<_>>>()?;
                let rows: Vec<Row> = {
                    let engine = query.engine();
                    try_join_all(
                        statements
                            .into_iter()
                            .map(|(sql, params)| async move { engine.query(&sql, params).await }),
                    )
                    .await?
                    .into_iter()
                    .flatten()
                    .collect()
                };

                let mut links: HashMap<Key, Vec<Key>> = HashMap::new();
                let mut target_keys = Vec::new();
                let mut seen = HashSet::new();
                for row in rows {
                    let source = row.get(&join.source_key).and_then(Value::key);
                    let target = row.get(&join.target_key);
                    if let (Some(source), Some(target)) = (source, target) {
                        if let Some(key) = target.key() {
                            if seen.insert(key.clone()) {
                                target_keys.push(target.clone());
                            }
                            links.entry(source).or_default().push(key);
                        }
                    }
                }

                let mut targets = HashMap::new();
                if !target_keys.is_empty() {
                    query.ensure_selected(&descriptor.target_key);
                    for record in query.fetch_where_in(&descriptor.target_key, target_keys).await? {
                        if let Some(key) = record.get(&descriptor.target_key).and_then(Value::key) {
                            targets.insert(key, record);
                        }
                    }
                }
                loaded.matches = Matches::Pivot { links, targets };
            }
        }
        Ok(loaded)
    })
}

fn attach(records: &mut [Record], loaded: Loaded) {
    for record in records.iter_mut() {
        let key = record.get(&loaded.source_key).and_then(Value::key);
        let related = match &loaded.matches {
            Matches::Grouped(index) => {
                let rows = key
                    .and_then(|k| index.get(&k))
                    .cloned()
                    .unwrap_or_default();
                Related::Many(Collection::from_records(&loaded.target_id, rows))
            }
            Matches::Single(index) => {
                Related::One(key.and_then(|k| index.get(&k)).cloned().map(Box::new))
            }
            Matches::Pivot { links, targets } => {
                // Join rows pointing at filtered-out targets are dropped.
                let rows = key
                    .and_then(|k| links.get(&k))
                    .map(|linked| {
                        linked
                            .iter()
                            .filter_map(|target| targets.get(target).cloned())
                            .collect()
                    })
                    .unwrap_or_default();
                Related::Many(Collection::from_records(&loaded.target_id, rows))
            }
        };
        record.set_relation(loaded.alias.clone(), related);
    }
}

/// Load every node in `specs` onto `records`.
///
/// Records missing a node's source key column fail with a missing-column
/// error; null keys simply relate to nothing.
pub(crate) fn load(
    records: &mut [Record],
    specs: IndexMap<String, EagerLoadSpec>,
) -> BoxFuture<'_, QueryResult<()>> {
    Box::pin(async move {
        if specs.is_empty() || records.is_empty() {
            return Ok(());
        }

        let mut branches = Vec::with_capacity(specs.len());
        for spec in specs.into_values() {
            let keys = collect_keys(records, spec.descriptor())?;
            branches.push(load_branch(spec, keys));
        }

        for loaded in try_join_all(branches).await? {
            attach(records, loaded);
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockEngine, client};
    use pretty_assertions::assert_eq;

    fn user(id: i64) -> Record {
        Record::from_pairs([("id", Value::Int(id)), ("name", Value::from(format!("u{}", id)))])
    }

    #[tokio::test]
    async fn test_one_to_many_groups_by_foreign_key() {
        let engine = MockEngine::new();
        engine.respond(
            "FROM posts",
            vec![
                MockEngine::row([("id", Value::Int(10)), ("createdById", Value::Int(1))]),
                MockEngine::row([("id", Value::Int(11)), ("createdById", Value::Int(1))]),
                MockEngine::row([("id", Value::Int(12)), ("createdById", Value::Int(2))]),
            ],
        );
        let client = client(engine.clone());
        let mut records = vec![user(1), user(2), user(3)];
        client.load("User", &mut records, "posts").await.unwrap();

        let counts: Vec<_> = records.iter().map(|r| r.many("posts").unwrap().len()).collect();
        assert_eq!(counts, [2, 1, 0]);

        let (sql, params) = engine.last_statement().unwrap();
        assert!(sql.contains("posts.\"createdById\" IN (?, ?, ?)"), "{}", sql);
        assert_eq!(params.len(), 3);
    }

    #[tokio::test]
    async fn test_belongs_to_skips_null_keys() {
        let engine = MockEngine::new();
        engine.respond("FROM users", vec![user(1).attributes().clone()]);
        let client = client(engine.clone());

        let mut posts = vec![
            Record::from_pairs([("id", Value::Int(10)), ("createdById", Value::Int(1))]),
            Record::from_pairs([("id", Value::Int(11)), ("createdById", Value::Null)]),
        ];
        client.load("Post", &mut posts, "createdBy").await.unwrap();

        assert_eq!(posts[0].one("createdBy").and_then(|u| u.get("id")), Some(&Value::Int(1)));
        assert_eq!(posts[1].relation("createdBy"), Some(&Related::One(None)));
        let (_, params) = engine.last_statement().unwrap();
        assert_eq!(params, vec![Value::Int(1)]);
    }

    #[tokio::test]
    async fn test_missing_source_column_is_an_error() {
        let client = client(MockEngine::new());
        let mut posts = vec![Record::from_pairs([("id", Value::Int(10))])];
        let err = client.load("Post", &mut posts, "createdBy").await.unwrap_err();
        assert!(err.is_missing_column());
    }

    #[tokio::test]
    async fn test_many_to_many_goes_through_the_join_table() {
        let engine = MockEngine::new();
        engine.respond(
            "FROM user_has_roles",
            vec![
                MockEngine::row([("userId", Value::Int(1)), ("roleId", Value::Int(5))]),
                MockEngine::row([("userId", Value::Int(1)), ("roleId", Value::Int(6))]),
                MockEngine::row([("userId", Value::Int(2)), ("roleId", Value::Int(5))]),
            ],
        );
        engine.respond(
            "FROM roles",
            vec![MockEngine::row([("id", Value::Int(5)), ("name", Value::from("admin"))])],
        );
        let client = client(engine.clone());
        let mut records = vec![user(1), user(2)];
        client.load("User", &mut records, "roles").await.unwrap();

        // Role 6 is linked but not returned, so it is dropped.
        assert_eq!(records[0].many("roles").unwrap().len(), 1);
        assert_eq!(records[1].many("roles").unwrap().len(), 1);
        assert_eq!(engine.statement_count(), 2);
    }

    #[tokio::test]
    async fn test_nested_paths_issue_one_query_per_level() {
        let engine = MockEngine::new();
        engine.respond(
            "FROM posts",
            vec![MockEngine::row([("id", Value::Int(10)), ("createdById", Value::Int(1))])],
        );
        engine.respond(
            "FROM comments",
            vec![MockEngine::row([("id", Value::Int(100)), ("postId", Value::Int(10))])],
        );
        let client = client(engine.clone());
        let mut records = vec![user(1)];
        client
            .load("User", &mut records, ["posts.comments", "posts as p"])
            .await
            .unwrap();

        let posts = records[0].many("posts").unwrap();
        assert_eq!(posts.records()[0].many("comments").unwrap().len(), 1);
        assert!(records[0].many("p").is_some());
        assert_eq!(engine.statement_count(), 3);
    }

    #[tokio::test]
    async fn test_keys_are_split_into_chunks() {
        let engine = MockEngine::new();
        engine.respond(
            "FROM user_has_roles",
            (1..=5)
                .map(|id| MockEngine::row([("userId", Value::Int(id)), ("roleId", Value::Int(id))]))
                .collect(),
        );
        let client = crate::testing::client_with(
            engine.clone(),
            crate::EloquentConfig::default().bulk_chunk_size(2),
        )
        .unwrap();
        let mut records: Vec<Record> = (1..=5).map(user).collect();
        client.load("User", &mut records, ["posts", "roles"]).await.unwrap();

        let mut sizes: Vec<(String, usize)> = engine
            .statements()
            .into_iter()
            .map(|(sql, params)| {
                let table = sql.split(" FROM ").nth(1).and_then(|rest| rest.split(' ').next());
                (table.unwrap_or_default().to_string(), params.len())
            })
            .collect();
        sizes.sort();
        assert_eq!(
            sizes,
            [
                ("posts".to_string(), 1),
                ("posts".to_string(), 2),
                ("posts".to_string(), 2),
                ("roles".to_string(), 1),
                ("roles".to_string(), 2),
                ("roles".to_string(), 2),
                ("user_has_roles".to_string(), 1),
                ("user_has_roles".to_string(), 2),
                ("user_has_roles".to_string(), 2),
            ]
        );
    }
}
