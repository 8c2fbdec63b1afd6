//! Correlated subqueries for `where_has`, `where_has_count` and `with_count`.
//!
//! A path `a.b.c` becomes one SELECT per segment. The leaf segment is the
//! outermost statement; each earlier segment is nested inside the key
//! filter of the next, and the first one correlates to the outer query:
//!
//! ```sql
//! SELECT ... FROM c WHERE c.fk IN (
//!     SELECT b.key FROM b WHERE b.fk IN (
//!         SELECT a.key FROM a WHERE a.fk IN (outer.key)))
//! ```
//!
//! Every table reference in the chain gets a name that is unique across
//! the chain and the enclosing statements, so self-referencing paths such
//! as `roles.roles` correlate to the right rows.

use std::collections::HashSet;
use std::sync::Arc;

use crate::engine::BoxFuture;
use crate::error::{QueryError, QueryResult};
use crate::filter::{Filter, KeySource};
use crate::model::ModelDef;
use crate::path::{Constraint, RelationPath};
use crate::query::{Context, Query};
use crate::select::SelectQuery;

/// The query a relation path is correlated to.
pub(crate) struct Correlation {
    pub ctx: Context,
    pub model: Arc<ModelDef>,
    /// Name the outer table is referenced by.
    pub qualifier: String,
    /// Names already bound by enclosing statements.
    pub reserved: Vec<String>,
}

/// Hands out table aliases that do not collide.
#[derive(Debug, Default)]
pub(crate) struct AliasScope {
    taken: HashSet<String>,
}

impl AliasScope {
    pub(crate) fn new(reserved: impl IntoIterator<Item = String>) -> Self {
        Self {
            taken: reserved.into_iter().collect(),
        }
    }

    /// The table name itself when free, else `{table}_{depth}`, else a
    /// numbered variant of that.
    pub(crate) fn allocate(&mut self, table: &str, depth: usize) -> String {
        if self.taken.insert(table.to_string()) {
            return table.to_string();
        }
        let mut candidate = format!("{}_{}", table, depth);
        let mut n = 1;
        while !self.taken.insert(candidate.clone()) {
            n += 1;
            candidate = format!("{}_{}_{}", table, depth, n);
        }
        candidate
    }

    pub(crate) fn taken(&self) -> Vec<String> {
        self.taken.iter().cloned().collect()
    }
}

/// Build the SELECT over the leaf of `path`, correlated to `outer`.
///
/// `constraint` applies to the leaf; intermediate segments only get their
/// model's default filters. Relation filters inside the constraint are
/// resolved before this returns.
pub(crate) fn build_path_query(
    outer: Correlation,
    path: RelationPath,
    constraint: Option<Constraint>,
) -> BoxFuture<'static, QueryResult<SelectQuery>> {
    Box::pin(async move {
        let chain = outer.ctx.schema.resolve_chain(&outer.model, path.names())?;
        let mut scope = AliasScope::new(
            outer
                .reserved
                .iter()
                .cloned()
                .chain([outer.qualifier.clone()]),
        );
        let last = chain.len().saturating_sub(1);

        let mut previous: Option<SelectQuery> = None;
        for (depth, relation) in chain.iter().enumerate() {
            let source = match previous.take() {
                None => KeySource::Column(format!("{}.{}", outer.qualifier, relation.source_key)),
                Some(inner) => KeySource::Subquery(Box::new(inner.project(&relation.source_key))),
            };

            let alias = scope.allocate(relation.target.table(), depth + 1);
            let source = match &relation.join {
                Some(join) => {
                    let join_alias = scope.allocate(&join.table, depth + 1);
                    let pivot = SelectQuery::new(&join.table)
                        .alias(join_alias.clone())
                        .filter(Filter::InKeys {
                            column: format!("{}.{}", join_alias, join.source_key),
                            source,
                        })
                        .project(&join.target_key);
                    KeySource::Subquery(Box::new(pivot))
                }
                None => source,
            };
            let correlation = Filter::InKeys {
                column: format!("{}.{}", alias, relation.target_key),
                source,
            };

            let mut query = Query::new(outer.ctx.clone(), Arc::clone(&relation.target))
                .aliased(alias, scope.taken());
            if depth == last {
                if let Some(constraint) = &constraint {
                    constraint(&mut query)?;
                }
            }
            query.resolve_pending().await?;
            previous = Some(query.to_select().filter(correlation));
        }

        previous.ok_or_else(|| {
            QueryError::internal(format!("relation path '{}' has no segments", path.text()))
        })
    })
}
