//! The query state container and its chainable API.
//!
//! A [`Query`] targets one model. Plain WHERE methods update the filter
//! immediately. Relation methods (`with`, `where_has`, `with_count`)
//! validate their paths on the spot and schedule the work of building
//! subqueries; everything scheduled is awaited together the first time
//! the query is executed or rendered.
//!
//! ```rust,ignore
//! let users = client
//!     .query("User")?
//!     .where_has(("posts", |q: &mut Query| {
//!         q.where_like("title", "%rust%");
//!         Ok(())
//!     }))?
//!     .with("roles.roles")?
//!     .with_count("posts.comments")?
//!     .order_by("id", SortOrder::Asc)
//!     .get()
//!     .await?;
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::try_join_all;
use indexmap::IndexMap;

use crate::config::EloquentConfig;
use crate::eager::{self, EagerLoadSpec};
use crate::engine::{BoxFuture, QueryEngine};
use crate::error::{QueryError, QueryResult};
use crate::filter::Filter;
use crate::model::{ModelDef, Schema};
use crate::operator::{Comparison, IntoOperands, Operand, Operator};
use crate::path::{Constraint, IntoRelations, PathSegment, RelationPath};
use crate::record::{Collection, Record};
use crate::relation_filter::{self, Correlation};
use crate::select::{SelectItem, SelectQuery};
use crate::sql::{Dialect, SqlBuilder};
use crate::types::{OrderByField, SortOrder};
use crate::value::Value;

static NEXT_SLOT: AtomicU64 = AtomicU64::new(1);

fn next_slot() -> u64 {
    NEXT_SLOT.fetch_add(1, Ordering::Relaxed)
}

/// Handles shared by every query a client creates.
#[derive(Clone)]
pub(crate) struct Context {
    pub engine: Arc<dyn QueryEngine>,
    pub schema: Arc<Schema>,
    pub config: Arc<EloquentConfig>,
}

/// How a new condition joins the existing filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conjunction {
    And,
    Or,
}

enum Slot {
    Filter(u64),
    CountColumn,
}

enum Resolved {
    Filter(Filter),
    Column(SelectItem),
}

struct PendingTask {
    slot: Slot,
    task: BoxFuture<'static, QueryResult<Resolved>>,
}

#[derive(Default)]
struct QueryState {
    columns: Option<Vec<String>>,
    filter: Filter,
    order_by: Vec<OrderByField>,
    limit: Option<u64>,
    offset: Option<u64>,
    with_deleted: bool,
    eager: IndexMap<String, EagerLoadSpec>,
    pending: Vec<PendingTask>,
    count_columns: Vec<SelectItem>,
}

/// A query against one model.
pub struct Query {
    ctx: Context,
    model: Arc<ModelDef>,
    alias: Option<String>,
    reserved: Vec<String>,
    state: QueryState,
}

impl Query {
    pub(crate) fn new(ctx: Context, model: Arc<ModelDef>) -> Self {
        Self {
            ctx,
            model,
            alias: None,
            reserved: Vec::new(),
            state: QueryState::default(),
        }
    }

    /// A query whose table is referenced as `alias`, nested under
    /// statements that already use the `reserved` names.
    pub(crate) fn aliased(mut self, alias: String, reserved: Vec<String>) -> Self {
        self.alias = Some(alias);
        self.reserved = reserved;
        self
    }

    /// Fresh query over the same model and alias, sharing nothing else.
    fn sibling(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            model: Arc::clone(&self.model),
            alias: self.alias.clone(),
            reserved: self.reserved.clone(),
            state: QueryState::default(),
        }
    }

    /// The target model.
    pub fn model(&self) -> &ModelDef {
        &self.model
    }

    pub(crate) fn context(&self) -> &Context {
        &self.ctx
    }

    pub(crate) fn dialect(&self) -> Dialect {
        self.ctx.config.dialect
    }

    pub(crate) fn engine(&self) -> &dyn QueryEngine {
        self.ctx.engine.as_ref()
    }

    /// Name the target table is referenced by.
    pub fn qualifier(&self) -> &str {
        self.alias.as_deref().unwrap_or(self.model.table())
    }

    /// Qualify a bare column with [`Query::qualifier`].
    pub fn qualify(&self, column: &str) -> String {
        if column.contains('.') {
            column.to_string()
        } else {
            format!("{}.{}", self.qualifier(), column)
        }
    }

    /// Restricted select list, if any.
    pub fn selected_columns(&self) -> Option<&[String]> {
        self.state.columns.as_deref()
    }

    /// The current filter tree.
    pub fn filter(&self) -> &Filter {
        &self.state.filter
    }

    /// Eager-load specs keyed by alias.
    pub fn eager_loads(&self) -> &IndexMap<String, EagerLoadSpec> {
        &self.state.eager
    }

    /// Number of relation subqueries still being built.
    pub fn pending_count(&self) -> usize {
        self.state.pending.len()
    }

    // ---- select list and paging ----

    /// Restrict the select list. Repeated columns are kept once.
    pub fn select<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for column in columns {
            self.ensure_column(&column.into());
        }
        self
    }

    /// Add `column` to the select list, restricting it if needed.
    pub(crate) fn ensure_column(&mut self, column: &str) {
        match &mut self.state.columns {
            Some(columns) => {
                if !columns.iter().any(|c| c == column) {
                    columns.push(column.to_string());
                }
            }
            None => self.state.columns = Some(vec![column.to_string()]),
        }
    }

    /// Add `column` only when the select list is restricted.
    pub(crate) fn ensure_selected(&mut self, column: &str) {
        if self.state.columns.is_some() {
            self.ensure_column(column);
        }
    }

    /// Append an ORDER BY term.
    pub fn order_by(&mut self, column: impl Into<String>, order: SortOrder) -> &mut Self {
        self.state.order_by.push(OrderByField::new(column, order));
        self
    }

    /// Limit the number of rows.
    pub fn limit(&mut self, n: u64) -> &mut Self {
        self.state.limit = Some(n);
        self
    }

    /// Alias for [`Query::limit`].
    pub fn take(&mut self, n: u64) -> &mut Self {
        self.limit(n)
    }

    /// Skip rows.
    pub fn offset(&mut self, n: u64) -> &mut Self {
        self.state.offset = Some(n);
        self
    }

    /// Alias for [`Query::offset`].
    pub fn skip(&mut self, n: u64) -> &mut Self {
        self.offset(n)
    }

    /// Include soft-deleted rows.
    pub fn with_deleted(&mut self) -> &mut Self {
        self.state.with_deleted = true;
        self
    }

    // ---- plain filters ----

    fn attach(&mut self, conjunction: Conjunction, filter: Filter) -> &mut Self {
        let current = std::mem::take(&mut self.state.filter);
        self.state.filter = match conjunction {
            Conjunction::And => current.and_then(filter),
            Conjunction::Or => current.or_else(filter),
        };
        self
    }

    /// AND an arbitrary filter.
    pub fn where_filter(&mut self, filter: Filter) -> &mut Self {
        self.attach(Conjunction::And, filter)
    }

    /// OR an arbitrary filter.
    pub fn or_where_filter(&mut self, filter: Filter) -> &mut Self {
        self.attach(Conjunction::Or, filter)
    }

    /// `column = value` (`IS NULL` for null).
    pub fn where_eq(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        let filter = Filter::equals(self.qualify(column), value);
        self.attach(Conjunction::And, filter)
    }

    /// OR `column = value`.
    pub fn or_where_eq(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        let filter = Filter::equals(self.qualify(column), value);
        self.attach(Conjunction::Or, filter)
    }

    /// `NOT (column = value)`.
    pub fn where_not(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        let filter = Filter::not(Filter::equals(self.qualify(column), value));
        self.attach(Conjunction::And, filter)
    }

    /// `column <op> operands` with a textual operator.
    pub fn where_op(
        &mut self,
        column: &str,
        op: &str,
        operands: impl IntoOperands,
    ) -> QueryResult<&mut Self> {
        let comparison = Comparison::parse(op, operands)?;
        let filter = Filter::compare(self.qualify(column), comparison);
        Ok(self.attach(Conjunction::And, filter))
    }

    /// OR `column <op> operands`.
    pub fn or_where_op(
        &mut self,
        column: &str,
        op: &str,
        operands: impl IntoOperands,
    ) -> QueryResult<&mut Self> {
        let comparison = Comparison::parse(op, operands)?;
        let filter = Filter::compare(self.qualify(column), comparison);
        Ok(self.attach(Conjunction::Or, filter))
    }

    fn list_filter<V: Into<Value>>(
        &self,
        column: &str,
        op: Operator,
        values: impl IntoIterator<Item = V>,
    ) -> Filter {
        let values = values.into_iter().map(Into::into).collect();
        Filter::compare(
            self.qualify(column),
            Comparison::from_parts(op, vec![Operand::List(values)]),
        )
    }

    /// `column IN (values)`; an empty list matches nothing.
    pub fn where_in<V: Into<Value>>(
        &mut self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> &mut Self {
        let filter = self.list_filter(column, Operator::In, values);
        self.attach(Conjunction::And, filter)
    }

    /// OR `column IN (values)`.
    pub fn or_where_in<V: Into<Value>>(
        &mut self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> &mut Self {
        let filter = self.list_filter(column, Operator::In, values);
        self.attach(Conjunction::Or, filter)
    }

    /// `column NOT IN (values)`; an empty list matches everything.
    pub fn where_not_in<V: Into<Value>>(
        &mut self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> &mut Self {
        let filter = self.list_filter(column, Operator::NotIn, values);
        self.attach(Conjunction::And, filter)
    }

    /// `column IS NULL`.
    pub fn where_null(&mut self, column: &str) -> &mut Self {
        let filter = Filter::is_null(self.qualify(column));
        self.attach(Conjunction::And, filter)
    }

    /// OR `column IS NULL`.
    pub fn or_where_null(&mut self, column: &str) -> &mut Self {
        let filter = Filter::is_null(self.qualify(column));
        self.attach(Conjunction::Or, filter)
    }

    /// `column IS NOT NULL`.
    pub fn where_not_null(&mut self, column: &str) -> &mut Self {
        let filter = Filter::compare(
            self.qualify(column),
            Comparison::from_parts(Operator::IsNotNull, Vec::new()),
        );
        self.attach(Conjunction::And, filter)
    }

    fn between(&self, column: &str, op: Operator, low: Value, high: Value) -> Filter {
        Filter::compare(
            self.qualify(column),
            Comparison::from_parts(op, vec![Operand::Value(low), Operand::Value(high)]),
        )
    }

    /// `column BETWEEN low AND high`.
    pub fn where_between(
        &mut self,
        column: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> &mut Self {
        let filter = self.between(column, Operator::Between, low.into(), high.into());
        self.attach(Conjunction::And, filter)
    }

    /// `column NOT BETWEEN low AND high`.
    pub fn where_not_between(
        &mut self,
        column: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> &mut Self {
        let filter = self.between(column, Operator::NotBetween, low.into(), high.into());
        self.attach(Conjunction::And, filter)
    }

    fn like(&self, column: &str, op: Operator, pattern: &str) -> Filter {
        Filter::compare(
            self.qualify(column),
            Comparison::from_parts(op, vec![Operand::Value(pattern.into())]),
        )
    }

    /// `column LIKE pattern`.
    pub fn where_like(&mut self, column: &str, pattern: &str) -> &mut Self {
        let filter = self.like(column, Operator::Like, pattern);
        self.attach(Conjunction::And, filter)
    }

    /// OR `column LIKE pattern`.
    pub fn or_where_like(&mut self, column: &str, pattern: &str) -> &mut Self {
        let filter = self.like(column, Operator::Like, pattern);
        self.attach(Conjunction::Or, filter)
    }

    /// `column NOT LIKE pattern`.
    pub fn where_not_like(&mut self, column: &str, pattern: &str) -> &mut Self {
        let filter = self.like(column, Operator::NotLike, pattern);
        self.attach(Conjunction::And, filter)
    }

    fn group<F>(&mut self, conjunction: Conjunction, build: F) -> QueryResult<&mut Self>
    where
        F: FnOnce(&mut Query) -> QueryResult<()>,
    {
        let mut group = self.sibling();
        build(&mut group)?;
        // Relation filters inside the group resolve with this query.
        self.state.pending.append(&mut group.state.pending);
        let filter = std::mem::take(&mut group.state.filter);
        Ok(self.attach(conjunction, filter))
    }

    /// AND a parenthesized group built by `build`.
    pub fn where_group<F>(&mut self, build: F) -> QueryResult<&mut Self>
    where
        F: FnOnce(&mut Query) -> QueryResult<()>,
    {
        self.group(Conjunction::And, build)
    }

    /// OR a parenthesized group built by `build`.
    pub fn or_where_group<F>(&mut self, build: F) -> QueryResult<&mut Self>
    where
        F: FnOnce(&mut Query) -> QueryResult<()>,
    {
        self.group(Conjunction::Or, build)
    }

    // ---- relations ----

    fn correlation(&self) -> Correlation {
        let mut reserved = self.reserved.clone();
        reserved.push(self.qualifier().to_string());
        reserved.push(self.model.table().to_string());
        Correlation {
            ctx: self.ctx.clone(),
            model: Arc::clone(&self.model),
            qualifier: self.qualifier().to_string(),
            reserved,
        }
    }

    fn schedule(&mut self, slot: Slot, task: BoxFuture<'static, QueryResult<Resolved>>) {
        self.state.pending.push(PendingTask { slot, task });
    }

    fn relation_filter(
        &mut self,
        conjunction: Conjunction,
        negated: bool,
        path: &str,
        constraint: Option<Constraint>,
        comparison: Option<Comparison>,
    ) -> QueryResult<()> {
        let path = RelationPath::parse(path)?;
        self.ctx.schema.resolve_chain(&self.model, path.names())?;

        let slot = next_slot();
        let correlation = self.correlation();
        let counted = comparison.is_some();
        let task = Box::pin(async move {
            let subquery = relation_filter::build_path_query(correlation, path, constraint).await?;
            let filter = match comparison {
                Some(comparison) => Filter::Count {
                    query: Box::new(subquery.into_count()),
                    comparison,
                },
                None => Filter::Exists {
                    query: Box::new(subquery.into_exists()),
                    negated,
                },
            };
            Ok(Resolved::Filter(filter))
        });
        self.schedule(Slot::Filter(slot), task);

        let placeholder = if negated && counted {
            Filter::not(Filter::Deferred(slot))
        } else {
            Filter::Deferred(slot)
        };
        self.attach(conjunction, placeholder);
        Ok(())
    }

    fn relation_filters(
        &mut self,
        conjunction: Conjunction,
        negated: bool,
        relations: impl IntoRelations,
    ) -> QueryResult<&mut Self> {
        let relations = relations.into_relations()?;
        for (path, constraint) in relations.iter() {
            self.relation_filter(conjunction, negated, path, constraint.cloned(), None)?;
        }
        Ok(self)
    }

    /// Keep rows with at least one related row along each path.
    pub fn where_has(&mut self, relations: impl IntoRelations) -> QueryResult<&mut Self> {
        self.relation_filters(Conjunction::And, false, relations)
    }

    /// OR variant of [`Query::where_has`].
    pub fn or_where_has(&mut self, relations: impl IntoRelations) -> QueryResult<&mut Self> {
        self.relation_filters(Conjunction::Or, false, relations)
    }

    /// Keep rows with no related row along each path.
    pub fn where_doesnt_have(&mut self, relations: impl IntoRelations) -> QueryResult<&mut Self> {
        self.relation_filters(Conjunction::And, true, relations)
    }

    /// OR variant of [`Query::where_doesnt_have`].
    pub fn or_where_doesnt_have(
        &mut self,
        relations: impl IntoRelations,
    ) -> QueryResult<&mut Self> {
        self.relation_filters(Conjunction::Or, true, relations)
    }

    /// Shorthand for `where_has` on a single path.
    pub fn has(&mut self, path: &str) -> QueryResult<&mut Self> {
        self.where_has(path)
    }

    /// Compare the number of related rows along `path`.
    ///
    /// ```rust,ignore
    /// query.where_has_count("roles", ">=", 2, None)?;
    /// ```
    pub fn where_has_count(
        &mut self,
        path: &str,
        op: &str,
        operands: impl IntoOperands,
        constraint: Option<Constraint>,
    ) -> QueryResult<&mut Self> {
        let comparison = Comparison::parse(op, operands)?;
        self.relation_filter(Conjunction::And, false, path, constraint, Some(comparison))?;
        Ok(self)
    }

    /// OR variant of [`Query::where_has_count`].
    pub fn or_where_has_count(
        &mut self,
        path: &str,
        op: &str,
        operands: impl IntoOperands,
        constraint: Option<Constraint>,
    ) -> QueryResult<&mut Self> {
        let comparison = Comparison::parse(op, operands)?;
        self.relation_filter(Conjunction::Or, false, path, constraint, Some(comparison))?;
        Ok(self)
    }

    /// Add a count column per path, named `<alias>` or the camel-cased
    /// path plus the configured suffix.
    pub fn with_count(&mut self, relations: impl IntoRelations) -> QueryResult<&mut Self> {
        let relations = relations.into_relations()?;
        for (text, constraint) in relations.iter() {
            let (path, alias) = RelationPath::parse_counted(text)?;
            self.ctx.schema.resolve_chain(&self.model, path.names())?;

            let column = alias.unwrap_or_else(|| path.count_column(&self.ctx.config.count_suffix));
            let correlation = self.correlation();
            let constraint = constraint.cloned();
            let task = Box::pin(async move {
                let subquery =
                    relation_filter::build_path_query(correlation, path, constraint).await?;
                Ok(Resolved::Column(SelectItem::Subquery {
                    query: Box::new(subquery.into_count()),
                    alias: column,
                }))
            });
            self.schedule(Slot::CountColumn, task);
        }
        Ok(self)
    }

    /// Eager-load relation paths onto the results.
    pub fn with(&mut self, relations: impl IntoRelations) -> QueryResult<&mut Self> {
        let relations = relations.into_relations()?;
        for (text, constraint) in relations.iter() {
            let path = RelationPath::parse(text)?;
            self.ctx.schema.resolve_chain(&self.model, path.names())?;
            self.add_eager(path.segments(), constraint, None)?;
        }
        Ok(self)
    }

    /// Eager-load relation paths, restricting the leaf's select list.
    pub fn with_select<I, S>(
        &mut self,
        relations: impl IntoRelations,
        columns: I,
    ) -> QueryResult<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let relations = relations.into_relations()?;
        for (text, constraint) in relations.iter() {
            let path = RelationPath::parse(text)?;
            self.ctx.schema.resolve_chain(&self.model, path.names())?;
            self.add_eager(path.segments(), constraint, Some(&columns))?;
        }
        Ok(self)
    }

    /// Insert or extend the eager-load tree along `segments`.
    pub(crate) fn add_eager(
        &mut self,
        segments: &[PathSegment],
        constraint: Option<&Constraint>,
        columns: Option<&[String]>,
    ) -> QueryResult<()> {
        let Some((segment, rest)) = segments.split_first() else {
            return Ok(());
        };

        if let Some(existing) = self.state.eager.get(&segment.alias) {
            if existing.relation() != segment.name {
                return Err(QueryError::argument(format!(
                    "Alias '{}' is already used for relation '{}', cannot reuse it for '{}'",
                    segment.alias,
                    existing.relation(),
                    segment.name
                ))
                .with_model(self.model.name()));
            }
        } else {
            let descriptor = self.ctx.schema.resolve(&self.model, &segment.name)?;
            let child = Query::new(self.ctx.clone(), Arc::clone(&descriptor.target));
            self.state.eager.insert(
                segment.alias.clone(),
                EagerLoadSpec::new(segment.clone(), descriptor, child),
            );
        }

        let Some(node) = self.state.eager.get_mut(&segment.alias) else {
            return Err(QueryError::internal("eager-load node vanished"));
        };
        if rest.is_empty() {
            let query = node.query_mut();
            if let Some(constraint) = constraint {
                constraint(query)?;
            }
            if let Some(columns) = columns {
                query.select(columns.iter().cloned());
            }
            Ok(())
        } else {
            node.query_mut().add_eager(rest, constraint, columns)
        }
    }

    /// Take the eager-load tree, leaving none behind.
    pub(crate) fn take_eager(&mut self) -> IndexMap<String, EagerLoadSpec> {
        std::mem::take(&mut self.state.eager)
    }

    // ---- state ----

    /// Clear all state; the target model stays.
    pub fn reset(&mut self) -> &mut Self {
        self.state = QueryState::default();
        self
    }

    /// Retarget at another model, clearing all state.
    pub fn from_model(&mut self, name: &str) -> QueryResult<&mut Self> {
        self.model = self.ctx.schema.get(name)?;
        self.alias = None;
        Ok(self.reset())
    }

    /// Await every scheduled relation subquery and splice the results in.
    ///
    /// Runs at most once per batch of scheduled work; further calls are
    /// no-ops until more work is scheduled.
    pub fn resolve_pending(&mut self) -> BoxFuture<'_, QueryResult<()>> {
        Box::pin(async move {
            if self.state.pending.is_empty() {
                return Ok(());
            }
            let pending = std::mem::take(&mut self.state.pending);
            let (slots, tasks): (Vec<_>, Vec<_>) =
                pending.into_iter().map(|p| (p.slot, p.task)).unzip();
            let resolved = try_join_all(tasks).await?;

            for (slot, value) in slots.into_iter().zip(resolved) {
                match (slot, value) {
                    (Slot::Filter(id), Resolved::Filter(filter)) => {
                        let mut replacement = Some(filter);
                        if !self.state.filter.replace_deferred(id, &mut replacement) {
                            return Err(QueryError::internal(format!(
                                "relation filter slot {} is missing from the filter tree",
                                id
                            )));
                        }
                    }
                    (Slot::CountColumn, Resolved::Column(item)) => {
                        self.state.count_columns.push(item);
                    }
                    _ => {
                        return Err(QueryError::internal(
                            "relation subquery resolved into the wrong slot",
                        ));
                    }
                }
            }
            Ok(())
        })
    }

    /// The current state as a SELECT. Scheduled work must be resolved first.
    pub(crate) fn to_select(&self) -> SelectQuery {
        let mut select = SelectQuery::new(self.model.table());
        if let Some(alias) = &self.alias {
            select = select.alias(alias.clone());
        }

        let mut columns: Vec<SelectItem> = match &self.state.columns {
            Some(columns) => columns.iter().cloned().map(SelectItem::Column).collect(),
            None if self.state.count_columns.is_empty() => Vec::new(),
            None => vec![SelectItem::AllColumns],
        };
        columns.extend(self.state.count_columns.iter().cloned());
        select.columns = columns;

        select.filter = self.state.filter.clone();
        if let Some(column) = self.model.soft_delete_column() {
            if !self.state.with_deleted {
                select = select.filter(Filter::is_null(self.qualify(column)));
            }
        }
        select.order_by = self
            .state
            .order_by
            .iter()
            .map(|o| OrderByField::new(self.qualify(&o.column), o.order))
            .collect();
        select.limit = self.state.limit;
        select.offset = self.state.offset;
        select
    }

    /// Run the SELECT and eager-load the results.
    pub(crate) fn fetch(&mut self) -> BoxFuture<'_, QueryResult<Vec<Record>>> {
        Box::pin(async move {
            self.resolve_pending().await?;
            let eager = self.take_eager();
            for spec in eager.values() {
                self.ensure_selected(&spec.descriptor().source_key);
            }

            let (sql, params) = self.to_select().build(self.ctx.config.dialect)?;
            crate::eloquent_debug!(table = %self.model.table(), sql = %sql, "select");
            let rows = self
                .ctx
                .engine
                .query(&sql, params)
                .await
                .map_err(|e| e.with_model(self.model.name()).with_sql(&sql))?;

            let mut records: Vec<Record> = rows.into_iter().map(Record::from_row).collect();
            eager::load(&mut records, eager).await?;
            Ok(records)
        })
    }

    /// Run the SELECT once per chunk of `keys` matched against `column` and
    /// eager-load the combined rows.
    ///
    /// Chunks follow the configured chunk size so no statement binds more
    /// parameters than storage accepts.
    pub(crate) fn fetch_where_in(
        &mut self,
        column: &str,
        keys: Vec<Value>,
    ) -> BoxFuture<'_, QueryResult<Vec<Record>>> {
        let column = self.qualify(column);
        Box::pin(async move {
            self.resolve_pending().await?;
            let eager = self.take_eager();
            for spec in eager.values() {
                self.ensure_selected(&spec.descriptor().source_key);
            }

            let select = self.to_select();
            let dialect = self.ctx.config.dialect;
            let chunk_size = self.ctx.config.bulk_chunk_size.max(1);
            let statements = keys
                .chunks(chunk_size)
                .map(|chunk| {
                    select
                        .clone()
                        .filter(Filter::in_values(column.clone(), chunk.to_vec()))
                        .build(dialect)
                })
                .collect::<QueryResult<Vec<_>>>()?;

            let engine = self.engine();
            let model = self.model.name();
            let batches = try_join_all(statements.into_iter().map(|(sql, params)| async move {
                crate::eloquent_debug!(table = %model, sql = %sql, "select chunk");
                engine
                    .query(&sql, params)
                    .await
                    .map_err(|e| e.with_model(model).with_sql(&sql))
            }))
            .await?;

            let mut records: Vec<Record> =
                batches.into_iter().flatten().map(Record::from_row).collect();
            eager::load(&mut records, eager).await?;
            Ok(records)
        })
    }

    /// Run the query.
    pub async fn get(&mut self) -> QueryResult<Collection> {
        let records = self.fetch().await?;
        Ok(Collection::from_records(self.model.id(), records))
    }

    /// Run the query with `LIMIT 1`.
    pub async fn first(&mut self) -> QueryResult<Option<Record>> {
        let limit = self.state.limit.replace(1);
        let result = self.fetch().await;
        self.state.limit = limit;
        Ok(result?.into_iter().next())
    }

    /// Count matching rows.
    pub async fn count(&mut self) -> QueryResult<u64> {
        self.resolve_pending().await?;
        let (sql, params) = self
            .to_select()
            .into_count()
            .build(self.ctx.config.dialect)?;
        crate::eloquent_debug!(table = %self.model.table(), sql = %sql, "count");
        let rows = self.ctx.engine.query(&sql, params).await?;
        let count = rows
            .first()
            .and_then(|row| row.values().next())
            .and_then(Value::as_i64)
            .ok_or_else(|| QueryError::deserialization("COUNT(*) returned no value").with_sql(&sql))?;
        Ok(count.max(0) as u64)
    }

    /// Render the SELECT this query would run.
    pub async fn to_sql(&mut self) -> QueryResult<(String, Vec<Value>)> {
        self.resolve_pending().await?;
        self.to_select().build(self.ctx.config.dialect)
    }

    /// Delete matching rows. Soft-deleting models stamp their soft-delete
    /// column instead.
    pub async fn delete(&mut self) -> QueryResult<u64> {
        match self.model.soft_delete_column() {
            Some(column) if !self.state.with_deleted => {
                let column = column.to_string();
                self.soft_delete(&column).await
            }
            _ => self.hard_delete().await,
        }
    }

    async fn soft_delete(&mut self, column: &str) -> QueryResult<u64> {
        self.resolve_pending().await?;
        let now = self.ctx.config.quirks().timestamp_precision.now();
        let filter = self
            .state
            .filter
            .clone()
            .and_then(Filter::is_null(self.qualify(column)));

        let mut builder = SqlBuilder::new(self.ctx.config.dialect);
        builder
            .push("UPDATE ")
            .push_identifier(self.model.table())
            .push(" SET ")
            .push_identifier(column)
            .push(" = ")
            .push_param(now)
            .push(" WHERE ");
        filter.write_sql(&mut builder)?;
        let (sql, params) = builder.build();

        crate::eloquent_debug!(table = %self.model.table(), sql = %sql, "soft delete");
        self.ctx.engine.execute(&sql, params).await
    }

    /// Delete matching rows, ignoring soft deletion.
    pub async fn hard_delete(&mut self) -> QueryResult<u64> {
        self.resolve_pending().await?;
        let mut builder = SqlBuilder::new(self.ctx.config.dialect);
        builder.push("DELETE FROM ").push_identifier(self.model.table());
        if !self.state.filter.is_none() {
            builder.push(" WHERE ");
            self.state.filter.write_sql(&mut builder)?;
        }
        let (sql, params) = builder.build();

        crate::eloquent_debug!(table = %self.model.table(), sql = %sql, "delete");
        self.ctx.engine.execute(&sql, params).await
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("model", &self.model.name())
            .field("alias", &self.alias)
            .field("columns", &self.state.columns)
            .field("filter", &self.state.filter)
            .field("eager", &self.state.eager.keys().collect::<Vec<_>>())
            .field("pending", &self.state.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockEngine, blog_schema, client};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_plain_filters_render_in_order() {
        let client = client(MockEngine::new());
        let mut query = client.query("User").unwrap();
        query
            .where_eq("name", "Alice")
            .or_where_eq("name", "Bob")
            .where_in("id", [1, 2, 3])
            .order_by("id", SortOrder::Desc)
            .take(5);

        let (sql, params) = query.to_sql().await.unwrap();
        assert_eq!(
            sql,
            "SELECT users.* FROM users WHERE ((users.\"name\" = ? OR users.\"name\" = ?) AND users.id IN (?, ?, ?) AND users.\"deletedAt\" IS NULL) ORDER BY users.id DESC LIMIT 5"
        );
        assert_eq!(params.len(), 5);
    }

    #[tokio::test]
    async fn test_where_has_is_deferred_until_rendered() {
        let client = client(MockEngine::new());
        let mut query = client.query("User").unwrap();
        query.where_has("posts").unwrap();
        assert_eq!(query.pending_count(), 1);
        assert!(matches!(query.filter(), Filter::Deferred(_)));

        let (sql, _) = query.to_sql().await.unwrap();
        assert_eq!(query.pending_count(), 0);
        assert_eq!(
            sql,
            "SELECT users.* FROM users WHERE (EXISTS (SELECT 1 FROM posts WHERE (posts.\"deletedAt\" IS NULL AND posts.\"createdById\" IN (users.id))) AND users.\"deletedAt\" IS NULL)"
        );

        // A second render does not rebuild anything.
        let (again, _) = query.to_sql().await.unwrap();
        assert_eq!(sql, again);
    }

    #[tokio::test]
    async fn test_unknown_relation_fails_synchronously() {
        let engine = MockEngine::new();
        let client = client(engine.clone());
        let mut query = client.query("User").unwrap();

        let err = query.where_has("nope").unwrap_err();
        assert!(err.is_relation_not_found());
        let err = query.with("posts.nope").unwrap_err();
        assert!(err.is_relation_not_found());
        let err = query.with_count("nope").unwrap_err();
        assert!(err.is_relation_not_found());
        assert_eq!(engine.statement_count(), 0);
    }

    #[tokio::test]
    async fn test_where_doesnt_have_and_count() {
        let client = client(MockEngine::new());
        let mut query = client.query("User").unwrap();
        query.where_doesnt_have("roles").unwrap();
        query.where_has_count("posts", ">=", 2, None).unwrap();

        let (sql, params) = query.to_sql().await.unwrap();
        assert!(sql.contains("NOT EXISTS (SELECT 1 FROM roles"), "{}", sql);
        assert!(sql.contains("(SELECT COUNT(*) FROM posts"), "{}", sql);
        assert!(sql.contains(") >= ?"), "{}", sql);
        assert_eq!(params, vec![Value::Int(2)]);
    }

    #[tokio::test]
    async fn test_with_count_names_columns() {
        let client = client(MockEngine::new());
        let mut query = client.query("User").unwrap();
        query
            .with_count(["posts", "posts.comments as commentTotal"])
            .unwrap();

        let (sql, _) = query.to_sql().await.unwrap();
        assert!(sql.starts_with("SELECT users.*, (SELECT COUNT(*) FROM posts"), "{}", sql);
        assert!(sql.contains(") AS \"postsCount\""), "{}", sql);
        assert!(sql.contains(") AS \"commentTotal\""), "{}", sql);
    }

    #[tokio::test]
    async fn test_where_group_keeps_relation_filters() {
        let client = client(MockEngine::new());
        let mut query = client.query("User").unwrap();
        query.where_eq("id", 1);
        query
            .or_where_group(|q| {
                q.where_has("posts")?;
                q.where_eq("name", "x");
                Ok(())
            })
            .unwrap();
        assert_eq!(query.pending_count(), 1);

        let (sql, _) = query.to_sql().await.unwrap();
        assert!(sql.contains("(users.id = ? OR (EXISTS"), "{}", sql);
    }

    #[tokio::test]
    async fn test_bad_operator_and_operand_count() {
        let client = client(MockEngine::new());
        let mut query = client.query("User").unwrap();
        assert!(query.where_op("id", "~=~", 1).is_err());
        let err = query.where_op("id", "between", 1).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::InvalidArgument);
        assert!(query.where_has_count("posts", "between", 1, None).is_err());
    }

    #[tokio::test]
    async fn test_alias_conflict_in_eager_tree() {
        let client = client(MockEngine::new());
        let mut query = client.query("User").unwrap();
        query.with("posts as things").unwrap();
        let err = query.with("roles as things").unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::InvalidArgument);

        query.with("posts.comments as things.c").unwrap();
        let node = &query.eager_loads()["things"];
        assert_eq!(node.relation(), "posts");
        assert!(node.children().any(|c| c.alias() == "c"));
    }

    #[tokio::test]
    async fn test_reset_and_from_model() {
        let client = client(MockEngine::new());
        let mut query = client.query("User").unwrap();
        query.where_eq("id", 1).with("posts").unwrap();
        query.from_model("Post").unwrap();
        assert!(query.filter().is_none());
        assert!(query.eager_loads().is_empty());

        let (sql, _) = query.to_sql().await.unwrap();
        assert_eq!(sql, "SELECT posts.* FROM posts WHERE posts.\"deletedAt\" IS NULL");
        assert!(query.from_model("Nope").is_err());
    }

    #[tokio::test]
    async fn test_soft_delete_statement() {
        let engine = MockEngine::new();
        let client = client(engine.clone());
        let mut query = client.query("User").unwrap();
        query.where_eq("id", 7);
        query.delete().await.unwrap();

        let (sql, params) = engine.last_statement().unwrap();
        assert_eq!(
            sql,
            "UPDATE users SET \"deletedAt\" = ? WHERE (users.id = ? AND users.\"deletedAt\" IS NULL)"
        );
        assert_eq!(params[1], Value::Int(7));
    }

    #[test]
    fn test_schema_fixture_is_consistent() {
        let schema = blog_schema();
        let user = schema.get("User").unwrap();
        assert!(schema.resolve_chain(&user, ["posts", "comments", "createdBy"]).is_ok());
    }
}
