//! Bulk writes and matching in-memory rows back to stored rows.
//!
//! [`BulkWriter::select_by`] finds the stored row for each in-memory row by
//! a tuple of unique-key columns. Values are normalized per column before
//! they are compared, so a row built in memory and the same row read back
//! from storage produce the same [`RowIdentity`] even when storage changed
//! their representation (numeric text, rounded timestamps, folded case,
//! booleans stored as integers).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, warn};

use crate::config::StorageQuirks;
use crate::error::{QueryError, QueryResult};
use crate::filter::Filter;
use crate::model::ModelDef;
use crate::query::Context;
use crate::record::{Collection, Record};
use crate::select::{SelectItem, SelectQuery};
use crate::sql::SqlBuilder;
use crate::value::{Key, Value};

/// How a unique-key column is normalized before comparison.
#[derive(Clone, Default)]
pub enum Serializer {
    /// Infer from the values seen: booleans (when storage reads them back as
    /// 0/1), then numbers, then date-times, else strings.
    #[default]
    Auto,
    /// Compare as numbers; text that is not numeric falls back to string
    /// comparison.
    Number,
    /// Compare as date-times at the storage precision.
    Date,
    /// Compare as text, case-folded when the model or dialect says so.
    String,
    /// Compare as true/false, accepting 0/1 and "true"/"false".
    Boolean,
    /// Compare by the output of a custom function.
    Custom(Arc<dyn Fn(&Value) -> String + Send + Sync>),
}

impl fmt::Debug for Serializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("Auto"),
            Self::Number => f.write_str("Number"),
            Self::Date => f.write_str("Date"),
            Self::String => f.write_str("String"),
            Self::Boolean => f.write_str("Boolean"),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Normalized unique-key tuple of one row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowIdentity(String);

impl RowIdentity {
    /// The canonical text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

const FIELD_SEPARATOR: char = '\u{1f}';

/// A serializer with `Auto` resolved for one column.
enum Normalizer {
    Number,
    Date,
    Text { fold_case: bool },
    Boolean,
    Custom(Arc<dyn Fn(&Value) -> String + Send + Sync>),
}

impl Normalizer {
    /// Pick a normalizer from sampled values.
    ///
    /// When storage reads booleans back as 0/1, a boolean sample means the
    /// column is boolean even though stored samples look numeric.
    fn infer<'a>(
        samples: impl Iterator<Item = &'a Value>,
        fold_case: bool,
        booleans_as_integers: bool,
    ) -> Self {
        let mut saw_number = false;
        let mut saw_date = false;
        for value in samples {
            match value {
                Value::Bool(_) if booleans_as_integers => return Self::Boolean,
                Value::Int(_) | Value::Float(_) | Value::Bool(_) => saw_number = true,
                Value::DateTime(_) => saw_date = true,
                _ => {}
            }
        }
        if saw_number {
            Self::Number
        } else if saw_date {
            Self::Date
        } else {
            Self::Text { fold_case }
        }
    }

    fn number(value: &Value) -> Option<String> {
        let integral = match value {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        if let Some(i) = integral {
            return Some(format!("n:{}", i));
        }
        match value.as_f64() {
            Some(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.0e15 => {
                Some(format!("n:{}", n as i64))
            }
            Some(n) if n.is_finite() => Some(format!("n:{}", n)),
            _ => None,
        }
    }

    fn text(value: &Value, fold_case: bool) -> String {
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let text = if fold_case { text.to_lowercase() } else { text };
        format!("s:{}", text)
    }

    fn normalize(&self, value: &Value, quirks: &StorageQuirks) -> String {
        if value.is_null() {
            return "null".to_string();
        }
        match self {
            Self::Number => Self::number(value).unwrap_or_else(|| Self::text(value, false)),
            Self::Date => match value.as_datetime() {
                Some(dt) => {
                    let rounded = quirks.timestamp_precision.round(dt);
                    format!("d:{}", rounded.format("%Y-%m-%d %H:%M:%S%.3f"))
                }
                None => Self::text(value, false),
            },
            Self::Text { fold_case } => Self::text(value, *fold_case),
            Self::Boolean => {
                let truth = match value {
                    Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                        "true" | "t" | "1" => Some(true),
                        "false" | "f" | "0" => Some(false),
                        _ => None,
                    },
                    other => other.as_f64().map(|n| n != 0.0),
                };
                match truth {
                    Some(true) => "b:1".to_string(),
                    Some(false) => "b:0".to_string(),
                    None => Self::text(value, false),
                }
            }
            Self::Custom(f) => format!("c:{}", f(value)),
        }
    }
}

/// Multi-row writes for one model.
pub struct BulkWriter {
    ctx: Context,
    model: Arc<ModelDef>,
    serializers: HashMap<String, Serializer>,
}

impl BulkWriter {
    pub(crate) fn new(ctx: Context, model: Arc<ModelDef>) -> Self {
        Self {
            ctx,
            model,
            serializers: HashMap::new(),
        }
    }

    /// The target model.
    pub fn model(&self) -> &ModelDef {
        &self.model
    }

    /// Register how `column` is normalized when matching rows.
    pub fn serializer(&mut self, column: impl Into<String>, serializer: Serializer) -> &mut Self {
        self.serializers.insert(column.into(), serializer);
        self
    }

    fn quirks(&self) -> StorageQuirks {
        self.ctx.config.quirks()
    }

    fn fold_case(&self) -> bool {
        match self.model.is_case_sensitive() {
            Some(sensitive) => !sensitive,
            None => self.quirks().case_insensitive_strings,
        }
    }

    fn stamp_timestamps(&self, records: &mut [Record]) {
        let Some((created, updated)) = self.model.timestamp_columns() else {
            return;
        };
        let now = Value::DateTime(self.quirks().timestamp_precision.now());
        for record in records {
            for column in [created, updated] {
                if record.get(column).is_none_or(Value::is_null) {
                    record.set(column, now.clone());
                }
            }
        }
    }

    fn columns_of(records: &[Record]) -> Vec<String> {
        let mut columns: IndexSet<&str> = IndexSet::new();
        for record in records {
            columns.extend(record.attributes().keys().map(String::as_str));
        }
        columns.into_iter().map(str::to_string).collect()
    }

    fn render_insert(
        &self,
        verb: &str,
        columns: &[String],
        records: &[Record],
        ignore_duplicates: bool,
    ) -> (String, Vec<Value>) {
        let dialect = self.ctx.config.dialect;
        let mut builder = SqlBuilder::new(dialect);
        builder
            .push(verb)
            .push(" INTO ")
            .push_identifier(self.model.table())
            .push(" (");
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            builder.push_identifier(column);
        }
        builder.push(") VALUES ");

        for (i, record) in records.iter().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            builder.push("(");
            for (j, column) in columns.iter().enumerate() {
                if j > 0 {
                    builder.push(", ");
                }
                match record.get(column) {
                    Some(value) => {
                        builder.push_param(value.clone());
                    }
                    None => {
                        builder.push(dialect.missing_value());
                    }
                }
            }
            builder.push(")");
        }

        if ignore_duplicates {
            builder.push(dialect.ignore_duplicates_clause(self.model.id()));
        }
        builder.build()
    }

    /// Hand out ids from the first id of a multi-row insert.
    ///
    /// Rows that carry an explicit id keep it and push the counter past it.
    fn assign_ids(&self, records: &mut [Record], first_id: i64) {
        let id = self.model.id();
        let mut next = first_id;
        for record in records {
            match record.get(id).and_then(Value::as_i64) {
                Some(explicit) => {
                    if explicit >= next {
                        next = explicit + 1;
                    }
                }
                None => {
                    record.set(id, next);
                    next += 1;
                }
            }
        }
    }

    async fn write(
        &self,
        verb: &str,
        rows: &mut Collection,
        ignore_duplicates: bool,
        assign_ids: bool,
    ) -> QueryResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        self.stamp_timestamps(rows.records_mut());
        let columns = Self::columns_of(rows.records());
        let chunk_size = self.ctx.config.bulk_chunk_size.max(1);

        let mut affected = 0;
        for chunk in rows.records_mut().chunks_mut(chunk_size) {
            let (sql, params) = self.render_insert(verb, &columns, chunk, ignore_duplicates);
            debug!(table = %self.model.table(), rows = chunk.len(), "bulk {}", verb.to_lowercase());
            let outcome = self
                .ctx
                .engine
                .insert(self.model.table(), &sql, params)
                .await
                .map_err(|e| e.with_model(self.model.name()).with_sql(&sql))?;
            affected += outcome.rows_affected;

            if assign_ids {
                if let Some(first_id) = outcome.first_id {
                    self.assign_ids(chunk, first_id);
                }
            }
        }
        rows.reindex();
        Ok(affected)
    }

    /// Insert every row in `rows`.
    ///
    /// With `ignore_duplicates`, rows that collide with stored keys are
    /// skipped and no ids are assigned. Otherwise, when the storage hands
    /// out sequential ids, rows without an id receive theirs.
    pub async fn insert(&self, rows: &mut Collection, ignore_duplicates: bool) -> QueryResult<u64> {
        let assign = !ignore_duplicates && self.quirks().sequential_ids;
        self.write("INSERT", rows, ignore_duplicates, assign).await
    }

    /// Replace every row in `rows`, deleting stored rows with colliding
    /// unique keys first.
    ///
    /// Never combined with duplicate ignoring and never assigns ids.
    pub async fn replace(
        &self,
        rows: &mut Collection,
        ignore_duplicates: bool,
    ) -> QueryResult<u64> {
        let verb = self.ctx.config.dialect.replace_verb()?;
        if ignore_duplicates {
            warn!(table = %self.model.table(), "replace ignores the ignore_duplicates flag");
        }
        self.write(verb, rows, false, false).await
    }

    fn key_filter(&self, rows: &[Record], unique_keys: &[&str]) -> Filter {
        let (path, leaf) = unique_keys.split_at(unique_keys.len() - 1);
        let leaf = leaf[0];

        let mut groups: IndexMap<Vec<Option<Key>>, (Vec<Value>, Vec<Value>, bool)> =
            IndexMap::new();
        for record in rows {
            let prefix: Vec<Value> = path
                .iter()
                .map(|column| record.get(column).cloned().unwrap_or_default())
                .collect();
            let group_key = prefix.iter().map(Value::key).collect();
            let entry = groups
                .entry(group_key)
                .or_insert_with(|| (prefix, Vec::new(), false));
            match record.get(leaf).filter(|v| !v.is_null()) {
                Some(value) => entry.1.push(value.clone()),
                None => entry.2 = true,
            }
        }

        Filter::or(groups.into_values().map(|(prefix, values, has_null)| {
            let leaf_column = format!("{}.{}", self.model.table(), leaf);
            let leaf_filter = match (values.is_empty(), has_null) {
                (false, true) => Filter::or([
                    Filter::in_values(leaf_column.clone(), values),
                    Filter::is_null(leaf_column),
                ]),
                (true, _) => Filter::is_null(leaf_column),
                (false, false) => Filter::in_values(leaf_column, values),
            };
            Filter::and(
                path.iter()
                    .zip(prefix)
                    .map(|(column, value)| {
                        Filter::equals(format!("{}.{}", self.model.table(), column), value)
                    })
                    .chain([leaf_filter]),
            )
        }))
    }

    fn normalizers(
        &self,
        unique_keys: &[&str],
        fetched: &[Record],
        rows: &[Record],
    ) -> Vec<Normalizer> {
        let fold_case = self.fold_case();
        let booleans_as_integers = self.quirks().booleans_as_integers;
        unique_keys
            .iter()
            .map(|column| match self.serializers.get(*column).cloned().unwrap_or_default() {
                Serializer::Auto => {
                    let stored = fetched.iter().filter_map(|r| r.get(column));
                    let local = rows.iter().filter_map(|r| r.get(column));
                    Normalizer::infer(stored.chain(local), fold_case, booleans_as_integers)
                }
                Serializer::Number => Normalizer::Number,
                Serializer::Date => Normalizer::Date,
                Serializer::String => Normalizer::Text { fold_case },
                Serializer::Boolean => Normalizer::Boolean,
                Serializer::Custom(f) => Normalizer::Custom(f),
            })
            .collect()
    }

    fn identity(
        record: &Record,
        unique_keys: &[&str],
        normalizers: &[Normalizer],
        quirks: &StorageQuirks,
    ) -> RowIdentity {
        let mut text = String::new();
        for (i, (column, normalizer)) in unique_keys.iter().zip(normalizers).enumerate() {
            if i > 0 {
                text.push(FIELD_SEPARATOR);
            }
            let value = record.get(column).cloned().unwrap_or_default();
            text.push_str(&normalizer.normalize(&value, quirks));
        }
        RowIdentity(text)
    }

    /// Identity of a row under the registered serializers, inferring `Auto`
    /// columns from the row itself.
    pub fn row_identity(&self, record: &Record, unique_keys: &[&str]) -> RowIdentity {
        let normalizers = self.normalizers(unique_keys, &[], std::slice::from_ref(record));
        Self::identity(record, unique_keys, &normalizers, &self.quirks())
    }

    /// Match rows to stored rows; returns which rows matched.
    async fn match_rows(
        &self,
        rows: &mut Collection,
        unique_keys: &[&str],
        columns: &[&str],
    ) -> QueryResult<Vec<bool>> {
        if unique_keys.is_empty() {
            return Err(QueryError::argument("select_by needs at least one unique key column")
                .with_model(self.model.name()));
        }
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut select_list: Vec<String> = Vec::new();
        for column in columns
            .iter()
            .chain(unique_keys)
            .copied()
            .chain([self.model.id()])
        {
            if !select_list.iter().any(|c| c == column) {
                select_list.push(column.to_string());
            }
        }

        let chunk_size = self.ctx.config.bulk_chunk_size.max(1);
        let mut fetched: Vec<Record> = Vec::new();
        for chunk in rows.records().chunks(chunk_size) {
            // Soft-deleted rows still hold their unique keys.
            let select = SelectQuery::new(self.model.table())
                .columns(select_list.iter().cloned().map(SelectItem::Column).collect())
                .filter(self.key_filter(chunk, unique_keys));
            let (sql, params) = select.build(self.ctx.config.dialect)?;
            debug!(table = %self.model.table(), rows = chunk.len(), "select by unique keys");
            let found = self
                .ctx
                .engine
                .query(&sql, params)
                .await
                .map_err(|e| e.with_model(self.model.name()).with_sql(&sql))?;
            fetched.extend(found.into_iter().map(Record::from_row));
        }

        let quirks = self.quirks();
        let normalizers = self.normalizers(unique_keys, &fetched, rows.records());

        let mut by_identity: HashMap<RowIdentity, usize> = HashMap::new();
        for (index, record) in rows.records().iter().enumerate() {
            let identity = Self::identity(record, unique_keys, &normalizers, &quirks);
            if let Some(previous) = by_identity.insert(identity.clone(), index) {
                return Err(QueryError::ambiguous_match(
                    self.model.table(),
                    format!(
                        "rows #{} and #{} share unique keys ({})",
                        previous,
                        index,
                        identity.as_str().replace(FIELD_SEPARATOR, ", ")
                    ),
                ));
            }
        }

        let mut matched = vec![false; rows.len()];
        let records = rows.records_mut();
        for stored in fetched {
            let identity = Self::identity(&stored, unique_keys, &normalizers, &quirks);
            let Some(&index) = by_identity.get(&identity) else {
                return Err(QueryError::ambiguous_match(
                    self.model.table(),
                    format!(
                        "stored row ({}) matches no row in the batch",
                        identity.as_str().replace(FIELD_SEPARATOR, ", ")
                    ),
                ));
            };
            if matched[index] {
                return Err(QueryError::ambiguous_match(
                    self.model.table(),
                    format!("row #{} matches more than one stored row", index),
                ));
            }
            matched[index] = true;
            for (column, value) in stored.attributes() {
                records[index].set(column.clone(), value.clone());
            }
        }
        rows.reindex();
        Ok(matched)
    }

    /// Fill `columns` (plus the keys and the id) on each row from the stored
    /// row with the same unique keys. Returns the number of rows matched.
    pub async fn select_by(
        &self,
        rows: &mut Collection,
        unique_keys: &[&str],
        columns: &[&str],
    ) -> QueryResult<usize> {
        let matched = self.match_rows(rows, unique_keys, columns).await?;
        Ok(matched.into_iter().filter(|m| *m).count())
    }

    /// Make sure every row is stored, then fill `columns` from storage.
    ///
    /// Rows with no stored match are inserted with duplicates ignored, then
    /// the whole batch is matched again. Every row must end up with an id.
    pub async fn insert_by(
        &self,
        rows: &mut Collection,
        unique_keys: &[&str],
        columns: &[&str],
    ) -> QueryResult<()> {
        let matched = self.match_rows(rows, unique_keys, columns).await?;
        let missing: Vec<Record> = rows
            .iter()
            .zip(&matched)
            .filter(|(_, m)| !**m)
            .map(|(record, _)| record.clone())
            .collect();

        if !missing.is_empty() {
            debug!(table = %self.model.table(), rows = missing.len(), "inserting unmatched rows");
            let mut batch = Collection::from_records(self.model.id(), missing);
            self.insert(&mut batch, true).await?;
        }

        let matched = self.match_rows(rows, unique_keys, columns).await?;
        let id = self.model.id();
        let unresolved = rows
            .iter()
            .zip(&matched)
            .filter(|(record, m)| !**m || record.get(id).is_none_or(Value::is_null))
            .count();
        if unresolved > 0 {
            return Err(QueryError::reconciliation(self.model.table(), unresolved)
                .with_model(self.model.name()));
        }
        Ok(())
    }
}

impl fmt::Debug for BulkWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkWriter")
            .field("model", &self.model.name())
            .field("serializers", &self.serializers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::InsertOutcome;
    use crate::testing::{MockEngine, client};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn rows(records: Vec<Record>) -> Collection {
        Collection::from_records("id", records)
    }

    #[tokio::test]
    async fn test_insert_assigns_ids_around_explicit_ones() {
        let engine = MockEngine::new();
        engine.insert_outcome(InsertOutcome {
            rows_affected: 4,
            first_id: Some(10),
        });
        let client = client(engine.clone());
        let writer = client.bulk("Tag").unwrap();

        let mut batch = rows(vec![
            Record::from_pairs([("name", Value::from("a"))]),
            Record::from_pairs([("id", Value::Int(20)), ("name", Value::from("b"))]),
            Record::from_pairs([("name", Value::from("c"))]),
            Record::from_pairs([("id", Value::Int(5)), ("name", Value::from("d"))]),
        ]);
        writer.insert(&mut batch, false).await.unwrap();

        let ids: Vec<_> = batch.iter().map(|r| r.get("id").cloned()).collect();
        assert_eq!(
            ids,
            [Some(Value::Int(10)), Some(Value::Int(20)), Some(Value::Int(21)), Some(Value::Int(5))]
        );
        assert!(batch.contains_id(21));

        let (sql, _) = engine.last_statement().unwrap();
        assert_eq!(
            sql,
            "INSERT INTO tags (\"name\", id) VALUES (?, NULL), (?, ?), (?, NULL), (?, ?)"
        );
    }

    #[tokio::test]
    async fn test_ignore_duplicates_skips_id_assignment() {
        let engine = MockEngine::new();
        engine.insert_outcome(InsertOutcome {
            rows_affected: 1,
            first_id: Some(3),
        });
        let client = client(engine.clone());
        let writer = client.bulk("Tag").unwrap();

        let mut batch = rows(vec![Record::from_pairs([("name", Value::from("a"))])]);
        writer.insert(&mut batch, true).await.unwrap();
        assert!(!batch.records()[0].has("id"));
        let (sql, _) = engine.last_statement().unwrap();
        assert!(sql.ends_with(" ON CONFLICT DO NOTHING"), "{}", sql);
    }

    #[tokio::test]
    async fn test_replace_never_ignores() {
        let engine = MockEngine::new();
        let client = client(engine.clone());
        let writer = client.bulk("Tag").unwrap();
        let mut batch = rows(vec![Record::from_pairs([("id", 1), ("name", 2)])]);
        writer.replace(&mut batch, true).await.unwrap();

        let (sql, _) = engine.last_statement().unwrap();
        assert_eq!(sql, "REPLACE INTO tags (id, \"name\") VALUES (?, ?)");
    }

    #[tokio::test]
    async fn test_inserts_are_chunked() {
        let engine = MockEngine::new();
        let client = crate::testing::client_with(
            engine.clone(),
            crate::EloquentConfig::default().bulk_chunk_size(2),
        )
        .unwrap();
        let writer = client.bulk("Tag").unwrap();
        let mut batch = rows(
            (0..5)
                .map(|i| Record::from_pairs([("name", Value::from(format!("t{}", i)))]))
                .collect(),
        );
        writer.insert(&mut batch, true).await.unwrap();
        assert_eq!(engine.statement_count(), 3);
    }

    #[tokio::test]
    async fn test_select_by_merges_stored_values() {
        let engine = MockEngine::new();
        engine.respond(
            "FROM tags",
            vec![
                MockEngine::row([("id", Value::Int(7)), ("name", Value::from("Rust"))]),
                MockEngine::row([("id", Value::Int(8)), ("name", Value::from("sql"))]),
            ],
        );
        let client = client(engine.clone());
        let writer = client.bulk("Tag").unwrap();

        let mut batch = rows(vec![
            Record::from_pairs([("name", "Rust")]),
            Record::from_pairs([("name", "sql")]),
            Record::from_pairs([("name", "new")]),
        ]);
        let matched = writer.select_by(&mut batch, &["name"], &[]).await.unwrap();
        assert_eq!(matched, 2);
        assert_eq!(batch.get_by_id(7).and_then(|r| r.get("name")), Some(&Value::from("Rust")));
        assert!(!batch.records()[2].has("id"));

        let (sql, params) = engine.last_statement().unwrap();
        assert_eq!(
            sql,
            "SELECT tags.\"name\", tags.id FROM tags WHERE tags.\"name\" IN (?, ?, ?)"
        );
        assert_eq!(params.len(), 3);
    }

    #[tokio::test]
    async fn test_select_by_groups_composite_keys() {
        let engine = MockEngine::new();
        let client = client(engine.clone());
        let writer = client.bulk("Comment").unwrap();
        let mut batch = rows(vec![
            Record::from_pairs([("postId", Value::Int(1)), ("body", Value::from("a"))]),
            Record::from_pairs([("postId", Value::Int(1)), ("body", Value::Null)]),
            Record::from_pairs([("postId", Value::Int(2)), ("body", Value::from("b"))]),
        ]);
        writer.select_by(&mut batch, &["postId", "body"], &[]).await.unwrap();

        let (sql, _) = engine.last_statement().unwrap();
        assert_eq!(
            sql,
            "SELECT comments.\"postId\", comments.body, comments.id FROM comments WHERE \
             ((comments.\"postId\" = ? AND (comments.body IN (?) OR comments.body IS NULL)) \
             OR (comments.\"postId\" = ? AND comments.body IN (?)))"
        );
    }

    #[tokio::test]
    async fn test_duplicate_identities_are_ambiguous() {
        let client = client(MockEngine::new());
        let writer = client.bulk("Tag").unwrap();
        let mut batch = rows(vec![
            Record::from_pairs([("name", "x")]),
            Record::from_pairs([("name", "x")]),
        ]);
        let err = writer.select_by(&mut batch, &["name"], &[]).await.unwrap_err();
        assert!(err.is_ambiguous_match());
    }

    #[tokio::test]
    async fn test_stored_row_matching_nothing_is_ambiguous() {
        let engine = MockEngine::new();
        engine.respond(
            "FROM tags",
            vec![MockEngine::row([("id", Value::Int(1)), ("name", Value::from("RUST"))])],
        );
        let client = client(engine);
        let writer = client.bulk("Tag").unwrap();
        let mut batch = rows(vec![Record::from_pairs([("name", "rust")])]);
        let err = writer.select_by(&mut batch, &["name"], &[]).await.unwrap_err();
        assert!(err.is_ambiguous_match());
    }

    #[test]
    fn test_number_identity_survives_text_storage() {
        let client = client(MockEngine::new());
        let mut writer = client.bulk("Tag").unwrap();
        writer.serializer("name", Serializer::Number);

        let memory = Record::from_pairs([("name", Value::Float(123.4545))]);
        let stored = Record::from_pairs([("name", Value::from("123.45450000"))]);
        assert_eq!(
            writer.row_identity(&memory, &["name"]),
            writer.row_identity(&stored, &["name"])
        );
        let text = Record::from_pairs([("name", Value::from(" as as a a "))]);
        assert_eq!(writer.row_identity(&text, &["name"]).as_str(), "s: as as a a ");
    }

    #[test]
    fn test_date_identity_rounds_to_storage_precision() {
        let client = crate::testing::client_with(
            MockEngine::new(),
            crate::EloquentConfig::new(crate::Dialect::MySql),
        )
        .unwrap();
        let mut writer = client.bulk("Tag").unwrap();
        writer.serializer("name", Serializer::Date);
        let precise = NaiveDate::from_ymd_opt(2017, 6, 3)
            .and_then(|d| d.and_hms_milli_opt(11, 5, 1, 600))
            .unwrap();
        let memory = Record::from_pairs([("name", Value::DateTime(precise))]);
        let stored = Record::from_pairs([("name", Value::from("2017-06-03 11:05:02"))]);

        assert_eq!(
            writer.row_identity(&memory, &["name"]),
            writer.row_identity(&stored, &["name"])
        );
    }

    #[test]
    fn test_boolean_and_case_folding() {
        let client = crate::testing::client_with(
            MockEngine::new(),
            crate::EloquentConfig::new(crate::Dialect::MySql),
        )
        .unwrap();
        let mut writer = client.bulk("Tag").unwrap();
        let yes = Record::from_pairs([("flag", Value::Bool(true)), ("name", Value::from("Rust"))]);
        let one = Record::from_pairs([("flag", Value::Int(1)), ("name", Value::from("rust"))]);
        writer
            .serializer("flag", Serializer::Boolean)
            .serializer("name", Serializer::String);
        assert_eq!(
            writer.row_identity(&yes, &["flag", "name"]),
            writer.row_identity(&one, &["flag", "name"])
        );
    }

    #[test]
    fn test_large_integers_keep_distinct_identities() {
        let client = client(MockEngine::new());
        let writer = client.bulk("Tag").unwrap();
        let big = Record::from_pairs([("weight", Value::Int(9_007_199_254_740_993))]);
        let next = Record::from_pairs([("weight", Value::Int(9_007_199_254_740_992))]);

        assert_ne!(
            writer.row_identity(&big, &["weight"]),
            writer.row_identity(&next, &["weight"])
        );
        assert_eq!(writer.row_identity(&big, &["weight"]).as_str(), "n:9007199254740993");

        let mut numeric = client.bulk("Tag").unwrap();
        numeric.serializer("weight", Serializer::Number);
        let text = Record::from_pairs([("weight", Value::from("9007199254740993"))]);
        assert_eq!(
            numeric.row_identity(&text, &["weight"]),
            numeric.row_identity(&big, &["weight"])
        );
    }

    #[test]
    fn test_boolean_inference_follows_storage_quirk() {
        let flag = Record::from_pairs([("flag", Value::Bool(true))]);

        let client = client(MockEngine::new());
        let writer = client.bulk("Tag").unwrap();
        assert!(client.config().quirks().booleans_as_integers);
        assert_eq!(writer.row_identity(&flag, &["flag"]).as_str(), "b:1");

        let quirks = StorageQuirks {
            booleans_as_integers: false,
            ..crate::Dialect::Sqlite.default_quirks()
        };
        let client = crate::testing::client_with(
            MockEngine::new(),
            crate::EloquentConfig::default().storage(quirks),
        )
        .unwrap();
        let writer = client.bulk("Tag").unwrap();
        assert_eq!(writer.row_identity(&flag, &["flag"]).as_str(), "n:1");
    }

    #[tokio::test]
    async fn test_select_by_matches_booleans_stored_as_integers() {
        let engine = MockEngine::new();
        engine.respond(
            "FROM tags",
            vec![
                MockEngine::row([("id", Value::Int(1)), ("flag", Value::Int(0))]),
                MockEngine::row([("id", Value::Int(2)), ("flag", Value::Int(1))]),
            ],
        );
        let client = client(engine);
        let writer = client.bulk("Tag").unwrap();
        let mut batch = rows(vec![
            Record::from_pairs([("flag", Value::Bool(true))]),
            Record::from_pairs([("flag", Value::Bool(false))]),
        ]);

        assert_eq!(writer.select_by(&mut batch, &["flag"], &[]).await.unwrap(), 2);
        assert_eq!(batch.records()[0].get("id"), Some(&Value::Int(2)));
        assert_eq!(batch.records()[1].get("id"), Some(&Value::Int(1)));
    }
}
