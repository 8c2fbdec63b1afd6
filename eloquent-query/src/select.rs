//! SELECT statements as data, rendered through [`SqlBuilder`].

use crate::error::QueryResult;
use crate::filter::Filter;
use crate::sql::{Dialect, SqlBuilder};
use crate::types::OrderByField;
use crate::value::Value;

/// One entry of a select list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `<qualifier>.*`
    AllColumns,
    /// A column, qualified with the query's table or alias unless already qualified.
    Column(String),
    /// `COUNT(*)`
    CountAll,
    /// The literal `1`, used for EXISTS subqueries.
    One,
    /// `(<subquery>) AS alias`
    Subquery {
        /// The scalar subquery.
        query: Box<SelectQuery>,
        /// Output column name.
        alias: String,
    },
}

/// A single-table SELECT with optional correlated subqueries.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    /// Base table.
    pub table: String,
    /// Alias for the base table inside this statement.
    pub alias: Option<String>,
    /// Select list; empty means all columns.
    pub columns: Vec<SelectItem>,
    /// WHERE clause.
    pub filter: Filter,
    /// ORDER BY clause.
    pub order_by: Vec<OrderByField>,
    /// LIMIT.
    pub limit: Option<u64>,
    /// OFFSET.
    pub offset: Option<u64>,
}

impl SelectQuery {
    /// Select everything from a table.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: None,
            columns: Vec::new(),
            filter: Filter::None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Set the table alias.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Replace the select list.
    pub fn columns(mut self, columns: Vec<SelectItem>) -> Self {
        self.columns = columns;
        self
    }

    /// AND a filter onto the WHERE clause.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = std::mem::take(&mut self.filter).and_then(filter);
        self
    }

    /// Name columns are qualified with.
    pub fn qualifier(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    /// Qualify a bare column name.
    pub fn qualify(&self, column: &str) -> String {
        if column.contains('.') {
            column.to_string()
        } else {
            format!("{}.{}", self.qualifier(), column)
        }
    }

    /// Project a single key column.
    pub fn project(mut self, column: &str) -> Self {
        let qualified = self.qualify(column);
        self.columns = vec![SelectItem::Column(qualified)];
        self.order_by.clear();
        self
    }

    /// Turn into `SELECT COUNT(*)` over the same rows.
    pub fn into_count(mut self) -> Self {
        self.columns = vec![SelectItem::CountAll];
        self.order_by.clear();
        self.limit = None;
        self.offset = None;
        self
    }

    /// Turn into `SELECT 1` for use under EXISTS.
    pub fn into_exists(mut self) -> Self {
        self.columns = vec![SelectItem::One];
        self.order_by.clear();
        self
    }

    /// Render into an existing builder.
    pub fn write_sql(&self, builder: &mut SqlBuilder) -> QueryResult<()> {
        builder.push("SELECT ");
        if self.columns.is_empty() {
            builder.push_identifier(&format!("{}.*", self.qualifier()));
        }
        for (i, item) in self.columns.iter().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            match item {
                SelectItem::AllColumns => {
                    builder.push_identifier(&format!("{}.*", self.qualifier()));
                }
                SelectItem::Column(column) => {
                    builder.push_identifier(&self.qualify(column));
                }
                SelectItem::CountAll => {
                    builder.push("COUNT(*)");
                }
                SelectItem::One => {
                    builder.push("1");
                }
                SelectItem::Subquery { query, alias } => {
                    builder.push("(");
                    query.write_sql(builder)?;
                    builder.push(") AS ").push_identifier(alias);
                }
            }
        }

        builder.push(" FROM ").push_identifier(&self.table);
        if let Some(alias) = self.alias.as_deref().filter(|a| *a != self.table) {
            builder.push(" AS ").push_identifier(alias);
        }

        if !self.filter.is_none() {
            builder.push(" WHERE ");
            self.filter.write_sql(builder)?;
        }

        if !self.order_by.is_empty() {
            builder.push(" ORDER BY ");
            for (i, field) in self.order_by.iter().enumerate() {
                if i > 0 {
                    builder.push(", ");
                }
                field.write_sql(builder);
            }
        }

        match (self.limit, self.offset) {
            (Some(limit), _) => {
                builder.push(format!(" LIMIT {}", limit));
            }
            (None, Some(_)) => match builder.dialect() {
                Dialect::Sqlite => {
                    builder.push(" LIMIT -1");
                }
                Dialect::MySql => {
                    builder.push(" LIMIT 18446744073709551615");
                }
                Dialect::Postgres => {}
            },
            (None, None) => {}
        }
        if let Some(offset) = self.offset {
            builder.push(format!(" OFFSET {}", offset));
        }
        Ok(())
    }

    /// Render to SQL text and parameters.
    pub fn build(&self, dialect: Dialect) -> QueryResult<(String, Vec<Value>)> {
        let mut builder = SqlBuilder::new(dialect);
        self.write_sql(&mut builder)?;
        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::KeySource;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_plain_select() {
        let query = SelectQuery::new("users").filter(Filter::equals("name", "ada"));
        let (sql, params) = query.build(Dialect::Sqlite).unwrap();
        assert_eq!(sql, "SELECT users.* FROM users WHERE \"name\" = ?");
        assert_eq!(params, vec![Value::from("ada")]);
    }

    #[test]
    fn test_offset_without_limit() {
        let mut query = SelectQuery::new("users");
        query.offset = Some(10);
        assert_eq!(
            query.build(Dialect::Sqlite).unwrap().0,
            "SELECT users.* FROM users LIMIT -1 OFFSET 10"
        );
        assert_eq!(
            query.build(Dialect::Postgres).unwrap().0,
            "SELECT users.* FROM users OFFSET 10"
        );
    }

    #[test]
    fn test_scalar_count_column() {
        let count = SelectQuery::new("posts")
            .filter(Filter::InKeys {
                column: "posts.createdById".into(),
                source: KeySource::Column("users.id".into()),
            })
            .into_count();
        let query = SelectQuery::new("users").columns(vec![
            SelectItem::AllColumns,
            SelectItem::Subquery {
                query: Box::new(count),
                alias: "postsCount".into(),
            },
        ]);
        assert_eq!(
            query.build(Dialect::Sqlite).unwrap().0,
            "SELECT users.*, (SELECT COUNT(*) FROM posts WHERE posts.\"createdById\" IN (users.id)) \
             AS \"postsCount\" FROM users"
        );
    }

    #[test]
    fn test_alias_qualifies_columns() {
        let query = SelectQuery::new("roles").alias("roles_1").project("id");
        assert_eq!(
            query.build(Dialect::Sqlite).unwrap().0,
            "SELECT roles_1.id FROM roles AS roles_1"
        );
    }
}
