//! Filter trees for WHERE clauses, including correlated relation predicates.

use crate::error::{QueryError, QueryResult};
use crate::operator::{Comparison, Operand, Operator};
use crate::select::SelectQuery;
use crate::sql::SqlBuilder;
use crate::value::Value;

/// Where the keys on the right-hand side of a correlated `IN` come from.
#[derive(Debug, Clone, PartialEq)]
pub enum KeySource {
    /// A column of an enclosing query, e.g. `users.id`.
    Column(String),
    /// A subquery projecting one key column.
    Subquery(Box<SelectQuery>),
}

/// A filter that can be rendered to SQL.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Filter {
    /// No filter (always true).
    #[default]
    None,
    /// `column <op> operands`.
    Compare {
        /// Column, optionally qualified.
        column: String,
        /// Operator with its operands.
        comparison: Comparison,
    },
    /// `column IN (<keys>)` correlated to an outer query or subquery.
    InKeys {
        /// Column, qualified.
        column: String,
        /// Key source.
        source: KeySource,
    },
    /// `[NOT] EXISTS (subquery)`.
    Exists {
        /// The subquery.
        query: Box<SelectQuery>,
        /// Whether to negate.
        negated: bool,
    },
    /// `(SELECT COUNT(*) ...) <op> operands`.
    Count {
        /// The counting subquery.
        query: Box<SelectQuery>,
        /// Operator with its operands.
        comparison: Comparison,
    },
    /// Placeholder for a relation filter still being built.
    Deferred(u64),
    /// Logical AND of multiple filters.
    And(Vec<Filter>),
    /// Logical OR of multiple filters.
    Or(Vec<Filter>),
    /// Logical NOT of a filter.
    Not(Box<Filter>),
}

impl Filter {
    /// Check if this filter is empty.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// `column <op> operands`.
    pub fn compare(column: impl Into<String>, comparison: Comparison) -> Self {
        Self::Compare {
            column: column.into(),
            comparison,
        }
    }

    /// `column = value`, or `column IS NULL` for a null value.
    pub fn equals(column: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        let comparison = if value.is_null() {
            Comparison::from_parts(Operator::IsNull, Vec::new())
        } else {
            Comparison::from_parts(Operator::Eq, vec![Operand::Value(value)])
        };
        Self::compare(column, comparison)
    }

    /// `column IN (values)`.
    pub fn in_values(column: impl Into<String>, values: Vec<Value>) -> Self {
        Self::compare(
            column,
            Comparison::from_parts(Operator::In, vec![Operand::List(values)]),
        )
    }

    /// `column IS NULL`.
    pub fn is_null(column: impl Into<String>) -> Self {
        Self::compare(column, Comparison::from_parts(Operator::IsNull, Vec::new()))
    }

    /// Create an AND filter.
    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        let mut filters: Vec<_> = filters.into_iter().filter(|f| !f.is_none()).collect();
        match filters.len() {
            0 => Self::None,
            1 => filters.remove(0),
            _ => Self::And(filters),
        }
    }

    /// Create an OR filter.
    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        let mut filters: Vec<_> = filters.into_iter().filter(|f| !f.is_none()).collect();
        match filters.len() {
            0 => Self::None,
            1 => filters.remove(0),
            _ => Self::Or(filters),
        }
    }

    /// Create a NOT filter.
    pub fn not(filter: Filter) -> Self {
        if filter.is_none() {
            return Self::None;
        }
        Self::Not(Box::new(filter))
    }

    /// Combine with another filter using AND.
    pub fn and_then(self, other: Filter) -> Self {
        if self.is_none() {
            return other;
        }
        if other.is_none() {
            return self;
        }
        match self {
            Self::And(mut filters) => {
                filters.push(other);
                Self::And(filters)
            }
            _ => Self::And(vec![self, other]),
        }
    }

    /// Combine with another filter using OR.
    pub fn or_else(self, other: Filter) -> Self {
        if self.is_none() {
            return other;
        }
        if other.is_none() {
            return self;
        }
        match self {
            Self::Or(mut filters) => {
                filters.push(other);
                Self::Or(filters)
            }
            _ => Self::Or(vec![self, other]),
        }
    }

    /// Replace the placeholder for `slot`. Returns whether it was found.
    pub(crate) fn replace_deferred(&mut self, slot: u64, replacement: &mut Option<Filter>) -> bool {
        match self {
            Self::Deferred(id) if *id == slot => {
                *self = replacement.take().unwrap_or_default();
                true
            }
            Self::And(filters) | Self::Or(filters) => filters
                .iter_mut()
                .any(|f| f.replace_deferred(slot, replacement)),
            Self::Not(inner) => inner.replace_deferred(slot, replacement),
            _ => false,
        }
    }

    /// Render into a builder.
    pub fn write_sql(&self, builder: &mut SqlBuilder) -> QueryResult<()> {
        match self {
            Self::None => {
                builder.push("1 = 1");
            }
            Self::Compare { column, comparison } => match comparison.empty_list_truth() {
                Some(true) => {
                    builder.push("1 = 1");
                }
                Some(false) => {
                    builder.push("1 = 0");
                }
                None => {
                    builder.push_identifier(column);
                    comparison.write_sql(builder);
                }
            },
            Self::InKeys { column, source } => {
                builder.push_identifier(column).push(" IN (");
                match source {
                    KeySource::Column(outer) => {
                        builder.push_identifier(outer);
                    }
                    KeySource::Subquery(query) => query.write_sql(builder)?,
                }
                builder.push(")");
            }
            Self::Exists { query, negated } => {
                if *negated {
                    builder.push("NOT ");
                }
                builder.push("EXISTS (");
                query.write_sql(builder)?;
                builder.push(")");
            }
            Self::Count { query, comparison } => {
                builder.push("(");
                query.write_sql(builder)?;
                builder.push(")");
                comparison.write_sql(builder);
            }
            Self::Deferred(slot) => {
                return Err(QueryError::internal(format!(
                    "relation filter #{} was rendered before pending tasks were resolved",
                    slot
                )));
            }
            Self::And(filters) | Self::Or(filters) => {
                if filters.is_empty() {
                    builder.push(if matches!(self, Self::And(_)) { "1 = 1" } else { "1 = 0" });
                    return Ok(());
                }
                let joiner = if matches!(self, Self::And(_)) { " AND " } else { " OR " };
                builder.push("(");
                for (i, filter) in filters.iter().enumerate() {
                    if i > 0 {
                        builder.push(joiner);
                    }
                    filter.write_sql(builder)?;
                }
                builder.push(")");
            }
            Self::Not(filter) => {
                builder.push("NOT (");
                filter.write_sql(builder)?;
                builder.push(")");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::Dialect;

    fn render(filter: &Filter) -> (String, Vec<Value>) {
        let mut builder = SqlBuilder::new(Dialect::Sqlite);
        filter.write_sql(&mut builder).unwrap();
        builder.build()
    }

    #[test]
    fn test_equals_null_becomes_is_null() {
        let (sql, params) = render(&Filter::equals("deletedAt", Value::Null));
        assert_eq!(sql, "\"deletedAt\" IS NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn test_and_or_fold_left() {
        let filter = Filter::equals("a", 1)
            .or_else(Filter::equals("b", 2))
            .and_then(Filter::equals("c", 3));
        let (sql, params) = render(&filter);
        assert_eq!(sql, "((a = ? OR b = ?) AND c = ?)");
        assert_eq!(params, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn test_empty_in_lists() {
        assert_eq!(render(&Filter::in_values("id", vec![])).0, "1 = 0");
        let not_in = Filter::compare(
            "id",
            Comparison::from_parts(Operator::NotIn, vec![Operand::List(vec![])]),
        );
        assert_eq!(render(&not_in).0, "1 = 1");
    }

    #[test]
    fn test_in_keys_from_outer_column() {
        let filter = Filter::InKeys {
            column: "posts.createdById".into(),
            source: KeySource::Column("users.id".into()),
        };
        assert_eq!(render(&filter).0, "posts.\"createdById\" IN (users.id)");
    }

    #[test]
    fn test_deferred_placeholder() {
        let mut filter = Filter::equals("a", 1).and_then(Filter::Deferred(7));
        let mut builder = SqlBuilder::new(Dialect::Sqlite);
        assert!(filter.write_sql(&mut builder).is_err());

        let mut replacement = Some(Filter::is_null("b"));
        assert!(filter.replace_deferred(7, &mut replacement));
        assert_eq!(render(&filter).0, "(a = ? AND b IS NULL)");
        assert!(!filter.replace_deferred(7, &mut None));
    }
}
