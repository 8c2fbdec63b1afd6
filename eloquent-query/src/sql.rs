//! SQL generation utilities.

use serde::{Deserialize, Serialize};

use crate::config::{StorageQuirks, TimestampPrecision};
use crate::error::{QueryError, QueryResult};
use crate::value::Value;

/// Check if an identifier needs quoting.
///
/// Reserved words, names with special characters and names with upper-case
/// letters (which some engines fold) are quoted.
pub fn needs_quoting(name: &str) -> bool {
    let reserved = [
        "user", "order", "group", "select", "from", "where", "table", "index", "key",
        "primary", "foreign", "check", "default", "null", "not", "and", "or", "in", "is",
        "like", "between", "case", "when", "then", "else", "end", "as", "on", "join", "left",
        "right", "inner", "outer", "cross", "natural", "using", "limit", "offset", "union",
        "intersect", "except", "all", "distinct", "having", "create", "alter", "drop",
        "insert", "update", "delete", "into", "values", "set", "returning", "replace",
        "text", "string", "integer", "float", "decimal", "boolean", "date", "time",
        "timestamp", "number", "name",
    ];

    if reserved.contains(&name.to_lowercase().as_str()) {
        return true;
    }

    name.is_empty()
        || name.starts_with(|c: char| c.is_ascii_digit())
        || !name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// SQL dialect of the target storage engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// PostgreSQL uses $1, $2, etc.
    #[serde(alias = "postgresql")]
    Postgres,
    /// MySQL uses ? and backtick quoting.
    MySql,
    /// SQLite uses ? and double-quote quoting.
    Sqlite,
}

impl Dialect {
    /// Get the parameter placeholder for a 1-based index.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Self::Postgres => format!("${}", index),
            Self::MySql | Self::Sqlite => "?".to_string(),
        }
    }

    /// Quote a single identifier if needed.
    pub fn quote(&self, name: &str) -> String {
        if name == "*" || !needs_quoting(name) {
            return name.to_string();
        }
        match self {
            Self::MySql => format!("`{}`", name.replace('`', "``")),
            Self::Postgres | Self::Sqlite => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }

    /// Quote a possibly qualified identifier (`table.column`).
    pub fn quote_path(&self, path: &str) -> String {
        path.split('.')
            .map(|part| self.quote(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Operator text for null-safe equality.
    pub fn null_safe_eq(&self) -> &'static str {
        match self {
            Self::MySql => "<=>",
            Self::Sqlite => "IS",
            Self::Postgres => "IS NOT DISTINCT FROM",
        }
    }

    /// Clause appended to a multi-row insert to make key conflicts a no-op.
    pub fn ignore_duplicates_clause(&self, id_column: &str) -> String {
        match self {
            Self::MySql => {
                let id = self.quote(id_column);
                format!(" ON DUPLICATE KEY UPDATE {} = {}", id, id)
            }
            Self::Postgres | Self::Sqlite => " ON CONFLICT DO NOTHING".to_string(),
        }
    }

    /// Verb for a full-row replace, if the engine has one.
    pub fn replace_verb(&self) -> QueryResult<&'static str> {
        match self {
            Self::MySql | Self::Sqlite => Ok("REPLACE"),
            Self::Postgres => Err(QueryError::argument(
                "PostgreSQL has no REPLACE statement; use insert with ignore_duplicates",
            )),
        }
    }

    /// Text bound for a column a row does not carry in a multi-row insert.
    pub fn missing_value(&self) -> &'static str {
        match self {
            Self::Sqlite => "NULL",
            Self::MySql | Self::Postgres => "DEFAULT",
        }
    }

    /// Storage behaviour assumed for this dialect.
    pub fn default_quirks(&self) -> StorageQuirks {
        match self {
            Self::MySql => StorageQuirks {
                sequential_ids: true,
                timestamp_precision: TimestampPrecision::Seconds,
                booleans_as_integers: true,
                case_insensitive_strings: true,
            },
            Self::Sqlite => StorageQuirks {
                sequential_ids: true,
                timestamp_precision: TimestampPrecision::Milliseconds,
                booleans_as_integers: true,
                case_insensitive_strings: false,
            },
            Self::Postgres => StorageQuirks {
                sequential_ids: false,
                timestamp_precision: TimestampPrecision::Milliseconds,
                booleans_as_integers: false,
                case_insensitive_strings: false,
            },
        }
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Self::Sqlite
    }
}

/// A SQL builder for constructing statements.
///
/// Subqueries render into the same builder so placeholders stay numbered
/// in textual order.
#[derive(Debug, Clone)]
pub struct SqlBuilder {
    dialect: Dialect,
    sql: String,
    params: Vec<Value>,
}

impl SqlBuilder {
    /// Create a new SQL builder.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// The dialect being rendered.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Push a literal SQL string.
    pub fn push(&mut self, sql: impl AsRef<str>) -> &mut Self {
        self.sql.push_str(sql.as_ref());
        self
    }

    /// Push a bound parameter.
    pub fn push_param(&mut self, value: impl Into<Value>) -> &mut Self {
        let index = self.params.len() + 1;
        self.sql.push_str(&self.dialect.placeholder(index));
        self.params.push(value.into());
        self
    }

    /// Push a comma-separated list of bound parameters.
    pub fn push_params<'a>(&mut self, values: impl IntoIterator<Item = &'a Value>) -> &mut Self {
        for (i, value) in values.into_iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            self.push_param(value.clone());
        }
        self
    }

    /// Push a possibly qualified identifier, quoted where needed.
    pub fn push_identifier(&mut self, name: &str) -> &mut Self {
        let quoted = self.dialect.quote_path(name);
        self.sql.push_str(&quoted);
        self
    }

    /// Build the final SQL string and parameters.
    pub fn build(self) -> (String, Vec<Value>) {
        (self.sql, self.params)
    }

    /// Get the current SQL string.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Get the current parameters.
    pub fn params(&self) -> &[Value] {
        &self.params
    }
}
