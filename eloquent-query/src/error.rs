//! Error types for relation loading, relation filters and bulk matching.
//!
//! Every error carries an [`ErrorCode`] for programmatic handling plus an
//! [`ErrorContext`] with actionable suggestions.
//!
//! # Error Codes
//!
//! Codes follow the pattern `E{category}{number}`:
//! - 1xxx: call-site errors (arguments, path syntax, operators)
//! - 2xxx: relation errors (unknown relation, unsupported kind, missing key column)
//! - 3xxx: bulk matching errors (ambiguous identity, reconciliation)
//! - 4xxx: connection errors
//! - 5xxx: execution errors
//! - 6xxx: data errors
//! - 7xxx: configuration errors
//! - 9xxx: internal errors
//!
//! ```rust
//! use eloquent_query::{ErrorCode, QueryError};
//!
//! let err = QueryError::relation_not_found("comments", "users");
//! assert_eq!(err.code, ErrorCode::RelationNotFound);
//! assert!(err.to_string().contains("comments"));
//! ```

use std::fmt;
use thiserror::Error;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Call-site errors (1xxx)
    /// Malformed argument shape or operand count (E1001).
    InvalidArgument = 1001,
    /// Malformed relation path or alias syntax (E1002).
    InvalidFormat = 1002,
    /// Comparison operator not recognized (E1003).
    UnknownOperator = 1003,

    // Relation errors (2xxx)
    /// Relation not defined on the model (E2001).
    RelationNotFound = 2001,
    /// Relation kind not handled by the loader (E2002).
    UnsupportedRelation = 2002,
    /// A row lacks a key column needed for correlation (E2003).
    MissingColumn = 2003,

    // Bulk matching errors (3xxx)
    /// Duplicate or unmatched row identity (E3001).
    AmbiguousMatch = 3001,
    /// Rows left without an identifier after insert-by (E3002).
    Reconciliation = 3002,

    // Connection errors (4xxx)
    /// Database connection failed (E4001).
    ConnectionFailed = 4001,
    /// Connection pool exhausted (E4002).
    PoolExhausted = 4002,

    // Execution errors (5xxx)
    /// General database error (E5001).
    DatabaseError = 5001,

    // Data errors (6xxx)
    /// Serialization error (E6001).
    SerializationError = 6001,
    /// Deserialization error (E6002).
    DeserializationError = 6002,

    // Configuration errors (7xxx)
    /// Invalid configuration (E7001).
    InvalidConfiguration = 7001,

    // Internal errors (9xxx)
    /// Internal error (E9001).
    Internal = 9001,
}

impl ErrorCode {
    /// Get the error code string (e.g., "E2001").
    pub fn code(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get a short description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "Invalid argument",
            Self::InvalidFormat => "Invalid relation path format",
            Self::UnknownOperator => "Unknown comparison operator",
            Self::RelationNotFound => "Relation not found",
            Self::UnsupportedRelation => "Unsupported relation kind",
            Self::MissingColumn => "Missing key column",
            Self::AmbiguousMatch => "Ambiguous row match",
            Self::Reconciliation => "Unresolved rows after insert",
            Self::ConnectionFailed => "Database connection failed",
            Self::PoolExhausted => "Connection pool exhausted",
            Self::DatabaseError => "Database error",
            Self::SerializationError => "Serialization error",
            Self::DeserializationError => "Deserialization error",
            Self::InvalidConfiguration => "Invalid configuration",
            Self::Internal => "Internal error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Suggestion for fixing an error.
#[derive(Debug, Clone)]
pub struct Suggestion {
    /// The suggestion text.
    pub text: String,
    /// Optional code example.
    pub code: Option<String>,
}

impl Suggestion {
    /// Create a new suggestion.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            code: None,
        }
    }

    /// Add a code example.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Additional context for an error.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The operation that was being performed.
    pub operation: Option<String>,
    /// The model involved.
    pub model: Option<String>,
    /// The field or relation involved.
    pub field: Option<String>,
    /// The SQL statement (if available).
    pub sql: Option<String>,
    /// Suggestions for fixing the error.
    pub suggestions: Vec<Suggestion>,
    /// Help text.
    pub help: Option<String>,
}

/// Errors raised by query building, eager loading and bulk matching.
#[derive(Error, Debug)]
pub struct QueryError {
    /// The error code.
    pub code: ErrorCode,
    /// The error message.
    pub message: String,
    /// Additional context.
    pub context: ErrorContext,
    /// The source error (if any).
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl QueryError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Add context about the operation.
    pub fn with_context(mut self, operation: impl Into<String>) -> Self {
        self.context.operation = Some(operation.into());
        self
    }

    /// Add a suggestion for fixing the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context.suggestions.push(Suggestion::new(suggestion));
        self
    }

    /// Add a code suggestion.
    pub fn with_code_suggestion(mut self, text: impl Into<String>, code: impl Into<String>) -> Self {
        self.context.suggestions.push(Suggestion::new(text).with_code(code));
        self
    }

    /// Add help text.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.context.help = Some(help.into());
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.context.model = Some(model.into());
        self
    }

    /// Set the field.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.context.field = Some(field.into());
        self
    }

    /// Set the SQL statement.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.context.sql = Some(sql.into());
        self
    }

    /// Set the source error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // ============== Constructor Functions ==============

    /// Malformed call-site input.
    pub fn argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    /// Wrong number of operands for a comparison operator.
    pub fn operand_count(operator: &str, expected: usize, given: usize) -> Self {
        Self::argument(format!(
            "Operator '{}' takes {} operand(s) but {} were given",
            operator, expected, given
        ))
        .with_field(operator)
        .with_suggestion(match expected {
            0 => "Pass () as the operand list".to_string(),
            1 => "Pass a single value (or one list for IN / NOT IN)".to_string(),
            _ => "Pass a (low, high) tuple".to_string(),
        })
    }

    /// Malformed relation path or alias string.
    pub fn format(path: impl Into<String>, message: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::InvalidFormat,
            format!("Invalid relation path '{}': {}", path, message.into()),
        )
        .with_field(&path)
        .with_code_suggestion(
            "Give one alias per path segment",
            "query.with(\"posts.comments as p.c\")",
        )
    }

    /// Unknown comparison operator token.
    pub fn unknown_operator(operator: impl Into<String>) -> Self {
        let operator = operator.into();
        Self::new(
            ErrorCode::UnknownOperator,
            format!("Unknown comparison operator '{}'", operator),
        )
        .with_field(&operator)
        .with_help(
            "Supported: =, <=>, >, >=, <, <=, LIKE, NOT LIKE, IN, NOT IN, IS, IS NOT, \
             IS NULL, IS NOT NULL, BETWEEN, NOT BETWEEN, !=, <>",
        )
    }

    /// Relation name not registered on the model.
    pub fn relation_not_found(relation: impl Into<String>, table: impl Into<String>) -> Self {
        let relation = relation.into();
        let table = table.into();
        Self::new(
            ErrorCode::RelationNotFound,
            format!("Relation '{}' is not defined on table '{}'", relation, table),
        )
        .with_model(&table)
        .with_field(&relation)
        .with_suggestion("Check the spelling of every segment in the relation path")
        .with_suggestion(format!(
            "Register the relation on the model that owns table '{}'",
            table
        ))
    }

    /// Relation kind that the loader does not implement.
    pub fn unsupported_relation(relation: impl Into<String>, kind: impl Into<String>) -> Self {
        let relation = relation.into();
        let kind = kind.into();
        Self::new(
            ErrorCode::UnsupportedRelation,
            format!("Relation '{}' has unsupported kind '{}'", relation, kind),
        )
        .with_field(&relation)
        .with_help("Supported kinds: belongs_to, has_one, has_many, belongs_to_many")
    }

    /// A row lacks the column needed to correlate a relation.
    pub fn missing_column(
        column: impl Into<String>,
        table: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        let column = column.into();
        let table = table.into();
        let relation = relation.into();
        Self::new(
            ErrorCode::MissingColumn,
            format!(
                "Rows of '{}' lack column '{}' required to load relation '{}'",
                table, column, relation
            ),
        )
        .with_model(&table)
        .with_field(&column)
        .with_code_suggestion(
            format!("Add '{}' to the select list", column),
            format!("query.select([\"{}\", ...])", column),
        )
    }

    /// Duplicate or unmatched row identity during bulk matching.
    pub fn ambiguous_match(table: impl Into<String>, detail: impl Into<String>) -> Self {
        let table = table.into();
        Self::new(
            ErrorCode::AmbiguousMatch,
            format!("Ambiguous row match on '{}': {}", table, detail.into()),
        )
        .with_model(&table)
        .with_suggestion("Make sure the unique key columns are unique within the batch")
        .with_suggestion("Declare an explicit serializer for columns whose type is ambiguous")
    }

    /// Rows left without an identifier after insert-by.
    pub fn reconciliation(table: impl Into<String>, unresolved: usize) -> Self {
        let table = table.into();
        Self::new(
            ErrorCode::Reconciliation,
            format!(
                "{} row(s) of '{}' could not be resolved to an identifier after insert",
                unresolved, table
            ),
        )
        .with_model(&table)
        .with_suggestion(
            "A unique key column may lose precision in storage, so the stored value no longer \
             matches the in-memory value",
        )
        .with_suggestion(
            "A different unique constraint may have collided with an existing row, silently \
             dropping the insert",
        )
    }

    /// Connection failure.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConnectionFailed, message)
            .with_suggestion("Check that the database is reachable")
    }

    /// No connection became available.
    pub fn pool_exhausted(max_connections: usize) -> Self {
        Self::new(
            ErrorCode::PoolExhausted,
            format!("Connection pool exhausted (max {} connections)", max_connections),
        )
        .with_suggestion("Increase the pool size or reduce concurrent queries")
    }

    /// General database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SerializationError, message)
    }

    /// Deserialization error.
    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DeserializationError, message)
    }

    /// Invalid configuration.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfiguration, message)
    }

    /// Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    // ============== Error Type Checks ==============

    /// Check if this is a relation-not-found error.
    pub fn is_relation_not_found(&self) -> bool {
        self.code == ErrorCode::RelationNotFound
    }

    /// Check if this is an ambiguous match error.
    pub fn is_ambiguous_match(&self) -> bool {
        self.code == ErrorCode::AmbiguousMatch
    }

    /// Check if this is a missing column error.
    pub fn is_missing_column(&self) -> bool {
        self.code == ErrorCode::MissingColumn
    }

    /// Check if this error was caused by malformed call-site input.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::InvalidArgument | ErrorCode::InvalidFormat | ErrorCode::UnknownOperator
        )
    }

    /// Check if this is a connection error.
    pub fn is_connection_error(&self) -> bool {
        matches!(self.code, ErrorCode::ConnectionFailed | ErrorCode::PoolExhausted)
    }

    // ============== Display Functions ==============

    /// Display the full error with all context and suggestions.
    pub fn display_full(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("Error [{}]: {}\n", self.code.code(), self.message));

        if let Some(ref op) = self.context.operation {
            output.push_str(&format!("  → While: {}\n", op));
        }
        if let Some(ref model) = self.context.model {
            output.push_str(&format!("  → Model: {}\n", model));
        }
        if let Some(ref field) = self.context.field {
            output.push_str(&format!("  → Field: {}\n", field));
        }

        if let Some(ref sql) = self.context.sql {
            let sql_display = match sql.char_indices().nth(200) {
                Some((idx, _)) => format!("{}...", &sql[..idx]),
                None => sql.clone(),
            };
            output.push_str(&format!("  → SQL: {}\n", sql_display));
        }

        if !self.context.suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for (i, suggestion) in self.context.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion.text));
                if let Some(ref code) = suggestion.code {
                    output.push_str(&format!(
                        "     ```\n     {}\n     ```\n",
                        code.replace('\n', "\n     ")
                    ));
                }
            }
        }

        if let Some(ref help) = self.context.help {
            output.push_str(&format!("\nHelp: {}\n", help));
        }

        output
    }
}
