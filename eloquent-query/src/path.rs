//! Relation path parsing and relation-argument normalization.
//!
//! A path names a chain of relations, optionally aliased segment by segment:
//!
//! ```rust
//! use eloquent_query::RelationPath;
//!
//! let path = RelationPath::parse("posts.comments as p.c").unwrap();
//! let pairs: Vec<_> = path
//!     .segments()
//!     .iter()
//!     .map(|s| (s.name.as_str(), s.alias.as_str()))
//!     .collect();
//! assert_eq!(pairs, [("posts", "p"), ("comments", "c")]);
//! ```

use std::fmt;
use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;
use regex_lite::Regex;
use smallvec::SmallVec;

use crate::error::{QueryError, QueryResult};
use crate::query::Query;

static ALIAS_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+as\s+").expect("alias separator pattern"));

/// One relation in a path with the key it is attached under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    /// Relation name on the model at this depth.
    pub name: String,
    /// Key the loaded relation is attached under.
    pub alias: String,
}

/// A parsed relation path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationPath {
    text: String,
    segments: SmallVec<[PathSegment; 4]>,
}

fn split_segments(text: &str, part: &str) -> QueryResult<Vec<String>> {
    let part = part.trim();
    if part.is_empty() {
        return Err(QueryError::format(text, "empty path"));
    }
    part.split('.')
        .map(|segment| {
            let segment = segment.trim();
            if segment.is_empty() || segment.chars().any(char::is_whitespace) {
                Err(QueryError::format(
                    text,
                    format!("invalid segment '{}'", segment),
                ))
            } else {
                Ok(segment.to_string())
            }
        })
        .collect()
}

fn split_alias(text: &str) -> QueryResult<(&str, Option<&str>)> {
    let mut parts = ALIAS_SEPARATOR.splitn(text, 3);
    let path = parts.next().unwrap_or_default();
    let alias = parts.next();
    if parts.next().is_some() {
        return Err(QueryError::format(text, "more than one 'as'"));
    }
    Ok((path, alias))
}

impl RelationPath {
    /// Parse `"a.b.c"` or `"a.b.c as x.y.z"`.
    ///
    /// The alias chain, when given, must have one alias per segment.
    pub fn parse(text: &str) -> QueryResult<Self> {
        let (path, alias) = split_alias(text)?;
        let names = split_segments(text, path)?;
        let aliases = match alias {
            Some(alias) => {
                let aliases = split_segments(text, alias)?;
                if aliases.len() != names.len() {
                    return Err(QueryError::format(
                        text,
                        format!(
                            "{} alias(es) given for {} segment(s)",
                            aliases.len(),
                            names.len()
                        ),
                    ));
                }
                aliases
            }
            None => names.clone(),
        };

        Ok(Self {
            text: text.trim().to_string(),
            segments: names
                .into_iter()
                .zip(aliases)
                .map(|(name, alias)| PathSegment { name, alias })
                .collect(),
        })
    }

    /// Parse a count path, `"a.b"` or `"a.b as columnName"`.
    ///
    /// The alias names the output column rather than each segment.
    pub fn parse_counted(text: &str) -> QueryResult<(Self, Option<String>)> {
        let (path, alias) = split_alias(text)?;
        let parsed = Self::parse(path)?;
        let alias = match alias.map(str::trim) {
            Some(alias) if alias.is_empty() || alias.contains(char::is_whitespace) => {
                return Err(QueryError::format(text, "invalid count alias"));
            }
            other => other.map(str::to_string),
        };
        Ok((parsed, alias))
    }

    /// The original text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The segments, outermost first.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Relation names, outermost first.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(|s| s.name.as_str())
    }

    /// Derived count column: camel-cased segments plus `suffix`.
    ///
    /// `posts.comments` with suffix `Count` gives `postsCommentsCount`.
    pub fn count_column(&self, suffix: &str) -> String {
        let mut column = String::new();
        for (i, segment) in self.segments.iter().enumerate() {
            if i == 0 {
                column.push_str(&segment.name);
                continue;
            }
            let mut chars = segment.name.chars();
            if let Some(first) = chars.next() {
                column.extend(first.to_uppercase());
                column.push_str(chars.as_str());
            }
        }
        column.push_str(suffix);
        column
    }
}

/// A filter applied to the query for the last segment of a path.
pub type Constraint = Arc<dyn Fn(&mut Query) -> QueryResult<()> + Send + Sync>;

/// Wrap a closure as a [`Constraint`].
pub fn constraint<F>(f: F) -> Constraint
where
    F: Fn(&mut Query) -> QueryResult<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Relation paths mapped to optional constraints.
///
/// Inserting a path that is already present replaces its constraint.
#[derive(Clone, Default)]
pub struct Relations {
    entries: IndexMap<String, Option<Constraint>>,
}

impl Relations {
    /// No relations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a path without a constraint.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.insert(path.into(), None);
        self
    }

    /// Add a path with a constraint.
    pub fn with(mut self, path: impl Into<String>, constraint: Constraint) -> Self {
        self.insert(path.into(), Some(constraint));
        self
    }

    /// Insert or overwrite a path.
    pub fn insert(&mut self, path: String, constraint: Option<Constraint>) {
        self.entries.insert(path.trim().to_string(), constraint);
    }

    /// Merge another set; its entries win.
    pub fn extend(&mut self, other: Relations) {
        for (path, constraint) in other.entries {
            self.entries.insert(path, constraint);
        }
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Constraint>)> {
        self.entries.iter().map(|(path, c)| (path.as_str(), c.as_ref()))
    }

    /// Number of distinct paths.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no paths.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Normalize loosely typed input: a string, an object whose values are
    /// null, or an array of those.
    pub fn from_json(value: &serde_json::Value) -> QueryResult<Self> {
        let mut relations = Self::new();
        match value {
            serde_json::Value::String(path) => relations.insert(path.clone(), None),
            serde_json::Value::Array(items) => {
                for item in items {
                    if item.is_array() {
                        return Err(QueryError::argument(
                            "Nested arrays are not valid relation arguments",
                        ));
                    }
                    relations.extend(Self::from_json(item)?);
                }
            }
            serde_json::Value::Object(map) => {
                for (path, constraint) in map {
                    if !constraint.is_null() {
                        return Err(QueryError::argument(format!(
                            "Relation '{}' maps to {} but only null is accepted here",
                            path, constraint
                        ))
                        .with_suggestion("Attach constraints with Relations::with"));
                    }
                    relations.insert(path.clone(), None);
                }
            }
            other => {
                return Err(QueryError::argument(format!(
                    "Expected a relation path, an object or an array, got {}",
                    other
                )));
            }
        }
        Ok(relations)
    }
}

impl fmt::Debug for Relations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.entries
                    .iter()
                    .map(|(path, c)| (path, if c.is_some() { "<constraint>" } else { "-" })),
            )
            .finish()
    }
}

/// Anything accepted where relations are named.
pub trait IntoRelations {
    /// Normalize into [`Relations`].
    fn into_relations(self) -> QueryResult<Relations>;
}

impl IntoRelations for Relations {
    fn into_relations(self) -> QueryResult<Relations> {
        Ok(self)
    }
}

impl IntoRelations for &str {
    fn into_relations(self) -> QueryResult<Relations> {
        Ok(Relations::new().path(self))
    }
}

impl IntoRelations for String {
    fn into_relations(self) -> QueryResult<Relations> {
        Ok(Relations::new().path(self))
    }
}

impl IntoRelations for &serde_json::Value {
    fn into_relations(self) -> QueryResult<Relations> {
        Relations::from_json(self)
    }
}

impl<S, F> IntoRelations for (S, F)
where
    S: Into<String>,
    F: Fn(&mut Query) -> QueryResult<()> + Send + Sync + 'static,
{
    fn into_relations(self) -> QueryResult<Relations> {
        Ok(Relations::new().with(self.0, constraint(self.1)))
    }
}

impl<T: IntoRelations> IntoRelations for Vec<T> {
    fn into_relations(self) -> QueryResult<Relations> {
        let mut relations = Relations::new();
        for item in self {
            relations.extend(item.into_relations()?);
        }
        Ok(relations)
    }
}

impl<T: IntoRelations, const N: usize> IntoRelations for [T; N] {
    fn into_relations(self) -> QueryResult<Relations> {
        Vec::from(self).into_relations()
    }
}
