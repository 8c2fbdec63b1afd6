//! Model definitions and relation resolution.
//!
//! Each model carries a registry from relation name to [`RelationDef`],
//! filled in when the model is defined. Models refer to each other by name,
//! so self-referencing and cyclic graphs need no special handling.
//!
//! ```rust
//! use eloquent_query::{ModelDef, RelationKind, Schema};
//!
//! let schema = Schema::new()
//!     .model(
//!         ModelDef::new("User", "users")
//!             .soft_delete("deletedAt")
//!             .belongs_to_many("roles", "Role", "user_has_roles", "userId", "roleId"),
//!     )
//!     .model(ModelDef::new("Role", "roles"));
//!
//! let user = schema.get("User").unwrap();
//! let roles = schema.resolve(&user, "roles").unwrap();
//! assert_eq!(roles.kind, RelationKind::ManyToMany);
//! assert_eq!(roles.target_key, "id");
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{QueryError, QueryResult};

/// A relation as declared on a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationDef {
    /// The foreign key lives on this model and points at the target.
    BelongsTo {
        /// Target model name.
        target: String,
        /// Column on this model.
        foreign_key: String,
        /// Column on the target; defaults to the target's id.
        target_key: Option<String>,
    },
    /// The target holds a foreign key to this model; at most one row.
    HasOne {
        /// Target model name.
        target: String,
        /// Column on the target.
        foreign_key: String,
        /// Column on this model; defaults to this model's id.
        source_key: Option<String>,
    },
    /// The target holds a foreign key to this model.
    HasMany {
        /// Target model name.
        target: String,
        /// Column on the target.
        foreign_key: String,
        /// Column on this model; defaults to this model's id.
        source_key: Option<String>,
    },
    /// Linked through a join table holding both keys.
    BelongsToMany {
        /// Target model name.
        target: String,
        /// Join table.
        join_table: String,
        /// Join column pointing at this model.
        join_source_key: String,
        /// Join column pointing at the target.
        join_target_key: String,
        /// Column on this model; defaults to this model's id.
        source_key: Option<String>,
        /// Column on the target; defaults to the target's id.
        target_key: Option<String>,
    },
    /// Polymorphic owner.
    MorphTo {
        /// Column holding the owner type.
        type_column: String,
        /// Column holding the owner id.
        id_column: String,
    },
    /// Polymorphic children.
    MorphMany {
        /// Target model name.
        target: String,
        /// Morph name prefix on the target.
        morph_name: String,
    },
    /// Relation through an intermediate model.
    Through {
        /// Target model name.
        target: String,
        /// Intermediate model name.
        through: String,
    },
}

impl RelationDef {
    /// Kind name as written in model definitions.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::BelongsTo { .. } => "belongs_to",
            Self::HasOne { .. } => "has_one",
            Self::HasMany { .. } => "has_many",
            Self::BelongsToMany { .. } => "belongs_to_many",
            Self::MorphTo { .. } => "morph_to",
            Self::MorphMany { .. } => "morph_many",
            Self::Through { .. } => "through",
        }
    }
}

/// How two tables relate, after unification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// Exactly one related row expected (belongs-to and has-one).
    OneToOne,
    /// Foreign key on the target table.
    OneToMany,
    /// Join table with two foreign keys.
    ManyToMany,
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OneToOne => "one-to-one",
            Self::OneToMany => "one-to-many",
            Self::ManyToMany => "many-to-many",
        })
    }
}

/// Join table of a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTable {
    /// Table name.
    pub table: String,
    /// Column matching the source key.
    pub source_key: String,
    /// Column matching the target key.
    pub target_key: String,
}

/// Resolved relation metadata.
///
/// For every kind, a source row relates to the target rows whose
/// `target_key` equals the source row's `source_key` (through the join
/// table for many-to-many).
#[derive(Debug, Clone)]
pub struct RelationDescriptor {
    /// Relation name.
    pub name: String,
    /// Unified kind.
    pub kind: RelationKind,
    /// Table of the model that declares the relation.
    pub source_table: String,
    /// Key column on the source rows.
    pub source_key: String,
    /// Target model.
    pub target: Arc<ModelDef>,
    /// Key column on the target rows.
    pub target_key: String,
    /// Join table, for many-to-many.
    pub join: Option<JoinTable>,
}

/// A model: its table, keys and relations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDef {
    name: String,
    table: String,
    id_attribute: String,
    soft_delete: Option<String>,
    timestamps: Option<(String, String)>,
    case_sensitive: Option<bool>,
    relations: IndexMap<String, RelationDef>,
}

impl ModelDef {
    /// A model named `name` stored in `table`, keyed by `id`.
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            id_attribute: "id".to_string(),
            soft_delete: None,
            timestamps: None,
            case_sensitive: None,
            relations: IndexMap::new(),
        }
    }

    /// Use a custom primary key column.
    pub fn id_attribute(mut self, column: impl Into<String>) -> Self {
        self.id_attribute = column.into();
        self
    }

    /// Hide rows whose `column` is set.
    pub fn soft_delete(mut self, column: impl Into<String>) -> Self {
        self.soft_delete = Some(column.into());
        self
    }

    /// Stamp `created`/`updated` columns on insert.
    pub fn timestamps(mut self, created: impl Into<String>, updated: impl Into<String>) -> Self {
        self.timestamps = Some((created.into(), updated.into()));
        self
    }

    /// Override the dialect's string case sensitivity for row matching.
    pub fn case_sensitive(mut self, sensitive: bool) -> Self {
        self.case_sensitive = Some(sensitive);
        self
    }

    /// Register a relation.
    pub fn relation(mut self, name: impl Into<String>, relation: RelationDef) -> Self {
        self.relations.insert(name.into(), relation);
        self
    }

    /// Foreign key on this model pointing at `target`'s id.
    pub fn belongs_to(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.relation(
            name,
            RelationDef::BelongsTo {
                target: target.into(),
                foreign_key: foreign_key.into(),
                target_key: None,
            },
        )
    }

    /// Foreign key on `target` pointing at this model's id; one row.
    pub fn has_one(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.relation(
            name,
            RelationDef::HasOne {
                target: target.into(),
                foreign_key: foreign_key.into(),
                source_key: None,
            },
        )
    }

    /// Foreign key on `target` pointing at this model's id.
    pub fn has_many(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.relation(
            name,
            RelationDef::HasMany {
                target: target.into(),
                foreign_key: foreign_key.into(),
                source_key: None,
            },
        )
    }

    /// Many-to-many through `join_table`.
    pub fn belongs_to_many(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        join_table: impl Into<String>,
        join_source_key: impl Into<String>,
        join_target_key: impl Into<String>,
    ) -> Self {
        self.relation(
            name,
            RelationDef::BelongsToMany {
                target: target.into(),
                join_table: join_table.into(),
                join_source_key: join_source_key.into(),
                join_target_key: join_target_key.into(),
                source_key: None,
                target_key: None,
            },
        )
    }

    /// Model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Primary key column.
    pub fn id(&self) -> &str {
        &self.id_attribute
    }

    /// Soft-delete column, if any.
    pub fn soft_delete_column(&self) -> Option<&str> {
        self.soft_delete.as_deref()
    }

    /// Timestamp columns, if any.
    pub fn timestamp_columns(&self) -> Option<(&str, &str)> {
        self.timestamps
            .as_ref()
            .map(|(created, updated)| (created.as_str(), updated.as_str()))
    }

    /// Case sensitivity override.
    pub fn is_case_sensitive(&self) -> Option<bool> {
        self.case_sensitive
    }

    /// Declared relation by name.
    pub fn relation_def(&self, name: &str) -> Option<&RelationDef> {
        self.relations.get(name)
    }

    /// Names of all declared relations.
    pub fn relation_names(&self) -> impl Iterator<Item = &str> {
        self.relations.keys().map(String::as_str)
    }
}

/// The set of models known to a client.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    models: HashMap<String, Arc<ModelDef>>,
}

impl Schema {
    /// An empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model.
    pub fn model(mut self, model: ModelDef) -> Self {
        self.models.insert(model.name.clone(), Arc::new(model));
        self
    }

    /// Model by name.
    pub fn get(&self, name: &str) -> QueryResult<Arc<ModelDef>> {
        self.models.get(name).cloned().ok_or_else(|| {
            QueryError::invalid_configuration(format!("Model '{}' is not registered", name))
                .with_model(name)
                .with_suggestion("Register the model with Schema::model before querying it")
        })
    }

    /// Resolve `relation` on `model` into a descriptor.
    pub fn resolve(&self, model: &ModelDef, relation: &str) -> QueryResult<RelationDescriptor> {
        let def = model
            .relation_def(relation)
            .ok_or_else(|| QueryError::relation_not_found(relation, model.table()))?;

        let descriptor = match def {
            RelationDef::BelongsTo {
                target,
                foreign_key,
                target_key,
            } => {
                let target = self.get(target)?;
                RelationDescriptor {
                    name: relation.to_string(),
                    kind: RelationKind::OneToOne,
                    source_table: model.table.clone(),
                    source_key: foreign_key.clone(),
                    target_key: target_key.clone().unwrap_or_else(|| target.id().to_string()),
                    target,
                    join: None,
                }
            }
            RelationDef::HasOne {
                target,
                foreign_key,
                source_key,
            }
            | RelationDef::HasMany {
                target,
                foreign_key,
                source_key,
            } => RelationDescriptor {
                name: relation.to_string(),
                kind: if matches!(def, RelationDef::HasOne { .. }) {
                    RelationKind::OneToOne
                } else {
                    RelationKind::OneToMany
                },
                source_table: model.table.clone(),
                source_key: source_key.clone().unwrap_or_else(|| model.id().to_string()),
                target: self.get(target)?,
                target_key: foreign_key.clone(),
                join: None,
            },
            RelationDef::BelongsToMany {
                target,
                join_table,
                join_source_key,
                join_target_key,
                source_key,
                target_key,
            } => {
                let target = self.get(target)?;
                RelationDescriptor {
                    name: relation.to_string(),
                    kind: RelationKind::ManyToMany,
                    source_table: model.table.clone(),
                    source_key: source_key.clone().unwrap_or_else(|| model.id().to_string()),
                    target_key: target_key.clone().unwrap_or_else(|| target.id().to_string()),
                    target,
                    join: Some(JoinTable {
                        table: join_table.clone(),
                        source_key: join_source_key.clone(),
                        target_key: join_target_key.clone(),
                    }),
                }
            }
            other => {
                return Err(QueryError::unsupported_relation(relation, other.kind_name())
                    .with_model(model.table()));
            }
        };
        Ok(descriptor)
    }

    /// Resolve every segment of a path, starting at `model`.
    pub fn resolve_chain<'a>(
        &self,
        model: &Arc<ModelDef>,
        segments: impl IntoIterator<Item = &'a str>,
    ) -> QueryResult<Vec<RelationDescriptor>> {
        let mut current = Arc::clone(model);
        let mut chain = Vec::new();
        for segment in segments {
            let descriptor = self.resolve(&current, segment)?;
            current = Arc::clone(&descriptor.target);
            chain.push(descriptor);
        }
        Ok(chain)
    }
}
