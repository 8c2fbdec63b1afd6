//! The client: an engine, a schema and a configuration.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::bulk::BulkWriter;
use crate::config::EloquentConfig;
use crate::eager;
use crate::engine::QueryEngine;
use crate::error::{QueryError, QueryResult};
use crate::model::Schema;
use crate::path::IntoRelations;
use crate::query::{Context, Query};
use crate::record::{Collection, Record};

/// Entry point for queries, eager loading and bulk writes.
#[derive(Clone)]
pub struct Eloquent {
    ctx: Context,
}

impl Eloquent {
    /// A client with the default configuration for the engine's dialect.
    pub fn new<E: QueryEngine + 'static>(engine: E, schema: Schema) -> Self {
        let config = EloquentConfig::new(engine.dialect());
        Self::from_parts(Arc::new(engine), schema, config)
    }

    /// A client with an explicit configuration.
    ///
    /// The configured dialect must match the engine's.
    pub fn with_config<E: QueryEngine + 'static>(
        engine: E,
        schema: Schema,
        config: EloquentConfig,
    ) -> QueryResult<Self> {
        config.validate()?;
        if config.dialect != engine.dialect() {
            return Err(QueryError::invalid_configuration(format!(
                "Configured dialect {:?} does not match the engine's {:?}",
                config.dialect,
                engine.dialect()
            )));
        }
        Ok(Self::from_parts(Arc::new(engine), schema, config))
    }

    fn from_parts(engine: Arc<dyn QueryEngine>, schema: Schema, config: EloquentConfig) -> Self {
        info!(dialect = ?config.dialect, "eloquent client ready");
        Self {
            ctx: Context {
                engine,
                schema: Arc::new(schema),
                config: Arc::new(config),
            },
        }
    }

    /// The registered models.
    pub fn schema(&self) -> &Schema {
        &self.ctx.schema
    }

    /// The active configuration.
    pub fn config(&self) -> &EloquentConfig {
        &self.ctx.config
    }

    /// The engine statements run on.
    pub fn engine(&self) -> &Arc<dyn QueryEngine> {
        &self.ctx.engine
    }

    /// Start a query against a model.
    pub fn query(&self, model: &str) -> QueryResult<Query> {
        let model = self.ctx.schema.get(model)?;
        Ok(Query::new(self.ctx.clone(), model))
    }

    /// Bulk writer for a model.
    pub fn bulk(&self, model: &str) -> QueryResult<BulkWriter> {
        let model = self.ctx.schema.get(model)?;
        Ok(BulkWriter::new(self.ctx.clone(), model))
    }

    /// An empty collection keyed by the model's id.
    pub fn collection(&self, model: &str) -> QueryResult<Collection> {
        let model = self.ctx.schema.get(model)?;
        Ok(Collection::new(model.id()))
    }

    /// Eager-load relations onto records that are already in memory.
    pub async fn load(
        &self,
        model: &str,
        records: &mut [Record],
        relations: impl IntoRelations,
    ) -> QueryResult<()> {
        let mut query = self.query(model)?;
        query.with(relations)?;
        eager::load(records, query.take_eager()).await
    }

    /// Delete every row of a model, soft-deleting where the model does.
    pub async fn delete_all(&self, model: &str) -> QueryResult<u64> {
        self.query(model)?.delete().await
    }
}

impl fmt::Debug for Eloquent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Eloquent")
            .field("dialect", &self.ctx.config.dialect)
            .field("engine", &self.ctx.engine.dialect())
            .finish()
    }
}
