//! Engine facade: one fresh context per statement, then commit or roll back.

use std::sync::Arc;

use serde::Serialize;

use crate::config::EngineConfig;
use crate::context::{QueryContext, QueryLimits};
use crate::error::{EngineResult, QueryValidationError};
use crate::schema::Schema;
use crate::state::TableStore;
use crate::statement::{QueryResult, Statement};

/// Result of `Engine::execute`: the statement result plus every validation error.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOutcome {
    pub result: QueryResult,
    pub errors: Vec<QueryValidationError>,
    /// Staged writes made durable (0 after a rollback)
    pub committed: usize,
}

impl QueryOutcome {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Shares one schema and store across statements.
///
/// Every statement writes into its own stage on the store, so concurrent statements
/// commit or roll back only their own writes.
pub struct Engine {
    schema: Arc<Schema>,
    store: Arc<dyn TableStore>,
    limits: QueryLimits,
}

impl Engine {
    pub fn new(schema: Schema, store: Arc<dyn TableStore>) -> Self {
        Self {
            schema: Arc::new(schema),
            store,
            limits: QueryLimits::default(),
        }
    }

    /// Build from a loaded configuration. Fails when the schema cannot be read or does
    /// not pass lint.
    pub fn from_config(config: &EngineConfig, store: Arc<dyn TableStore>) -> EngineResult<Self> {
        let schema = config.schema()?;
        schema.validate()?;
        tracing::info!(types = schema.len(), "Engine initialized");
        Ok(Self::new(schema, store).with_limits(config.limits.clone()))
    }

    pub fn with_limits(mut self, limits: QueryLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn store(&self) -> &Arc<dyn TableStore> {
        &self.store
    }

    /// Fresh per-statement context.
    pub fn context(&self) -> QueryContext {
        QueryContext::new(Arc::clone(&self.schema), Arc::clone(&self.store))
            .with_limits(self.limits.clone())
    }

    /// Execute one statement. Staged writes are committed when the statement reports
    /// no validation errors and rolled back otherwise.
    pub async fn execute(&self, statement: &Statement) -> EngineResult<QueryOutcome> {
        let mut ctx = self.context();
        let stage = ctx.stage();

        let result = match statement.execute(&mut ctx).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(kind = statement.kind(), table = statement.table(), "Statement failed: {}", e);
                if let Err(rollback_err) = self.store.rollback(stage).await {
                    tracing::error!("Rollback failed: {}", rollback_err);
                }
                return Err(e);
            }
        };

        let committed = if result.can_commit {
            let applied = self.store.commit(stage).await?;
            if applied > 0 {
                tracing::info!(
                    kind = statement.kind(),
                    table = statement.table(),
                    %stage,
                    writes = applied,
                    "Committed"
                );
            }
            applied
        } else {
            let dropped = self.store.rollback(stage).await?;
            tracing::info!(
                kind = statement.kind(),
                table = statement.table(),
                %stage,
                writes = dropped,
                errors = ctx.error_count(),
                "Rolled back"
            );
            0
        };

        Ok(QueryOutcome {
            result,
            errors: ctx.take_errors(),
            committed,
        })
    }

    /// Execute a statement handed over as JSON.
    pub async fn execute_json(&self, statement: &str) -> EngineResult<QueryOutcome> {
        let statement: Statement = serde_json::from_str(statement)?;
        self.execute(&statement).await
    }
}
