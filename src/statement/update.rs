use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Map;

use super::select::{scan, unknown_table};
use super::{returning, Projection, QueryResult};
use crate::context::QueryContext;
use crate::error::{EngineResult, QueryValidationError};
use crate::expr::{lowercase, Expression};
use crate::record::is_system_column;
use crate::schema::{TypeDef, TypeField};

/// One `SET column = expr` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    #[serde(deserialize_with = "lowercase")]
    pub column: String,
    pub value: Expression,
}

/// `UPDATE <table> SET ... [WHERE ...] [RETURNING ...]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    #[serde(deserialize_with = "lowercase")]
    pub table: String,
    pub set: Vec<Assignment>,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<Expression>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub returning: Vec<Projection>,
}

impl Update {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_lowercase(),
            set: Vec::new(),
            filter: None,
            returning: Vec::new(),
        }
    }

    pub fn set(mut self, column: &str, value: Expression) -> Self {
        self.set.push(Assignment {
            column: column.to_lowercase(),
            value,
        });
        self
    }

    pub fn filter(mut self, predicate: Expression) -> Self {
        self.filter = Some(predicate);
        self
    }

    pub fn returning(mut self, projection: Projection) -> Self {
        self.returning.push(projection);
        self
    }

    pub async fn execute(&self, ctx: &mut QueryContext) -> EngineResult<QueryResult> {
        let types = Arc::clone(&ctx.types);
        let def = match types.get(&self.table) {
            Some(def) => def,
            None => {
                ctx.report(unknown_table(&self.table, &types, "update"));
                tracing::warn!(table = %self.table, "Update rejected: unknown table");
                return Ok(QueryResult::rejected());
            }
        };
        tracing::debug!(table = %def.name, assignments = self.set.len(), "Executing update");

        let targets = self.resolve_targets(def, ctx);
        let store = Arc::clone(ctx.store());
        let stage = ctx.stage();
        let candidates = scan(ctx, &def.name, "update.where").await?;

        let mut updated = Vec::new();
        for record in &candidates {
            if let Some(filter) = &self.filter {
                let mark = ctx.error_count();
                let matches = filter.eval_predicate(Some(record), ctx, None);
                ctx.scope_errors(mark, "update.where");
                if !matches {
                    continue;
                }
            }

            let mut changes = Map::new();
            for (field, expr) in &targets {
                let path = format!("update.set.{}", field.name);
                let mark = ctx.error_count();
                let value = expr.eval(Some(record), ctx, None);
                ctx.scope_errors(mark, &path);

                match value.is_assignable_to(field, ctx).await {
                    Ok(()) => {
                        changes.insert(field.name.clone(), value.into_raw());
                    }
                    Err(error) => ctx.report_once(error.at(path)),
                }
            }
            if changes.is_empty() {
                continue;
            }

            let record = store.add_update(stage, &def.name, &record.id, changes).await?;
            tracing::trace!(table = %def.name, id = %record.id, "Updated row");
            updated.push(record);
        }

        let rows = returning(&self.returning, &updated, ctx, "update.returning");
        let result = QueryResult::finish(rows, ctx);

        if result.can_commit {
            tracing::debug!(table = %def.name, updated = updated.len(), "Update finished");
        } else {
            tracing::warn!(
                table = %def.name,
                updated = updated.len(),
                errors = ctx.error_count(),
                "Update finished with validation errors"
            );
        }
        Ok(result)
    }

    /// Check SET column names once. Unknown or read-only columns are reported and left
    /// out; the remaining assignments still apply.
    fn resolve_targets<'a>(
        &'a self,
        def: &'a TypeDef,
        ctx: &mut QueryContext,
    ) -> Vec<(&'a TypeField, &'a Expression)> {
        let mut targets = Vec::with_capacity(self.set.len());
        for assignment in &self.set {
            let path = format!("update.set.{}", assignment.column);
            if is_system_column(&assignment.column) {
                ctx.report(QueryValidationError::new(
                    path,
                    format!("System column '{}' cannot be assigned", assignment.column),
                ));
                continue;
            }
            match def.field(&assignment.column) {
                Some(field) => targets.push((field, &assignment.value)),
                None => ctx.report(
                    QueryValidationError::new(
                        path,
                        format!(
                            "Column '{}' does not exist in '{}'",
                            assignment.column, def.name
                        ),
                    )
                    .with_suggestion(format!("Available columns: {}", def.available_columns())),
                ),
            }
        }
        targets
    }
}
