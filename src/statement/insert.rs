use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use super::select::{unknown_table, Select};
use super::{returning, Projection, QueryResult};
use crate::context::QueryContext;
use crate::error::{EngineResult, QueryValidationError};
use crate::expr::{lowercase, Expression};
use crate::record::{is_system_column, DataRecord};
use crate::schema::TypeDef;
use crate::value::Value;

/// Where inserted rows come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertSource {
    /// Literal rows, one expression per declared column
    Values(Vec<Vec<Expression>>),
    /// Result rows of a query, mapped onto the declared columns by position
    Select(Box<Select>),
}

/// `INSERT INTO <table> (<columns>) VALUES ... | SELECT ... [RETURNING ...]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insert {
    #[serde(deserialize_with = "lowercase")]
    pub table: String,
    pub columns: Vec<String>,
    pub source: InsertSource,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub returning: Vec<Projection>,
}

impl Insert {
    pub fn values(table: &str, columns: &[&str], rows: Vec<Vec<Expression>>) -> Self {
        Self {
            table: table.to_lowercase(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            source: InsertSource::Values(rows),
            returning: Vec::new(),
        }
    }

    pub fn from_select(table: &str, columns: &[&str], select: Select) -> Self {
        Self {
            table: table.to_lowercase(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            source: InsertSource::Select(Box::new(select)),
            returning: Vec::new(),
        }
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
                ctx.report(unknown_table(&self.table, &types, "insert"));
                tracing::warn!(table = %self.table, "Insert rejected: unknown table");
                return Ok(QueryResult::rejected());
            }
        };

        let value_sets = self.value_sets(ctx).await?;
        tracing::debug!(table = %def.name, rows = value_sets.len(), "Executing insert");

        let store = Arc::clone(ctx.store());
        let stage = ctx.stage();
        let mut inserted = Vec::with_capacity(value_sets.len());
        for (index, values) in value_sets.into_iter().enumerate() {
            let row_path = format!("insert.values[{}]", index);
            let values = match values {
                Some(values) => values,
                None => continue,
            };

            let fields = self.stage_row(def, values, &row_path, ctx).await;
            let id = DataRecord::generate_id();
            let record = store.add_insert(stage, &def.name, &id, fields).await?;
            tracing::trace!(table = %def.name, id = %record.id, "Inserted row");
            inserted.push(record);
        }

        let rows = returning(&self.returning, &inserted, ctx, "insert.returning");
        let result = QueryResult::finish(rows, ctx);

        if result.can_commit {
            tracing::debug!(table = %def.name, inserted = inserted.len(), "Insert finished");
        } else {
            tracing::warn!(
                table = %def.name,
                inserted = inserted.len(),
                errors = ctx.error_count(),
                "Insert finished with validation errors"
            );
        }
        Ok(result)
    }

    /// Evaluate the row source. A `None` entry is a row whose shape did not match the
    /// column list; it has been reported and is skipped.
    async fn value_sets(&self, ctx: &mut QueryContext) -> EngineResult<Vec<Option<Vec<Value>>>> {
        let expected = self.columns.len();
        match &self.source {
            InsertSource::Values(rows) => {
                let mut sets = Vec::with_capacity(rows.len());
                for (index, row) in rows.iter().enumerate() {
                    let row_path = format!("insert.values[{}]", index);
                    if row.len() != expected {
                        ctx.report(arity_error(&row_path, expected, row.len()));
                        sets.push(None);
                        continue;
                    }
                    let mark = ctx.error_count();
                    let values: Vec<Value> = row.iter().map(|expr| expr.eval(None, ctx, None)).collect();
                    ctx.scope_errors(mark, &row_path);
                    sets.push(Some(values));
                }
                Ok(sets)
            }

            InsertSource::Select(select) => {
                let mark = ctx.error_count();
                let rows = select.execute_entries(ctx).await?.unwrap_or_default();
                ctx.scope_errors(mark, "insert");

                let sets = rows
                    .into_iter()
                    .enumerate()
                    .map(|(index, row)| {
                        let values: Vec<Value> =
                            row.into_iter().map(|(_, v)| Value::new(v)).collect();
                        if values.len() != expected {
                            ctx.report(arity_error(
                                &format!("insert.values[{}]", index),
                                expected,
                                values.len(),
                            ));
                            return None;
                        }
                        Some(values)
                    })
                    .collect();
                Ok(sets)
            }
        }
    }

    /// Validate one row column by column. Failing columns are reported and left out;
    /// the rest are returned for staging.
    async fn stage_row(
        &self,
        def: &TypeDef,
        values: Vec<Value>,
        row_path: &str,
        ctx: &mut QueryContext,
    ) -> Map<String, Json> {
        let mut fields = Map::new();
        let mut declared = HashSet::new();

        for (column, value) in self.columns.iter().zip(values) {
            let column = column.to_lowercase();
            let path = format!("{}.{}", row_path, column);
            declared.insert(column.clone());

            if is_system_column(&column) {
                ctx.report(QueryValidationError::new(
                    path,
                    format!("System column '{}' cannot be assigned", column),
                ));
                continue;
            }
            let field = match def.field(&column) {
                Some(field) => field,
                None => {
                    ctx.report(
                        QueryValidationError::new(
                            path,
                            format!("Column '{}' does not exist in '{}'", column, def.name),
                        )
                        .with_suggestion(format!("Available columns: {}", def.available_columns())),
                    );
                    continue;
                }
            };

            match value.is_assignable_to(field, ctx).await {
                Ok(()) => {
                    fields.insert(field.name.clone(), value.into_raw());
                }
                Err(error) => ctx.report(error.at(path)),
            }
        }

        for field in def.fields.iter().filter(|f| !f.nullable) {
            if !declared.contains(&field.name) {
                ctx.report(
                    QueryValidationError::new(
                        format!("{}.{}", row_path, field.name),
                        format!("Field '{}' is required and cannot be null", field.name),
                    )
                    .with_types(field.field_type.as_str(), "null"),
                );
            }
        }

        fields
    }
}

fn arity_error(path: &str, expected: usize, actual: usize) -> QueryValidationError {
    QueryValidationError::new(
        path,
        format!("Expected {} values to match the column list, got {}", expected, actual),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, Schema, TypeField};
    use crate::state::{MemoryStore, TableStore};
    use serde_json::json;

    fn fixture() -> (QueryContext, Arc<MemoryStore>) {
        let schema = Schema::from_types(vec![
            TypeDef::new(
                "users",
                vec![
                    TypeField::new("name", FieldType::String).required(),
                    TypeField::new("age", FieldType::Number),
                    TypeField::enumeration("status", &["active", "disabled"]),
                    TypeField::reference("team", "teams"),
                ],
            ),
            TypeDef::new("teams", vec![TypeField::new("title", FieldType::String)]),
        ]);
        let store = Arc::new(MemoryStore::new());
        store.seed("teams", "t1", json!({"title": "Core"}));
        let ctx = QueryContext::new(Arc::new(schema), store.clone());
        (ctx, store)
    }

    fn lit(value: Json) -> Expression {
        Expression::literal(value)
    }

    #[tokio::test]
    async fn test_insert_values_and_returning() {
        let (mut ctx, store) = fixture();
        let insert = Insert::values(
            "users",
            &["name", "age", "team"],
            vec![
                vec![lit(json!("Alice")), lit(json!(30)), lit(json!("t1"))],
                vec![lit(json!("Bob")), Expression::null(), Expression::null()],
            ],
        )
        .returning(Projection::new(Expression::column("users", "id")))
        .returning(Projection::new(Expression::column("users", "name")));

        let result = insert.execute(&mut ctx).await.unwrap();
        assert!(result.can_commit);
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[1]["name"], json!("Bob"));

        let id = result.rows[0]["id"].as_str().unwrap();
        let stored = store.get(Some(ctx.stage()), "users", id).await.unwrap().unwrap();
        assert_eq!(stored.fields, json!({"name": "Alice", "age": 30, "team": "t1"}).as_object().cloned().unwrap());
    }

    #[tokio::test]
    async fn test_without_returning_rows_are_empty() {
        let (mut ctx, store) = fixture();
        let insert = Insert::values("users", &["name"], vec![vec![lit(json!("Carol"))]]);
        let result = insert.execute(&mut ctx).await.unwrap();
        assert!(result.can_commit);
        assert!(result.rows.is_empty());
        assert_eq!(store.scan(Some(ctx.stage()), "users", None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_type_mismatch_drops_only_that_column() {
        let (mut ctx, store) = fixture();
        let insert = Insert::values(
            "users",
            &["name", "age"],
            vec![vec![lit(json!("Alice")), lit(json!("thirty"))]],
        );
        let result = insert.execute(&mut ctx).await.unwrap();

        assert!(!result.can_commit);
        let errors = ctx.validation_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "insert.values[0].age");
        assert_eq!(errors[0].expected_type.as_deref(), Some("number"));
        assert_eq!(errors[0].actual_type.as_deref(), Some("string"));

        let staged = store.scan(Some(ctx.stage()), "users", None).await.unwrap();
        assert_eq!(staged.len(), 1);
        assert!(!staged[0].fields.contains_key("age"));
        assert_eq!(staged[0].fields["name"], json!("Alice"));
    }

    #[tokio::test]
    async fn test_schema_errors_per_column() {
        let (mut ctx, _store) = fixture();
        let insert = Insert::values(
            "users",
            &["id", "nickname", "status", "team"],
            vec![vec![
                lit(json!("x")),
                lit(json!("Al")),
                lit(json!("deleted")),
                lit(json!("t9")),
            ]],
        );
        let result = insert.execute(&mut ctx).await.unwrap();
        assert!(!result.can_commit);

        let paths: Vec<&str> = ctx.validation_errors().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "insert.values[0].id",
                "insert.values[0].nickname",
                "insert.values[0].status",
                "insert.values[0].team",
                "insert.values[0].name",
            ]
        );
        let errors = ctx.validation_errors();
        assert_eq!(
            errors[1].suggestion.as_deref(),
            Some("Available columns: name, age, status, team")
        );
        assert_eq!(
            errors[2].suggestion.as_deref(),
            Some("Allowed values: active, disabled")
        );
        assert!(errors[3].message.contains("not found"));
        assert!(errors[4].message.contains("required"));
    }

    #[tokio::test]
    async fn test_unknown_table_is_fatal() {
        let (mut ctx, store) = fixture();
        let insert = Insert::values("ghosts", &["x"], vec![vec![lit(json!(1))]]);
        let result = insert.execute(&mut ctx).await.unwrap();
        assert_eq!(result, QueryResult::rejected());
        assert_eq!(ctx.validation_errors()[0].path, "insert");
        assert!(!store.has_pending());
    }

    #[tokio::test]
    async fn test_row_arity_mismatch_skips_row() {
        let (mut ctx, store) = fixture();
        let insert = Insert::values(
            "users",
            &["name", "age"],
            vec![
                vec![lit(json!("Alice"))],
                vec![lit(json!("Bob")), lit(json!(40))],
            ],
        );
        let result = insert.execute(&mut ctx).await.unwrap();
        assert!(!result.can_commit);
        assert_eq!(ctx.validation_errors()[0].path, "insert.values[0]");
        assert_eq!(store.scan(Some(ctx.stage()), "users", None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insert_from_select_maps_by_position() {
        let (mut ctx, store) = fixture();
        let select = Select::new("teams")
            .project(Expression::column("teams", "title"))
            .project(Expression::literal(json!(1)));
        let insert = Insert::from_select("users", &["name", "age"], select);

        let result = insert.execute(&mut ctx).await.unwrap();
        assert!(result.can_commit);
        let staged = store.scan(Some(ctx.stage()), "users", None).await.unwrap();
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].fields["name"], json!("Core"));
        assert_eq!(staged[0].fields["age"], json!(1));
    }
}
