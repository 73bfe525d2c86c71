//! Statements: SELECT, INSERT and UPDATE over the expression tree.
//!
//! A statement never fails on bad input. Problems are accumulated in the context and
//! `QueryResult::can_commit` tells the caller whether staged writes may be kept. `Err`
//! is reserved for store failures.

mod insert;
mod select;
mod update;

pub use insert::{Insert, InsertSource};
pub use select::{Join, JoinKind, OrderBy, Select, SourceRef};
pub use update::{Assignment, Update};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::context::QueryContext;
use crate::error::EngineResult;
use crate::expr::Expression;
use crate::record::DataRecord;

/// Outcome of one statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub rows: Vec<Json>,
    /// False as soon as any validation error was reported during the statement
    pub can_commit: bool,
}

impl QueryResult {
    /// Empty result for a statement aborted on a schema error.
    pub fn rejected() -> Self {
        Self {
            rows: Vec::new(),
            can_commit: false,
        }
    }

    fn finish(rows: Vec<Json>, ctx: &QueryContext) -> Self {
        Self {
            rows,
            can_commit: !ctx.has_errors(),
        }
    }
}

/// One output column of a SELECT or RETURNING list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub expr: Expression,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl Projection {
    pub fn new(expr: Expression) -> Self {
        Self { expr, alias: None }
    }

    pub fn named(expr: Expression, alias: &str) -> Self {
        Self {
            expr,
            alias: Some(alias.to_string()),
        }
    }

    /// Output key: the alias, the column name, the function name, or the rendered
    /// expression, in that order.
    pub fn name(&self) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        match &self.expr {
            Expression::SourceColumn { column, .. } => column.clone(),
            Expression::FunctionCall { func, .. } => func.clone(),
            other => other.to_string(),
        }
    }

    fn is_wildcard(&self) -> bool {
        self.alias.is_none()
            && matches!(&self.expr, Expression::SourceColumn { column, .. } if column == "*")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Statement {
    Select(Select),
    Insert(Insert),
    Update(Update),
}

impl Statement {
    pub async fn execute(&self, ctx: &mut QueryContext) -> EngineResult<QueryResult> {
        match self {
            Statement::Select(select) => select.execute(ctx).await,
            Statement::Insert(insert) => insert.execute(ctx).await,
            Statement::Update(update) => update.execute(ctx).await,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Statement::Select(_) => "select",
            Statement::Insert(_) => "insert",
            Statement::Update(_) => "update",
        }
    }

    /// Type the statement reads from or writes to.
    pub fn table(&self) -> &str {
        match self {
            Statement::Select(select) => &select.from.table,
            Statement::Insert(insert) => &insert.table,
            Statement::Update(update) => &update.table,
        }
    }
}

impl From<Select> for Statement {
    fn from(select: Select) -> Self {
        Statement::Select(select)
    }
}

impl From<Insert> for Statement {
    fn from(insert: Insert) -> Self {
        Statement::Insert(insert)
    }
}

impl From<Update> for Statement {
    fn from(update: Update) -> Self {
        Statement::Update(update)
    }
}

/// Output columns of one row, in projection order. Names may repeat.
pub(crate) type Entries = Vec<(String, Json)>;

/// Evaluate a projection list into ordered output columns.
///
/// An unaliased `source.*` spreads the flattened row into one column per field.
pub(crate) fn project_entries(
    projections: &[Projection],
    record: Option<&DataRecord>,
    ctx: &mut QueryContext,
    group: Option<&[DataRecord]>,
    prefix: &str,
) -> Entries {
    let mut entries = Vec::with_capacity(projections.len());
    for (index, projection) in projections.iter().enumerate() {
        let mark = ctx.error_count();
        let value = projection.expr.eval(record, ctx, group).into_raw();
        ctx.scope_errors(mark, &format!("{}[{}]", prefix, index));

        match value {
            Json::Object(fields) if projection.is_wildcard() => entries.extend(fields),
            value => entries.push((projection.name(), value)),
        }
    }
    entries
}

/// Build a result object; a repeated name keeps its last value.
pub(crate) fn to_object(entries: Entries) -> Json {
    Json::Object(entries.into_iter().collect::<Map<String, Json>>())
}

/// Evaluate a projection list into one output row.
pub(crate) fn project(
    projections: &[Projection],
    record: Option<&DataRecord>,
    ctx: &mut QueryContext,
    group: Option<&[DataRecord]>,
    prefix: &str,
) -> Json {
    to_object(project_entries(projections, record, ctx, group, prefix))
}

/// `RETURNING` rows for written records, or nothing when no list was given.
pub(crate) fn returning(
    projections: &[Projection],
    records: &[DataRecord],
    ctx: &mut QueryContext,
    prefix: &str,
) -> Vec<Json> {
    if projections.is_empty() {
        return Vec::new();
    }
    records
        .iter()
        .map(|record| project(projections, Some(record), ctx, None, prefix))
        .collect()
}
