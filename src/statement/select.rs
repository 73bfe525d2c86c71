use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use super::{project_entries, to_object, Entries, Projection, QueryResult};
use crate::context::QueryContext;
use crate::error::{EngineResult, QueryValidationError};
use crate::expr::{lowercase, Expression};
use crate::record::DataRecord;
use crate::schema::Schema;
use crate::value::{TypeKind, Value};

/// A table in FROM or JOIN position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    #[serde(deserialize_with = "lowercase")]
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl SourceRef {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_lowercase(),
            alias: None,
        }
    }

    pub fn aliased(table: &str, alias: &str) -> Self {
        Self {
            table: table.to_lowercase(),
            alias: Some(alias.to_string()),
        }
    }

    /// Name column references use for this source.
    pub fn name(&self) -> String {
        self.alias.as_deref().unwrap_or(&self.table).to_lowercase()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    pub kind: JoinKind,
    pub source: SourceRef,
    pub on: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub expr: Expression,
    #[serde(default)]
    pub descending: bool,
}

/// `SELECT <projections> FROM <source> [JOIN ...] [WHERE] [GROUP BY] [ORDER BY] [LIMIT/OFFSET]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Select {
    pub projections: Vec<Projection>,
    pub from: SourceRef,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub joins: Vec<Join>,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<Expression>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<Expression>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<OrderBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

type OutputRow = (Vec<Value>, Entries);

impl Select {
    pub fn new(table: &str) -> Self {
        Self {
            projections: Vec::new(),
            from: SourceRef::new(table),
            joins: Vec::new(),
            filter: None,
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.from.alias = Some(alias.to_string());
        self
    }

    pub fn project(mut self, expr: Expression) -> Self {
        self.projections.push(Projection::new(expr));
        self
    }

    pub fn project_as(mut self, expr: Expression, alias: &str) -> Self {
        self.projections.push(Projection::named(expr, alias));
        self
    }

    pub fn join(mut self, kind: JoinKind, source: SourceRef, on: Expression) -> Self {
        self.joins.push(Join { kind, source, on });
        self
    }

    pub fn filter(mut self, predicate: Expression) -> Self {
        self.filter = Some(predicate);
        self
    }

    pub fn group_by(mut self, expr: Expression) -> Self {
        self.group_by.push(expr);
        self
    }

    pub fn order_by(mut self, expr: Expression, descending: bool) -> Self {
        self.order_by.push(OrderBy { expr, descending });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Every type name the statement reads.
    pub fn sources(&self) -> Vec<&str> {
        std::iter::once(self.from.table.as_str())
            .chain(self.joins.iter().map(|j| j.source.table.as_str()))
            .collect()
    }

    /// Aggregated when grouped explicitly or when any projection aggregates; the latter
    /// treats the whole filtered set as one group.
    pub fn is_aggregated(&self) -> bool {
        !self.group_by.is_empty() || self.projections.iter().any(|p| p.expr.contains_aggregate())
    }

    pub async fn execute(&self, ctx: &mut QueryContext) -> EngineResult<QueryResult> {
        let result = match self.execute_entries(ctx).await? {
            Some(rows) => QueryResult::finish(rows.into_iter().map(to_object).collect(), ctx),
            None => QueryResult::rejected(),
        };
        tracing::debug!(
            table = %self.from.table,
            rows = result.rows.len(),
            can_commit = result.can_commit,
            "Select finished"
        );
        Ok(result)
    }

    /// Result rows as ordered output columns, for callers that consume values by
    /// position. `None` when a source type does not exist.
    pub(crate) async fn execute_entries(
        &self,
        ctx: &mut QueryContext,
    ) -> EngineResult<Option<Vec<Entries>>> {
        tracing::debug!(table = %self.from.table, joins = self.joins.len(), "Executing select");

        // Aliases belong to this statement only
        let outer_aliases = std::mem::take(&mut ctx.aliases);
        let result = self.run(ctx).await;
        ctx.aliases = outer_aliases;
        result
    }

    async fn run(&self, ctx: &mut QueryContext) -> EngineResult<Option<Vec<Entries>>> {
        let rows = match self.load_rows(ctx).await? {
            Some(rows) => rows,
            None => return Ok(None),
        };
        let rows = self.apply_filter(rows, ctx);

        let mut output = if self.is_aggregated() {
            self.project_groups(rows, ctx)
        } else {
            self.project_rows(&rows, ctx)
        };
        self.apply_sort(&mut output);

        let rows = output
            .into_iter()
            .map(|(_, row)| row)
            .skip(self.offset.unwrap_or(0))
            .take(self.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(Some(rows))
    }

    /// Scan FROM and apply joins. `None` when a source type does not exist.
    async fn load_rows(&self, ctx: &mut QueryContext) -> EngineResult<Option<Vec<DataRecord>>> {
        let types = Arc::clone(&ctx.types);

        let base = match types.get(&self.from.table) {
            Some(def) => def,
            None => {
                ctx.report(unknown_table(&self.from.table, &types, "select.from"));
                return Ok(None);
            }
        };
        let mut join_types = Vec::with_capacity(self.joins.len());
        for (index, join) in self.joins.iter().enumerate() {
            match types.get(&join.source.table) {
                Some(def) => join_types.push(def),
                None => ctx.report(unknown_table(
                    &join.source.table,
                    &types,
                    &format!("select.joins[{}]", index),
                )),
            }
        }
        if join_types.len() != self.joins.len() {
            return Ok(None);
        }

        let records = scan(ctx, &base.name, "select.from").await?;
        if self.joins.is_empty() && self.from.alias.is_none() {
            return Ok(Some(records));
        }

        // Joined pseudo-records: one flattened row per alias
        let base_alias = self.from.name();
        ctx.aliases.insert(base_alias.clone(), base.name.clone());
        for (join, def) in self.joins.iter().zip(&join_types) {
            ctx.aliases.insert(join.source.name(), def.name.clone());
        }

        let mut rows: Vec<DataRecord> = records
            .into_iter()
            .map(|record| {
                let row = record.to_row();
                let mut pseudo = record;
                pseudo.fields = Map::new();
                pseudo.fields.insert(base_alias.clone(), row);
                pseudo
            })
            .collect();

        for (index, (join, def)) in self.joins.iter().zip(&join_types).enumerate() {
            let right = scan(ctx, &def.name, &format!("select.joins[{}]", index)).await?;
            rows = join_rows(rows, &right, join, index, ctx);
        }
        Ok(Some(rows))
    }

    fn apply_filter(&self, rows: Vec<DataRecord>, ctx: &mut QueryContext) -> Vec<DataRecord> {
        let filter = match &self.filter {
            Some(filter) => filter,
            None => return rows,
        };
        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            let mark = ctx.error_count();
            let pass = filter.eval_predicate(Some(&row), ctx, None);
            ctx.scope_errors(mark, "select.where");
            if pass {
                kept.push(row);
            }
        }
        kept
    }

    fn project_rows(&self, rows: &[DataRecord], ctx: &mut QueryContext) -> Vec<OutputRow> {
        rows.iter()
            .map(|row| {
                let out =
                    project_entries(&self.projections, Some(row), ctx, None, "select.projections");
                let keys = self.sort_keys(Some(row), ctx, None);
                (keys, out)
            })
            .collect()
    }

    fn project_groups(&self, rows: Vec<DataRecord>, ctx: &mut QueryContext) -> Vec<OutputRow> {
        let mut groups: Vec<Vec<DataRecord>> = Vec::new();

        if self.group_by.is_empty() {
            groups.push(rows);
        } else {
            let mut positions: HashMap<String, usize> = HashMap::new();
            for row in rows {
                let mark = ctx.error_count();
                let key: Vec<Json> = self
                    .group_by
                    .iter()
                    .map(|expr| expr.eval(Some(&row), ctx, None).into_raw())
                    .collect();
                ctx.scope_errors(mark, "select.group_by");

                let key = Json::Array(key).to_string();
                match positions.get(&key) {
                    Some(&pos) => groups[pos].push(row),
                    None => {
                        positions.insert(key, groups.len());
                        groups.push(vec![row]);
                    }
                }
            }
        }

        groups
            .iter()
            .map(|members| {
                let first = members.first();
                let group = Some(members.as_slice());
                let out =
                    project_entries(&self.projections, first, ctx, group, "select.projections");
                let keys = self.sort_keys(first, ctx, group);
                (keys, out)
            })
            .collect()
    }

    fn sort_keys(
        &self,
        record: Option<&DataRecord>,
        ctx: &mut QueryContext,
        group: Option<&[DataRecord]>,
    ) -> Vec<Value> {
        self.order_by
            .iter()
            .map(|order| {
                let mark = ctx.error_count();
                let value = order.expr.eval(record, ctx, group);
                ctx.scope_errors(mark, "select.order_by");
                value
            })
            .collect()
    }

    fn apply_sort(&self, output: &mut [OutputRow]) {
        if self.order_by.is_empty() {
            return;
        }
        output.sort_by(|(a, _), (b, _)| {
            for ((x, y), order) in a.iter().zip(b).zip(&self.order_by) {
                let ordering = order_values(x, y);
                if ordering != Ordering::Equal {
                    return if order.descending {
                        ordering.reverse()
                    } else {
                        ordering
                    };
                }
            }
            Ordering::Equal
        });
    }
}

fn join_rows(
    rows: Vec<DataRecord>,
    right: &[DataRecord],
    join: &Join,
    index: usize,
    ctx: &mut QueryContext,
) -> Vec<DataRecord> {
    let alias = join.source.name();
    let path = format!("select.joins[{}].on", index);
    let mut joined = Vec::new();

    for left in rows {
        let mut matched = false;
        for candidate in right {
            let mut row = left.clone();
            row.fields.insert(alias.clone(), candidate.to_row());

            let mark = ctx.error_count();
            let keep = join.on.eval_predicate(Some(&row), ctx, None);
            ctx.scope_errors(mark, &path);
            if keep {
                joined.push(row);
                matched = true;
            }
        }
        if !matched && join.kind == JoinKind::Left {
            let mut row = left;
            row.fields.insert(alias.clone(), Json::Null);
            joined.push(row);
        }
    }
    joined
}

/// Scan a table as this query's stage sees it, truncating at `max_scan_rows` and
/// reporting when the cap was hit.
pub(crate) async fn scan(
    ctx: &mut QueryContext,
    table: &str,
    path: &str,
) -> EngineResult<Vec<DataRecord>> {
    let max = ctx.limits.max_scan_rows;
    let store = Arc::clone(ctx.store());
    let mut records = store
        .scan(Some(ctx.stage()), table, Some(max.saturating_add(1)))
        .await?;
    if records.len() > max {
        records.truncate(max);
        ctx.report(
            QueryValidationError::new(
                path,
                format!("Scan limit exceeded: '{}' has more than {} rows", table, max),
            )
            .with_suggestion("Raise limits.max_scan_rows or narrow the query"),
        );
    }
    Ok(records)
}

pub(crate) fn unknown_table(table: &str, types: &Schema, path: &str) -> QueryValidationError {
    let available: Vec<&str> = types.names().collect();
    QueryValidationError::new(path, format!("Table '{}' does not exist", table))
        .with_suggestion(format!("Available tables: {}", available.join(", ")))
}

/// Sort order across mixed types: null first, then by type, then by value.
fn order_values(a: &Value, b: &Value) -> Ordering {
    fn rank(kind: TypeKind) -> u8 {
        match kind {
            TypeKind::Null => 0,
            TypeKind::Boolean => 1,
            TypeKind::Number => 2,
            TypeKind::String => 3,
            TypeKind::Array => 4,
            TypeKind::Object => 5,
        }
    }
    let (ka, kb) = (a.get_type(), b.get_type());
    if ka != kb {
        return rank(ka).cmp(&rank(kb));
    }
    a.compare_to(b)
}
