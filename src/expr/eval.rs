//! Expression evaluation.
//!
//! Evaluation is synchronous and never fails: every problem is reported into the
//! context and the offending node yields null (or `false` for predicates), so sibling
//! nodes still run and can report their own problems. Children are evaluated left to
//! right, depth first.

use std::cmp::Ordering;

use serde_json::{json, Value as Json};

use super::builtins::{is_aggregate, BuiltinFunctions};
use super::helpers::like_matches;
use super::{ArithmeticOp, ComparisonOp, Expression, LogicalOp};
use crate::context::QueryContext;
use crate::error::{EngineError, QueryValidationError};
use crate::record::{is_system_column, DataRecord};
use crate::schema::TypeField;
use crate::value::{TypeKind, Value};

impl Expression {
    /// Evaluate against one record.
    ///
    /// `record` is `None` outside row context (e.g. VALUES literals). `group` holds the
    /// records of the current aggregation group and is only read by aggregate calls.
    pub fn eval(
        &self,
        record: Option<&DataRecord>,
        ctx: &mut QueryContext,
        group: Option<&[DataRecord]>,
    ) -> Value {
        match self {
            Expression::Literal { value } => Value::new(value.clone()),

            Expression::SourceColumn { source, column } => {
                eval_column(source, column, record, ctx)
            }

            Expression::Binary { op, left, right } => {
                let l = left.eval(record, ctx, group);
                let r = right.eval(record, ctx, group);
                self.eval_binary(*op, l, r, ctx)
            }

            Expression::Comparison { cmp, left, right } => {
                let l = left.eval(record, ctx, group);
                let r = right.eval(record, ctx, group);
                Value::bool(self.eval_comparison(*cmp, &l, &r, ctx))
            }

            Expression::Logical { op, left, right } => {
                let l = left.eval(record, ctx, group).to_bool();
                let r = right.eval(record, ctx, group).to_bool();
                Value::bool(match op {
                    LogicalOp::And => l && r,
                    LogicalOp::Or => l || r,
                })
            }

            Expression::Not { operand } => {
                let v = operand.eval(record, ctx, group);
                if v.is_null() {
                    Value::null()
                } else {
                    Value::bool(!v.to_bool())
                }
            }

            Expression::Negate { operand } => {
                let v = operand.eval(record, ctx, group);
                match v.get_type() {
                    TypeKind::Null => Value::null(),
                    TypeKind::Number => Value::number(-v.to_number()),
                    other => {
                        ctx.report(
                            QueryValidationError::new(
                                self.label(),
                                format!("Cannot negate a {}", other),
                            )
                            .with_types(TypeKind::Number.as_str(), other.as_str()),
                        );
                        Value::null()
                    }
                }
            }

            Expression::IsNull { operand, negated } => {
                let v = operand.eval(record, ctx, group);
                Value::bool(v.is_null() != *negated)
            }

            Expression::InList {
                operand,
                list,
                negated,
            } => {
                let needle = operand.eval(record, ctx, group);
                let items: Vec<Value> = list
                    .iter()
                    .map(|item| item.eval(record, ctx, group))
                    .collect();
                if needle.is_null() {
                    return Value::bool(false);
                }
                let found = items.iter().any(|item| {
                    item.get_type() == needle.get_type()
                        && needle.compare_to(item) == Ordering::Equal
                });
                Value::bool(found != *negated)
            }

            Expression::FunctionCall { func, args } => {
                if is_aggregate(func, args.len()) {
                    return self.eval_aggregate(func, args, ctx, group);
                }
                let values: Vec<Json> = args
                    .iter()
                    .map(|arg| arg.eval(record, ctx, group).into_raw())
                    .collect();
                match BuiltinFunctions::call(func, &values) {
                    Ok(result) => Value::new(result),
                    Err(e) => {
                        self.report_function_error(func, e, ctx);
                        Value::null()
                    }
                }
            }
        }
    }

    /// Evaluate as a predicate: only a boolean `true` passes.
    pub fn eval_predicate(
        &self,
        record: Option<&DataRecord>,
        ctx: &mut QueryContext,
        group: Option<&[DataRecord]>,
    ) -> bool {
        matches!(self.eval(record, ctx, group).raw(), Json::Bool(true))
    }

    fn eval_binary(&self, op: ArithmeticOp, l: Value, r: Value, ctx: &mut QueryContext) -> Value {
        // Arithmetic propagates null instead of reporting it
        if l.is_null() || r.is_null() {
            return Value::null();
        }

        let (lk, rk) = (l.get_type(), r.get_type());
        if lk != rk {
            ctx.report(
                QueryValidationError::new(
                    self.label(),
                    format!(
                        "Type mismatch in '{}': cannot combine {} with {}",
                        op.as_str(),
                        lk,
                        rk
                    ),
                )
                .with_types(lk.as_str(), rk.as_str()),
            );
            return Value::null();
        }

        let (a, b) = (l.to_number(), r.to_number());
        if op == ArithmeticOp::Add {
            if a.is_nan() || b.is_nan() {
                return Value::string(format!("{}{}", l.to_text(), r.to_text()));
            }
            return Value::number(a + b);
        }

        if lk != TypeKind::Number {
            ctx.report(
                QueryValidationError::new(
                    self.label(),
                    format!("Operator '{}' requires numbers, got {}", op.as_str(), lk),
                )
                .with_types(TypeKind::Number.as_str(), lk.as_str()),
            );
            return Value::null();
        }

        match op {
            ArithmeticOp::Subtract => Value::number(a - b),
            ArithmeticOp::Multiply => Value::number(a * b),
            ArithmeticOp::Divide | ArithmeticOp::Modulo if b == 0.0 => Value::null(),
            ArithmeticOp::Divide => Value::number(a / b),
            ArithmeticOp::Modulo => Value::number(a % b),
            ArithmeticOp::Add => Value::number(a + b),
        }
    }

    /// NULL-aware comparison.
    ///
    /// Both sides null: true only for `=` and `>=`. This mirrors long-standing caller
    /// expectations and intentionally differs from SQL's unknown result.
    /// One side null: always false.
    fn eval_comparison(
        &self,
        cmp: ComparisonOp,
        l: &Value,
        r: &Value,
        ctx: &mut QueryContext,
    ) -> bool {
        match (l.is_null(), r.is_null()) {
            (true, true) => return matches!(cmp, ComparisonOp::Eq | ComparisonOp::GtEq),
            (true, false) | (false, true) => return false,
            (false, false) => {}
        }

        if let Err(message) = l.is_comparable_with(r, cmp.as_str()) {
            ctx.report(
                QueryValidationError::new(self.label(), message)
                    .with_types(l.get_type().as_str(), r.get_type().as_str()),
            );
            return false;
        }

        let ordering = || l.compare_to(r);
        match cmp {
            ComparisonOp::Eq => ordering() == Ordering::Equal,
            ComparisonOp::NotEq => ordering() != Ordering::Equal,
            ComparisonOp::Lt => ordering() == Ordering::Less,
            ComparisonOp::Gt => ordering() == Ordering::Greater,
            ComparisonOp::LtEq => ordering() != Ordering::Greater,
            ComparisonOp::GtEq => ordering() != Ordering::Less,
            ComparisonOp::Like | ComparisonOp::NotLike => {
                match like_matches(&l.to_text(), &r.to_text(), ctx.limits.max_like_pattern) {
                    Ok(is_match) => is_match == (cmp == ComparisonOp::Like),
                    Err(message) => {
                        ctx.report(QueryValidationError::new(self.label(), message));
                        false
                    }
                }
            }
        }
    }

    fn eval_aggregate(
        &self,
        func: &str,
        args: &[Expression],
        ctx: &mut QueryContext,
        group: Option<&[DataRecord]>,
    ) -> Value {
        let group = match group {
            Some(group) => group,
            None => {
                ctx.report(
                    QueryValidationError::new(
                        self.label(),
                        format!("Aggregate function '{}' used outside of a group", func),
                    )
                    .with_suggestion("Use aggregates in SELECT projections"),
                );
                return Value::null();
            }
        };

        let is_count = func.eq_ignore_ascii_case("count");
        if args.len() > 1 || (!is_count && args.is_empty()) {
            let expected = if is_count { "0 or 1" } else { "1" };
            ctx.report(QueryValidationError::new(
                self.label(),
                format!(
                    "{} expects {} argument(s), got {}",
                    func.to_uppercase(),
                    expected,
                    args.len()
                ),
            ));
            return Value::null();
        }

        let values: Vec<Json> = group
            .iter()
            .map(|member| match args.first() {
                Some(arg) => arg.eval(Some(member), ctx, None).into_raw(),
                None => Json::String("*".to_string()),
            })
            .collect();

        match BuiltinFunctions::aggregate(func, &values, group.len()) {
            Ok(result) => Value::new(result),
            Err(e) => {
                self.report_function_error(func, e, ctx);
                Value::null()
            }
        }
    }

    fn report_function_error(&self, func: &str, error: EngineError, ctx: &mut QueryContext) {
        let message = match error {
            EngineError::Function(message) => message,
            other => other.to_string(),
        };
        ctx.report(
            QueryValidationError::new(self.label(), message)
                .with_metadata(json!({ "function": func })),
        );
    }
}

fn eval_column(
    source: &str,
    column: &str,
    record: Option<&DataRecord>,
    ctx: &mut QueryContext,
) -> Value {
    let path = format!("{}.{}", source, column);

    // A type name bound under several aliases does not say which side to read
    if !ctx.aliases.contains_key(source) {
        let candidates = ctx.aliases_of(source);
        if candidates.len() > 1 {
            let candidates = candidates.join(", ");
            ctx.report(
                QueryValidationError::new(
                    path,
                    format!("Source '{}' is ambiguous: it is joined as {}", source, candidates),
                )
                .with_suggestion(format!("Qualify the column with one of: {}", candidates)),
            );
            return Value::null();
        }
    }

    let resolved: Result<(String, Option<TypeField>), QueryValidationError> =
        match ctx.resolve_source(source) {
            None => {
                let tables: Vec<&str> = ctx.types.names().collect();
                Err(QueryValidationError::new(
                    path,
                    format!("Table '{}' does not exist", source),
                )
                .with_suggestion(format!("Available tables: {}", tables.join(", "))))
            }
            Some(def) if column == "*" || is_system_column(column) => Ok((def.name.clone(), None)),
            Some(def) => match def.field(column) {
                Some(field) => Ok((def.name.clone(), Some(field.clone()))),
                None => Err(QueryValidationError::new(
                    path,
                    format!("Column '{}' does not exist in '{}'", column, def.name),
                )
                .with_suggestion(format!("Available columns: {}", def.available_columns()))),
            },
        };

    let (type_name, field) = match resolved {
        Ok(resolved) => resolved,
        Err(error) => {
            ctx.report(error);
            return Value::null();
        }
    };

    let record = match record {
        Some(record) => record,
        None => return Value::null().with_source(&type_name, field.as_ref()),
    };

    let raw = if ctx.in_join() {
        // Joined pseudo-record: one flattened row per alias
        let side = record.fields.get(source).or_else(|| {
            ctx.aliases
                .iter()
                .find(|(_, target)| target.as_str() == source)
                .and_then(|(alias, _)| record.fields.get(alias))
        });
        match side {
            Some(Json::Object(row)) if column == "*" => Json::Object(row.clone()),
            Some(Json::Object(row)) => row.get(column).cloned().unwrap_or(Json::Null),
            _ => Json::Null,
        }
    } else if column == "*" {
        record.to_row()
    } else {
        record.get(column).unwrap_or(Json::Null)
    };

    Value::new(raw).with_source(&type_name, field.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, Schema, TypeDef, TypeField};
    use crate::state::MemoryStore;
    use std::sync::Arc;

    fn context() -> QueryContext {
        let schema = Schema::from_types(vec![
            TypeDef::new(
                "users",
                vec![
                    TypeField::new("name", FieldType::String),
                    TypeField::new("age", FieldType::Number),
                    TypeField::reference("team", "teams"),
                ],
            ),
            TypeDef::new("teams", vec![TypeField::new("title", FieldType::String)]),
        ]);
        QueryContext::new(Arc::new(schema), Arc::new(MemoryStore::new()))
    }

    fn record(fields: Json) -> DataRecord {
        DataRecord::with_id("u1".to_string(), fields.as_object().cloned().unwrap())
    }

    fn lit(value: Json) -> Expression {
        Expression::literal(value)
    }

    fn cmp(op: ComparisonOp, l: Json, r: Json) -> Expression {
        Expression::compare(op, lit(l), lit(r))
    }

    #[test]
    fn test_division_by_zero_yields_null() {
        let mut ctx = context();
        for op in [ArithmeticOp::Divide, ArithmeticOp::Modulo] {
            let expr = Expression::binary(op, lit(json!(10)), lit(json!(0)));
            assert!(expr.eval(None, &mut ctx, None).is_null());
        }
        assert!(!ctx.has_errors());

        let expr = Expression::binary(ArithmeticOp::Divide, lit(json!(10)), lit(json!(4)));
        assert_eq!(expr.eval(None, &mut ctx, None).raw(), &json!(2.5));
    }

    #[test]
    fn test_arithmetic_null_propagation_and_mismatch() {
        let mut ctx = context();
        let expr = Expression::binary(ArithmeticOp::Multiply, lit(json!(2)), Expression::null());
        assert!(expr.eval(None, &mut ctx, None).is_null());
        assert!(!ctx.has_errors());

        let expr = Expression::binary(ArithmeticOp::Subtract, lit(json!(2)), lit(json!("a")));
        assert!(expr.eval(None, &mut ctx, None).is_null());
        assert_eq!(ctx.error_count(), 1);
        assert_eq!(ctx.validation_errors()[0].path, "(-)");
        assert_eq!(ctx.validation_errors()[0].actual_type.as_deref(), Some("string"));
    }

    #[test]
    fn test_add_numbers_or_concatenate() {
        let mut ctx = context();
        let sum = Expression::binary(ArithmeticOp::Add, lit(json!(2)), lit(json!(3)));
        assert_eq!(sum.eval(None, &mut ctx, None).raw(), &json!(5));

        let concat = Expression::binary(ArithmeticOp::Add, lit(json!("ab")), lit(json!("cd")));
        assert_eq!(concat.eval(None, &mut ctx, None).raw(), &json!("abcd"));

        let strings = Expression::binary(ArithmeticOp::Subtract, lit(json!("a")), lit(json!("b")));
        assert!(strings.eval(None, &mut ctx, None).is_null());
        assert_eq!(ctx.error_count(), 1);
    }

    #[test]
    fn test_null_comparison_convention() {
        let mut ctx = context();
        let both_null = |op| cmp(op, Json::Null, Json::Null);
        assert!(both_null(ComparisonOp::Eq).eval_predicate(None, &mut ctx, None));
        assert!(both_null(ComparisonOp::GtEq).eval_predicate(None, &mut ctx, None));
        assert!(!both_null(ComparisonOp::Lt).eval_predicate(None, &mut ctx, None));
        assert!(!both_null(ComparisonOp::NotEq).eval_predicate(None, &mut ctx, None));

        for op in [
            ComparisonOp::Eq,
            ComparisonOp::NotEq,
            ComparisonOp::Lt,
            ComparisonOp::Gt,
            ComparisonOp::LtEq,
            ComparisonOp::GtEq,
            ComparisonOp::Like,
            ComparisonOp::NotLike,
        ] {
            assert!(!cmp(op, Json::Null, json!(1)).eval_predicate(None, &mut ctx, None));
            assert!(!cmp(op, json!("x"), Json::Null).eval_predicate(None, &mut ctx, None));
        }
        assert!(!ctx.has_errors());
    }

    #[test]
    fn test_ordering_comparisons() {
        let mut ctx = context();
        assert!(cmp(ComparisonOp::Lt, json!(1), json!(2)).eval_predicate(None, &mut ctx, None));
        assert!(cmp(ComparisonOp::LtEq, json!(2), json!(2)).eval_predicate(None, &mut ctx, None));
        assert!(cmp(ComparisonOp::NotEq, json!("a"), json!("b")).eval_predicate(None, &mut ctx, None));
        assert!(cmp(ComparisonOp::Gt, json!(true), json!(false)).eval_predicate(None, &mut ctx, None));
        assert!(!ctx.has_errors());
    }

    #[test]
    fn test_incomparable_types_report_and_yield_false() {
        let mut ctx = context();
        assert!(!cmp(ComparisonOp::Eq, json!(1), json!("1")).eval_predicate(None, &mut ctx, None));
        assert_eq!(ctx.error_count(), 1);
        assert_eq!(
            ctx.validation_errors()[0].message,
            "Cannot compare number with string using '='"
        );
    }

    #[test]
    fn test_like_and_not_like() {
        let mut ctx = context();
        let like = |text: &str| cmp(ComparisonOp::Like, json!(text), json!("a%c"));
        assert!(like("abc").eval_predicate(None, &mut ctx, None));
        assert!(like("ac").eval_predicate(None, &mut ctx, None));
        assert!(like("AbC").eval_predicate(None, &mut ctx, None));
        assert!(!like("ab").eval_predicate(None, &mut ctx, None));
        assert!(cmp(ComparisonOp::NotLike, json!("ab"), json!("a%c")).eval_predicate(None, &mut ctx, None));
    }

    #[test]
    fn test_column_resolution() {
        let mut ctx = context();
        let row = record(json!({"name": "Alice", "age": 30}));

        let age = Expression::column("users", "age").eval(Some(&row), &mut ctx, None);
        assert_eq!(age.raw(), &json!(30));
        assert_eq!(age.type_name(), Some("users"));
        assert_eq!(age.field().unwrap().name, "age");

        let id = Expression::column("users", "id").eval(Some(&row), &mut ctx, None);
        assert_eq!(id.raw(), &json!("u1"));

        let all = Expression::column("users", "*").eval(Some(&row), &mut ctx, None);
        assert_eq!(all.raw()["name"], json!("Alice"));
        assert_eq!(all.raw()["id"], json!("u1"));

        let missing = Expression::column("users", "team").eval(Some(&row), &mut ctx, None);
        assert!(missing.is_null());
        assert!(!ctx.has_errors());
    }

    #[test]
    fn test_unknown_column_and_table() {
        let mut ctx = context();
        let row = record(json!({}));

        assert!(Expression::column("users", "agee")
            .eval(Some(&row), &mut ctx, None)
            .is_null());
        assert!(Expression::column("ghosts", "x")
            .eval(Some(&row), &mut ctx, None)
            .is_null());

        let errors = ctx.validation_errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].path, "users.agee");
        assert_eq!(
            errors[0].suggestion.as_deref(),
            Some("Available columns: name, age, team")
        );
        assert_eq!(errors[1].message, "Table 'ghosts' does not exist");
    }

    #[test]
    fn test_join_pseudo_record_resolution() {
        let mut ctx = context();
        ctx.aliases.insert("u".to_string(), "users".to_string());
        ctx.aliases.insert("t".to_string(), "teams".to_string());
        let joined = record(json!({
            "u": {"id": "u1", "name": "Alice", "team": "t1"},
            "t": {"id": "t1", "title": "Core"}
        }));

        let title = Expression::column("t", "title").eval(Some(&joined), &mut ctx, None);
        assert_eq!(title.raw(), &json!("Core"));
        let by_type = Expression::column("teams", "title").eval(Some(&joined), &mut ctx, None);
        assert_eq!(by_type.raw(), &json!("Core"));
        let team_ref = Expression::column("u", "team").eval(Some(&joined), &mut ctx, None);
        assert_eq!(team_ref.raw(), &json!("t1"));
        assert!(!ctx.has_errors());
    }

    #[test]
    fn test_function_errors_are_reported_not_thrown() {
        let mut ctx = context();
        let bad = Expression::call("abs", vec![lit(json!("x"))]);
        assert!(bad.eval(None, &mut ctx, None).is_null());
        let unknown = Expression::call("nope", vec![]);
        assert!(unknown.eval(None, &mut ctx, None).is_null());

        let errors = ctx.validation_errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].path, "abs()");
        assert_eq!(errors[0].message, "ABS: argument 1 must be a number, got string");
        assert_eq!(errors[1].message, "Unknown function: nope");
    }

    #[test]
    fn test_arguments_evaluate_left_to_right() {
        let mut ctx = context();
        let expr = Expression::call(
            "concat",
            vec![
                Expression::column("users", "first"),
                Expression::column("users", "second"),
            ],
        );
        let row = record(json!({}));
        expr.eval(Some(&row), &mut ctx, None);
        let paths: Vec<&str> = ctx.validation_errors().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["users.first", "users.second"]);
    }

    #[test]
    fn test_aggregates_over_group() {
        let mut ctx = context();
        let group = vec![
            record(json!({"age": 20})),
            record(json!({"age": 40})),
            record(json!({"age": null})),
        ];
        let age = || Expression::column("users", "age");

        let sum = Expression::call("sum", vec![age()]);
        assert_eq!(sum.eval(None, &mut ctx, Some(&group)).raw(), &json!(60));
        let avg = Expression::call("avg", vec![age()]);
        assert_eq!(avg.eval(None, &mut ctx, Some(&group)).raw(), &json!(30));
        let count_all = Expression::call("count", vec![]);
        assert_eq!(count_all.eval(None, &mut ctx, Some(&group)).raw(), &json!(3));
        let count_age = Expression::call("count", vec![age()]);
        assert_eq!(count_age.eval(None, &mut ctx, Some(&group)).raw(), &json!(2));
        assert!(!ctx.has_errors());

        assert!(sum.eval(None, &mut ctx, None).is_null());
        assert_eq!(ctx.error_count(), 1);
    }

    #[test]
    fn test_logical_and_null_checks() {
        let mut ctx = context();
        let t = || lit(json!(true));
        let f = || lit(json!(false));
        assert!(Expression::or(f(), t()).eval_predicate(None, &mut ctx, None));
        assert!(!Expression::and(t(), Expression::null()).eval_predicate(None, &mut ctx, None));
        assert!(Expression::not(f()).eval_predicate(None, &mut ctx, None));
        assert!(Expression::not(Expression::null()).eval(None, &mut ctx, None).is_null());
        assert!(Expression::is_null(Expression::null(), false).eval_predicate(None, &mut ctx, None));
        assert!(Expression::is_null(t(), true).eval_predicate(None, &mut ctx, None));
        assert_eq!(
            Expression::negate(lit(json!(4))).eval(None, &mut ctx, None).raw(),
            &json!(-4)
        );
    }

    #[test]
    fn test_in_list() {
        let mut ctx = context();
        let list = || vec![lit(json!(1)), lit(json!("2")), lit(json!(3))];
        assert!(Expression::in_list(lit(json!(3)), list(), false).eval_predicate(None, &mut ctx, None));
        assert!(!Expression::in_list(lit(json!(2)), list(), false).eval_predicate(None, &mut ctx, None));
        assert!(Expression::in_list(lit(json!(2)), list(), true).eval_predicate(None, &mut ctx, None));
        assert!(!Expression::in_list(Expression::null(), list(), true).eval_predicate(None, &mut ctx, None));
    }
}
