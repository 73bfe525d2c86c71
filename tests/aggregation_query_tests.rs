// ==================== SELECT / JOIN / Aggregation Tests ====================

mod common;

use common::*;
use docql::{ArithmeticOp, ComparisonOp, Expression, JoinKind, Select, SourceRef};
use serde_json::json;

fn eq(left: Expression, right: Expression) -> Expression {
    Expression::compare(ComparisonOp::Eq, left, right)
}

#[tokio::test]
async fn test_count_sum_avg_per_group() {
    let (mut ctx, _store) = create_context();
    let select = Select::new("users")
        .project(col("users", "status"))
        .project_as(Expression::call("count", vec![]), "n")
        .project_as(Expression::call("sum", vec![col("users", "age")]), "total")
        .project_as(Expression::call("avg", vec![col("users", "age")]), "mean")
        .group_by(col("users", "status"))
        .order_by(col("users", "status"), false);

    let result = execute(&mut ctx, select).await;
    assert!(result.can_commit, "{:?}", ctx.validation_errors());
    assert_eq!(
        result.rows,
        vec![
            json!({"status": null, "n": 1, "total": 28, "mean": 28}),
            json!({"status": "active", "n": 2, "total": 55, "mean": 27.5}),
            json!({"status": "disabled", "n": 1, "total": 35, "mean": 35}),
        ]
    );
}

#[tokio::test]
async fn test_aggregate_over_empty_set() {
    let (mut ctx, _store) = create_context();
    let select = Select::new("users")
        .project_as(Expression::call("count", vec![]), "n")
        .project_as(Expression::call("max", vec![col("users", "age")]), "oldest")
        .filter(Expression::compare(
            ComparisonOp::Gt,
            col("users", "age"),
            lit(json!(100)),
        ));

    let result = execute(&mut ctx, select).await;
    assert_eq!(result.rows, vec![json!({"n": 0, "oldest": null})]);
}

#[tokio::test]
async fn test_aggregate_type_errors_are_reported() {
    let (mut ctx, _store) = create_context();
    let select = Select::new("users")
        .project_as(Expression::call("sum", vec![col("users", "name")]), "bad");

    let result = execute(&mut ctx, select).await;
    assert!(!result.can_commit);
    assert_eq!(result.rows, vec![json!({"bad": null})]);
    assert_eq!(error_paths(&ctx), vec!["select.projections[0].sum()"]);
}

#[tokio::test]
async fn test_join_tasks_to_owners() {
    let (mut ctx, _store) = create_context();
    let select = Select::new("tasks")
        .alias("t")
        .join(
            JoinKind::Inner,
            SourceRef::aliased("users", "u"),
            eq(col("t", "owner"), col("u", "id")),
        )
        .project(col("t", "label"))
        .project_as(col("u", "name"), "owner")
        .filter(eq(col("t", "done"), lit(json!(false))))
        .order_by(col("t", "label"), false);

    let result = execute(&mut ctx, select).await;
    assert!(result.can_commit, "{:?}", ctx.validation_errors());
    assert_eq!(
        result.rows,
        vec![
            json!({"label": "Deploy", "owner": "Bob"}),
            json!({"label": "Ship", "owner": "Alice"}),
        ]
    );
}

#[tokio::test]
async fn test_three_way_join_with_group() {
    let (mut ctx, _store) = create_context();
    let select = Select::new("tasks")
        .alias("t")
        .join(
            JoinKind::Inner,
            SourceRef::aliased("users", "u"),
            eq(col("t", "owner"), col("u", "id")),
        )
        .join(
            JoinKind::Inner,
            SourceRef::aliased("teams", "tm"),
            eq(col("u", "team"), col("tm", "id")),
        )
        .project_as(col("tm", "title"), "team")
        .project_as(Expression::call("count", vec![col("t", "id")]), "tasks")
        .group_by(col("tm", "title"))
        .order_by(col("tm", "title"), false);

    let result = execute(&mut ctx, select).await;
    assert_eq!(
        result.rows,
        vec![
            json!({"team": "Core", "tasks": 2}),
            json!({"team": "Web", "tasks": 1}),
        ]
    );
}

#[tokio::test]
async fn test_left_join_keeps_unmatched_rows() {
    let (mut ctx, _store) = create_context();
    let select = Select::new("teams")
        .alias("tm")
        .join(
            JoinKind::Left,
            SourceRef::aliased("users", "u"),
            eq(col("u", "team"), col("tm", "id")),
        )
        .project_as(col("tm", "title"), "team")
        .project_as(Expression::call("count", vec![col("u", "id")]), "members")
        .group_by(col("tm", "id"))
        .order_by(Expression::call("count", vec![col("u", "id")]), true)
        .order_by(col("tm", "title"), false);

    let result = execute(&mut ctx, select).await;
    assert_eq!(
        result.rows,
        vec![
            json!({"team": "Core", "members": 2}),
            json!({"team": "Web", "members": 1}),
            json!({"team": "Ops", "members": 0}),
        ]
    );
}

#[tokio::test]
async fn test_type_name_also_resolves_inside_join() {
    let (mut ctx, _store) = create_context();
    let select = Select::new("tasks")
        .alias("t")
        .join(
            JoinKind::Inner,
            SourceRef::aliased("users", "u"),
            eq(col("tasks", "owner"), col("users", "id")),
        )
        .project(col("users", "name"))
        .filter(eq(col("tasks", "id"), lit(json!("t3"))));

    let result = execute(&mut ctx, select).await;
    assert_eq!(result.rows, vec![json!({"name": "Bob"})]);
}

#[tokio::test]
async fn test_like_in_list_and_logic() {
    let (mut ctx, _store) = create_context();
    let select = Select::new("users")
        .project(col("users", "name"))
        .filter(Expression::or(
            Expression::compare(ComparisonOp::Like, col("users", "name"), lit(json!("_ob"))),
            Expression::and(
                Expression::in_list(
                    col("users", "age"),
                    vec![lit(json!(28)), lit(json!(35))],
                    false,
                ),
                Expression::is_null(col("users", "team"), true),
            ),
        ))
        .order_by(col("users", "name"), false);

    let result = execute(&mut ctx, select).await;
    let names: Vec<&str> = result.rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["Bob", "Charlie"]);
}

#[tokio::test]
async fn test_null_comparison_convention_in_where() {
    let (mut ctx, _store) = create_context();
    // Diana has no team: team = NULL is true for her only
    let select = Select::new("users")
        .project(col("users", "name"))
        .filter(eq(col("users", "team"), Expression::null()));
    let result = execute(&mut ctx, select).await;
    assert_eq!(result.rows, vec![json!({"name": "Diana"})]);

    let select = Select::new("users")
        .project(col("users", "name"))
        .filter(Expression::compare(
            ComparisonOp::NotEq,
            col("users", "team"),
            Expression::null(),
        ));
    let result = execute(&mut ctx, select).await;
    assert!(result.rows.is_empty());
    assert!(!ctx.has_errors());
}

#[tokio::test]
async fn test_comparing_mismatched_types_reports_once() {
    let (mut ctx, _store) = create_context();
    let select = Select::new("users")
        .project(col("users", "name"))
        .filter(eq(col("users", "age"), lit(json!("30"))));

    let result = execute(&mut ctx, select).await;
    assert!(result.rows.is_empty());
    assert!(!result.can_commit);
    assert_eq!(error_paths(&ctx), vec!["select.where.(=)"]);
}

#[tokio::test]
async fn test_unknown_join_table_is_fatal() {
    let (mut ctx, _store) = create_context();
    let select = Select::new("users")
        .join(
            JoinKind::Inner,
            SourceRef::new("projects"),
            eq(col("users", "id"), col("projects", "owner")),
        )
        .project(col("users", "name"));

    let result = execute(&mut ctx, select).await;
    assert!(result.rows.is_empty());
    assert_eq!(error_paths(&ctx), vec!["select.joins[0]"]);
}

#[tokio::test]
async fn test_functions_in_projection() {
    let (mut ctx, _store) = create_context();
    let select = Select::new("users")
        .project_as(
            Expression::call(
                "concat",
                vec![
                    Expression::call("lower", vec![col("users", "name")]),
                    lit(json!("@")),
                    Expression::call("coalesce", vec![col("users", "team"), lit(json!("none"))]),
                ],
            ),
            "handle",
        )
        .project_as(
            Expression::call("round", vec![
                Expression::binary(ArithmeticOp::Divide, col("users", "age"), lit(json!(7))),
                lit(json!(1)),
            ]),
            "weeks",
        )
        .order_by(col("users", "age"), false)
        .limit(2);

    let result = execute(&mut ctx, select).await;
    assert_eq!(
        result.rows,
        vec![
            json!({"handle": "bob@web", "weeks": 3.6}),
            json!({"handle": "diana@none", "weeks": 4}),
        ]
    );
}

#[tokio::test]
async fn test_type_name_is_ambiguous_in_self_join() {
    let (mut ctx, _store) = create_context();
    let select = Select::new("users")
        .alias("u")
        .join(
            JoinKind::Inner,
            SourceRef::aliased("users", "m"),
            eq(col("u", "id"), col("m", "id")),
        )
        .project_as(col("users", "name"), "either")
        .project_as(col("m", "name"), "mate")
        .order_by(col("m", "name"), false)
        .limit(2);

    let result = execute(&mut ctx, select).await;
    assert!(!result.can_commit);
    assert_eq!(
        result.rows,
        vec![
            json!({"either": null, "mate": "Alice"}),
            json!({"either": null, "mate": "Bob"}),
        ]
    );

    let errors = ctx.validation_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path, "select.projections[0].users.name");
    assert_eq!(
        errors[0].suggestion.as_deref(),
        Some("Qualify the column with one of: m, u")
    );
}
