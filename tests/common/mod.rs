//! Common test utilities
//!
//! Provides shared helpers for:
//! - Building the users / teams / tasks schema
//! - Seeding a `MemoryStore`
//! - Running statements against a fresh context

#![allow(dead_code)]

use std::sync::Arc;

use docql::{
    Engine, Expression, FieldType, MemoryStore, QueryContext, QueryResult, Schema, Statement,
    TypeDef, TypeField,
};
use serde_json::{json, Value};

pub fn test_schema() -> Schema {
    Schema::from_types(vec![
        TypeDef::new(
            "users",
            vec![
                TypeField::new("name", FieldType::String).required(),
                TypeField::new("age", FieldType::Number),
                TypeField::enumeration("status", &["active", "disabled"]),
                TypeField::reference("team", "teams"),
                TypeField::new("joined", FieldType::Date),
                TypeField::new("profile", FieldType::Json),
            ],
        )
        .with_friendly_name("Users"),
        TypeDef::new(
            "teams",
            vec![
                TypeField::new("title", FieldType::String).required(),
                TypeField::new("budget", FieldType::Number),
            ],
        ),
        TypeDef::new(
            "tasks",
            vec![
                TypeField::new("label", FieldType::String),
                TypeField::reference("owner", "users"),
                TypeField::new("done", FieldType::Boolean),
            ],
        ),
    ])
}

pub fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.seed("teams", "core", json!({"title": "Core", "budget": 1000}));
    store.seed("teams", "web", json!({"title": "Web", "budget": 400}));
    store.seed("teams", "ops", json!({"title": "Ops"}));

    store.seed(
        "users",
        "alice",
        json!({"name": "Alice", "age": 30, "status": "active", "team": "core"}),
    );
    store.seed(
        "users",
        "bob",
        json!({"name": "Bob", "age": 25, "status": "active", "team": "web"}),
    );
    store.seed(
        "users",
        "charlie",
        json!({"name": "Charlie", "age": 35, "status": "disabled", "team": "core"}),
    );
    store.seed("users", "diana", json!({"name": "Diana", "age": 28}));

    store.seed("tasks", "t1", json!({"label": "Ship", "owner": "alice", "done": false}));
    store.seed("tasks", "t2", json!({"label": "Review", "owner": "alice", "done": true}));
    store.seed("tasks", "t3", json!({"label": "Deploy", "owner": "bob", "done": false}));
    store
}

pub fn create_context() -> (QueryContext, Arc<MemoryStore>) {
    let store = seeded_store();
    let ctx = QueryContext::new(Arc::new(test_schema()), store.clone());
    (ctx, store)
}

pub fn create_engine() -> (Engine, Arc<MemoryStore>) {
    let store = seeded_store();
    (Engine::new(test_schema(), store.clone()), store)
}

pub async fn execute(ctx: &mut QueryContext, statement: impl Into<Statement>) -> QueryResult {
    statement
        .into()
        .execute(ctx)
        .await
        .expect("statement should not fail at the store level")
}

pub fn col(source: &str, column: &str) -> Expression {
    Expression::column(source, column)
}

pub fn lit(value: Value) -> Expression {
    Expression::literal(value)
}

pub fn error_paths(ctx: &QueryContext) -> Vec<String> {
    ctx.validation_errors().iter().map(|e| e.path.clone()).collect()
}
