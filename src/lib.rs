//! # docql
//!
//! Schema-aware query and mutation engine for typed document records.
//!
//! Records are JSON objects stored per type. Statements are expression trees that are
//! checked against the schema while they run: every problem becomes a
//! [`QueryValidationError`] in the per-query [`QueryContext`], and writes are only kept
//! when the statement finished without any.
//!
//! ```no_run
//! use std::sync::Arc;
//! use docql::{Engine, Expression, Insert, MemoryStore, Schema};
//! use serde_json::json;
//!
//! # async fn run(schema: Schema) -> docql::EngineResult<()> {
//! let engine = Engine::new(schema, Arc::new(MemoryStore::new()));
//! let insert = Insert::values(
//!     "users",
//!     &["name", "age"],
//!     vec![vec![Expression::literal(json!("Alice")), Expression::literal(json!(30))]],
//! );
//! let outcome = engine.execute(&insert.into()).await?;
//! assert!(outcome.result.can_commit);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod expr;
pub mod record;
pub mod schema;
pub mod state;
pub mod statement;
pub mod telemetry;
pub mod value;

pub use config::EngineConfig;
pub use context::{QueryContext, QueryLimits};
pub use engine::{Engine, QueryOutcome};
pub use error::{EngineError, EngineResult, QueryValidationError};
pub use expr::{ArithmeticOp, BuiltinFunctions, ComparisonOp, Expression, LogicalOp};
pub use record::DataRecord;
pub use schema::{FieldType, Schema, SchemaIssue, TypeDef, TypeField};
pub use state::{MemoryStore, StageId, TableStore};
pub use statement::{
    Assignment, Insert, InsertSource, Join, JoinKind, OrderBy, Projection, QueryResult,
    Select, SourceRef, Statement, Update,
};
pub use value::{TypeKind, Value};
