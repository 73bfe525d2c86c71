//! Builtin functions callable from `Expression::FunctionCall`.
//!
//! Each family validates its own arity and argument types and returns
//! `EngineError::Function` on violation; the evaluator turns that into a validation
//! error and a null result.

mod aggregate;
mod datetime;
mod math;
mod string;
mod type_check;

use serde_json::Value;

use crate::error::{EngineError, EngineResult};

pub use aggregate::is_aggregate;

/// Container for builtin function implementations.
pub struct BuiltinFunctions;

impl BuiltinFunctions {
    /// Call a scalar builtin by name with already evaluated arguments.
    pub fn call(name: &str, args: &[Value]) -> EngineResult<Value> {
        let upper_name = name.to_uppercase();

        if let Some(result) = string::call(&upper_name, args)? {
            return Ok(result);
        }

        if let Some(result) = math::call(&upper_name, args)? {
            return Ok(result);
        }

        if let Some(result) = type_check::call(&upper_name, args)? {
            return Ok(result);
        }

        if let Some(result) = datetime::call(&upper_name, args)? {
            return Ok(result);
        }

        Err(EngineError::Function(format!("Unknown function: {}", name)))
    }

    /// Fold an aggregate over one evaluated argument per group record.
    pub fn aggregate(name: &str, values: &[Value], group_size: usize) -> EngineResult<Value> {
        aggregate::call(&name.to_uppercase(), values, group_size)
    }
}

pub(crate) fn check_args(name: &str, args: &[Value], expected: usize) -> EngineResult<()> {
    if args.len() != expected {
        return Err(EngineError::Function(format!(
            "{} expects {} argument{}, got {}",
            name,
            expected,
            if expected == 1 { "" } else { "s" },
            args.len()
        )));
    }
    Ok(())
}

pub(crate) fn check_arg_range(
    name: &str,
    args: &[Value],
    min: usize,
    max: usize,
) -> EngineResult<()> {
    if args.len() < min || args.len() > max {
        return Err(EngineError::Function(format!(
            "{} expects {} to {} arguments, got {}",
            name,
            min,
            max,
            args.len()
        )));
    }
    Ok(())
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(crate) fn get_string<'a>(name: &str, args: &'a [Value], index: usize) -> EngineResult<&'a str> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(EngineError::Function(format!(
            "{}: argument {} must be a string, got {}",
            name,
            index + 1,
            type_name(other)
        ))),
        None => Err(EngineError::Function(format!(
            "{}: missing argument {}",
            name,
            index + 1
        ))),
    }
}

pub(crate) fn get_number(name: &str, args: &[Value], index: usize) -> EngineResult<f64> {
    match args.get(index) {
        Some(Value::Number(n)) => Ok(n.as_f64().unwrap_or(0.0)),
        Some(other) => Err(EngineError::Function(format!(
            "{}: argument {} must be a number, got {}",
            name,
            index + 1,
            type_name(other)
        ))),
        None => Err(EngineError::Function(format!(
            "{}: missing argument {}",
            name,
            index + 1
        ))),
    }
}

/// JSON number from f64; non-finite results become null.
pub(crate) fn num(n: f64) -> Value {
    crate::value::number_from_f64(n)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
