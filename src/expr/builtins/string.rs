//! String builtin functions.

use serde_json::Value;

use super::{check_arg_range, check_args, get_number, get_string, type_name};
use crate::error::{EngineError, EngineResult};

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(crate::value::Value::from(other.clone()).to_text()),
    }
}

/// Call a string function. Returns None if function not found.
pub fn call(name: &str, args: &[Value]) -> EngineResult<Option<Value>> {
    let result = match name {
        "CONCAT" => {
            if args.is_empty() {
                return Err(EngineError::Function(
                    "CONCAT expects at least 1 argument".to_string(),
                ));
            }
            let result: String = args.iter().filter_map(text_of).collect();
            Some(Value::String(result))
        }

        "SUBSTRING" | "SUBSTR" => {
            check_arg_range(name, args, 2, 3)?;
            if args[0].is_null() {
                return Ok(Some(Value::Null));
            }
            let s = get_string(name, args, 0)?;
            let start = get_number(name, args, 1)?;
            let len = if args.len() == 3 {
                let len = get_number(name, args, 2)?;
                if len < 0.0 {
                    return Err(EngineError::Function(
                        "SUBSTRING: length must be non-negative".to_string(),
                    ));
                }
                Some(len as usize)
            } else {
                None
            };

            // 1-based start; positions before the string clamp to its beginning
            let skip = if start < 1.0 { 0 } else { start as usize - 1 };
            let chars = s.chars().skip(skip);
            let result: String = match len {
                Some(len) => chars.take(len).collect(),
                None => chars.collect(),
            };
            Some(Value::String(result))
        }

        "UPPER" | "LOWER" | "TRIM" => {
            check_args(name, args, 1)?;
            if args[0].is_null() {
                return Ok(Some(Value::Null));
            }
            let s = get_string(name, args, 0)?;
            Some(Value::String(match name {
                "UPPER" => s.to_uppercase(),
                "LOWER" => s.to_lowercase(),
                _ => s.trim().to_string(),
            }))
        }

        "LENGTH" => {
            check_args(name, args, 1)?;
            match &args[0] {
                Value::Null => Some(Value::Null),
                Value::String(s) => Some(Value::from(s.chars().count())),
                Value::Array(arr) => Some(Value::from(arr.len())),
                other => {
                    return Err(EngineError::Function(format!(
                        "LENGTH: argument 1 must be a string or array, got {}",
                        type_name(other)
                    )))
                }
            }
        }

        "REPLACE" => {
            check_args(name, args, 3)?;
            if args[0].is_null() {
                return Ok(Some(Value::Null));
            }
            let s = get_string(name, args, 0)?;
            let search = get_string(name, args, 1)?;
            let replace = get_string(name, args, 2)?;
            Some(Value::String(s.replace(search, replace)))
        }

        "STARTS_WITH" | "ENDS_WITH" | "CONTAINS" => {
            check_args(name, args, 2)?;
            if args[0].is_null() || args[1].is_null() {
                return Ok(Some(Value::Null));
            }
            let s = get_string(name, args, 0)?;
            let needle = get_string(name, args, 1)?;
            Some(Value::Bool(match name {
                "STARTS_WITH" => s.starts_with(needle),
                "ENDS_WITH" => s.ends_with(needle),
                _ => s.contains(needle),
            }))
        }

        _ => None,
    };

    Ok(result)
}
