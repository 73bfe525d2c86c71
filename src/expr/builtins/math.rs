//! Math builtin functions.

use serde_json::Value;

use super::{check_arg_range, check_args, get_number, num};
use crate::error::{EngineError, EngineResult};

/// Call a math function. Returns None if function not found.
pub fn call(name: &str, args: &[Value]) -> EngineResult<Option<Value>> {
    let result = match name {
        "ABS" | "FLOOR" | "CEIL" | "CEILING" | "SQRT" => {
            check_args(name, args, 1)?;
            if args[0].is_null() {
                return Ok(Some(Value::Null));
            }
            let n = get_number(name, args, 0)?;
            let out = match name {
                "ABS" => n.abs(),
                "FLOOR" => n.floor(),
                "SQRT" => {
                    if n < 0.0 {
                        return Err(EngineError::Function(
                            "SQRT: argument must be non-negative".to_string(),
                        ));
                    }
                    n.sqrt()
                }
                _ => n.ceil(),
            };
            Some(num(out))
        }

        "ROUND" => {
            check_arg_range(name, args, 1, 2)?;
            if args[0].is_null() {
                return Ok(Some(Value::Null));
            }
            let n = get_number(name, args, 0)?;
            let digits = if args.len() == 2 {
                get_number(name, args, 1)? as i32
            } else {
                0
            };
            let multiplier = 10f64.powi(digits);
            Some(num((n * multiplier).round() / multiplier))
        }

        "POW" | "POWER" => {
            check_args(name, args, 2)?;
            if args[0].is_null() || args[1].is_null() {
                return Ok(Some(Value::Null));
            }
            let base = get_number(name, args, 0)?;
            let exp = get_number(name, args, 1)?;
            Some(num(base.powf(exp)))
        }

        "MIN" | "MAX" | "LEAST" | "GREATEST" => {
            if args.is_empty() {
                return Err(EngineError::Function(format!(
                    "{} expects at least 1 argument",
                    name
                )));
            }
            let mut best: Option<f64> = None;
            for (index, arg) in args.iter().enumerate() {
                if arg.is_null() {
                    continue;
                }
                let n = get_number(name, args, index)?;
                best = Some(match best {
                    None => n,
                    Some(b) if matches!(name, "MIN" | "LEAST") => b.min(n),
                    Some(b) => b.max(n),
                });
            }
            Some(best.map(num).unwrap_or(Value::Null))
        }

        _ => None,
    };

    Ok(result)
}
