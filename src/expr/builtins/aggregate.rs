//! Aggregate functions over the records of one group.

use std::cmp::Ordering;

use serde_json::Value;

use super::{num, type_name};
use crate::error::{EngineError, EngineResult};

/// Whether a call with this name and arity aggregates over a group.
///
/// `MIN` / `MAX` with several arguments are the scalar variants.
pub fn is_aggregate(name: &str, arity: usize) -> bool {
    match name.to_uppercase().as_str() {
        "COUNT" | "SUM" | "AVG" => true,
        "MIN" | "MAX" => arity == 1,
        _ => false,
    }
}

/// `values` holds the argument evaluated once per group record; nulls are ignored
/// except by `COUNT(*)`, which counts the group itself.
pub fn call(name: &str, values: &[Value], group_size: usize) -> EngineResult<Value> {
    match name {
        "COUNT" => {
            if values.len() == group_size && values.iter().all(|v| v == "*") {
                return Ok(Value::from(group_size));
            }
            Ok(Value::from(values.iter().filter(|v| !v.is_null()).count()))
        }

        "SUM" | "AVG" => {
            let mut sum = 0.0;
            let mut count = 0usize;
            for value in values.iter().filter(|v| !v.is_null()) {
                match value.as_f64() {
                    Some(n) => {
                        sum += n;
                        count += 1;
                    }
                    None => {
                        return Err(EngineError::Function(format!(
                            "{} expects numeric values, got {}",
                            name,
                            type_name(value)
                        )))
                    }
                }
            }
            if count == 0 {
                return Ok(Value::Null);
            }
            if name == "SUM" {
                Ok(num(sum))
            } else {
                Ok(num(sum / count as f64))
            }
        }

        "MIN" | "MAX" => {
            let mut best: Option<&Value> = None;
            for value in values.iter().filter(|v| !v.is_null()) {
                best = Some(match best {
                    None => value,
                    Some(current) => {
                        if type_name(current) != type_name(value) {
                            return Err(EngineError::Function(format!(
                                "{} cannot compare {} with {}",
                                name,
                                type_name(current),
                                type_name(value)
                            )));
                        }
                        let ordering = crate::value::Value::from(value.clone())
                            .compare_to(&crate::value::Value::from(current.clone()));
                        let replace = if name == "MIN" {
                            ordering == Ordering::Less
                        } else {
                            ordering == Ordering::Greater
                        };
                        if replace {
                            value
                        } else {
                            current
                        }
                    }
                });
            }
            Ok(best.cloned().unwrap_or(Value::Null))
        }

        _ => Err(EngineError::Function(format!(
            "Unknown aggregate function: {}",
            name
        ))),
    }
}
