//! Type and null handling builtin functions.

use serde_json::Value;

use super::{check_args, type_name};
use crate::error::{EngineError, EngineResult};

/// Call a type checking function. Returns None if function not found.
pub fn call(name: &str, args: &[Value]) -> EngineResult<Option<Value>> {
    let result = match name {
        "COALESCE" | "IFNULL" => {
            if args.is_empty() {
                return Err(EngineError::Function(format!(
                    "{} expects at least 1 argument",
                    name
                )));
            }
            Some(
                args.iter()
                    .find(|v| !v.is_null())
                    .cloned()
                    .unwrap_or(Value::Null),
            )
        }

        "TYPEOF" | "TYPENAME" => {
            check_args(name, args, 1)?;
            Some(Value::String(type_name(&args[0]).to_string()))
        }

        "IS_NULL" => {
            check_args(name, args, 1)?;
            Some(Value::Bool(args[0].is_null()))
        }

        _ => None,
    };

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coalesce() {
        assert_eq!(
            call("COALESCE", &[Value::Null, json!(2), json!(3)]).unwrap(),
            Some(json!(2))
        );
        assert_eq!(call("COALESCE", &[Value::Null]).unwrap(), Some(Value::Null));
        assert!(call("COALESCE", &[]).is_err());
    }

    #[test]
    fn test_typeof_and_is_null() {
        assert_eq!(call("TYPEOF", &[json!(1.5)]).unwrap(), Some(json!("number")));
        assert_eq!(call("TYPEOF", &[json!({})]).unwrap(), Some(json!("object")));
        assert_eq!(call("IS_NULL", &[Value::Null]).unwrap(), Some(json!(true)));
        assert!(call("IS_NULL", &[]).is_err());
    }
}
