//! DateTime builtin functions.

use chrono::{DateTime, Datelike, NaiveDateTime, Timelike, Utc};
use serde_json::Value;

use super::{check_args, get_string, type_name};
use crate::error::{EngineError, EngineResult};
use crate::value::parse_date;

/// Call a datetime function. Returns None if function not found.
pub fn call(name: &str, args: &[Value]) -> EngineResult<Option<Value>> {
    let result = match name {
        "NOW" => {
            check_args(name, args, 0)?;
            Some(Value::String(Utc::now().to_rfc3339()))
        }

        "DATE_PART" => {
            check_args(name, args, 2)?;
            if args[1].is_null() {
                return Ok(Some(Value::Null));
            }
            let part = get_string(name, args, 0)?.to_lowercase();
            let dt = parse_datetime(name, &args[1])?;
            let n: i64 = match part.as_str() {
                "year" => dt.year() as i64,
                "month" => dt.month() as i64,
                "day" => dt.day() as i64,
                "hour" => dt.hour() as i64,
                "minute" => dt.minute() as i64,
                "second" => dt.second() as i64,
                // 0 = Sunday, 6 = Saturday
                "dow" => dt.weekday().num_days_from_sunday() as i64,
                "doy" => dt.ordinal() as i64,
                "epoch" => dt.and_utc().timestamp_millis(),
                other => {
                    return Err(EngineError::Function(format!(
                        "DATE_PART: unknown part '{}' (expected year, month, day, hour, minute, second, dow, doy or epoch)",
                        other
                    )))
                }
            };
            Some(Value::from(n))
        }

        _ => None,
    };

    Ok(result)
}

/// Accept the same shapes as `date` fields: date strings or epoch milliseconds.
fn parse_datetime(name: &str, value: &Value) -> EngineResult<NaiveDateTime> {
    match value {
        Value::String(s) => parse_date(s)
            .ok_or_else(|| EngineError::Function(format!("{}: invalid date '{}'", name, s))),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|dt| dt.naive_utc())
            .ok_or_else(|| EngineError::Function(format!("{}: invalid timestamp {}", name, n))),
        other => Err(EngineError::Function(format!(
            "{}: argument 2 must be a date, got {}",
            name,
            type_name(other)
        ))),
    }
}
