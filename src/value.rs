//! Runtime values and their type rules.
//!
//! A `Value` wraps one evaluated JSON scalar (or null) plus, optionally, the column it
//! was read from. Its type is always derived from the JSON shape; the attached field is
//! only used as context when the value is checked against a *target* field.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{json, Value as Json};

use crate::context::QueryContext;
use crate::error::QueryValidationError;
use crate::schema::{FieldType, TypeField};

/// Runtime type of a value, computed from its JSON shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Null,
    Number,
    String,
    Boolean,
    Array,
    Object,
}

impl TypeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeKind::Null => "null",
            TypeKind::Number => "number",
            TypeKind::String => "string",
            TypeKind::Boolean => "boolean",
            TypeKind::Array => "array",
            TypeKind::Object => "object",
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Create a serde_json::Number from an f64, or `None` for NaN / infinity.
#[inline]
pub fn number_from_f64(n: f64) -> Option<serde_json::Number> {
    if n.fract() == 0.0 && n.abs() < (i64::MAX as f64) {
        Some(serde_json::Number::from(n as i64))
    } else {
        serde_json::Number::from_f64(n)
    }
}

/// Transient evaluation result.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Value {
    value: Json,
    field: Option<TypeField>,
    type_name: Option<String>,
}

impl Value {
    pub fn new(value: Json) -> Self {
        Self {
            value,
            field: None,
            type_name: None,
        }
    }

    pub fn null() -> Self {
        Self::new(Json::Null)
    }

    pub fn bool(b: bool) -> Self {
        Self::new(Json::Bool(b))
    }

    /// Numeric value; NaN and infinities become null.
    pub fn number(n: f64) -> Self {
        match number_from_f64(n) {
            Some(num) => Self::new(Json::Number(num)),
            None => Self::null(),
        }
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self::new(Json::String(s.into()))
    }

    /// Attach the column this value was read from.
    pub fn with_source(mut self, type_name: &str, field: Option<&TypeField>) -> Self {
        self.type_name = Some(type_name.to_string());
        self.field = field.cloned();
        self
    }

    pub fn raw(&self) -> &Json {
        &self.value
    }

    pub fn into_raw(self) -> Json {
        self.value
    }

    pub fn field(&self) -> Option<&TypeField> {
        self.field.as_ref()
    }

    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    pub fn get_type(&self) -> TypeKind {
        match &self.value {
            Json::Null => TypeKind::Null,
            Json::Bool(_) => TypeKind::Boolean,
            Json::Number(_) => TypeKind::Number,
            Json::String(_) => TypeKind::String,
            Json::Array(_) => TypeKind::Array,
            Json::Object(_) => TypeKind::Object,
        }
    }

    /// Best-effort numeric coercion. Anything that is not a number yields NaN.
    pub fn to_number(&self) -> f64 {
        match &self.value {
            Json::Number(n) => n.as_f64().unwrap_or(f64::NAN),
            Json::String(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
            Json::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            _ => f64::NAN,
        }
    }

    /// Best-effort string coercion. Null becomes the empty string.
    pub fn to_text(&self) -> String {
        match &self.value {
            Json::Null => String::new(),
            Json::String(s) => s.clone(),
            Json::Bool(b) => b.to_string(),
            Json::Number(n) => match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
                _ => n.to_string(),
            },
            other => other.to_string(),
        }
    }

    pub fn to_bool(&self) -> bool {
        match &self.value {
            Json::Bool(b) => *b,
            Json::Null => false,
            Json::Number(n) => n.as_f64().unwrap_or(0.0) != 0.0,
            Json::String(s) => !s.is_empty(),
            Json::Array(a) => !a.is_empty(),
            Json::Object(o) => !o.is_empty(),
        }
    }

    /// Check whether this value may be written into `field`.
    ///
    /// Rules apply in order: required, enum membership, structural type, then foreign
    /// key existence (the only step that reads the store). The returned error carries an
    /// empty path; callers stamp the precise location.
    pub async fn is_assignable_to(
        &self,
        field: &TypeField,
        ctx: &QueryContext,
    ) -> Result<(), QueryValidationError> {
        if self.is_null() {
            if field.nullable {
                return Ok(());
            }
            return Err(QueryValidationError::new(
                "",
                format!("Field '{}' is required and cannot be null", field.name),
            )
            .with_types(field.field_type.as_str(), TypeKind::Null.as_str()));
        }

        if field.field_type == FieldType::Enum {
            let allowed = field.enum_values.as_deref().unwrap_or(&[]);
            let text = self.to_text();
            if allowed.iter().any(|v| *v == text) {
                return Ok(());
            }
            return Err(QueryValidationError::new(
                "",
                format!("Invalid value '{}' for enum field '{}'", text, field.name),
            )
            .with_suggestion(format!("Allowed values: {}", allowed.join(", ")))
            .with_metadata(json!({ "allowedValues": allowed })));
        }

        let kind = self.get_type();
        let structural = match field.field_type {
            FieldType::String => kind == TypeKind::String,
            FieldType::Number => kind == TypeKind::Number,
            FieldType::Boolean => kind == TypeKind::Boolean,
            FieldType::Date => match &self.value {
                Json::Number(_) => true,
                Json::String(s) => parse_date(s).is_some(),
                _ => false,
            },
            FieldType::Reference => matches!(kind, TypeKind::String | TypeKind::Number),
            FieldType::Json | FieldType::Enum => true,
        };
        if !structural {
            let message = if field.field_type == FieldType::Date && kind == TypeKind::String {
                format!("Invalid date '{}' for field '{}'", self.to_text(), field.name)
            } else {
                format!(
                    "Type mismatch for field '{}': expected {}, got {}",
                    field.name, field.field_type, kind
                )
            };
            return Err(QueryValidationError::new("", message)
                .with_types(field.field_type.as_str(), kind.as_str()));
        }

        if field.field_type == FieldType::Reference {
            return self.check_reference(field, ctx).await;
        }

        Ok(())
    }

    async fn check_reference(
        &self,
        field: &TypeField,
        ctx: &QueryContext,
    ) -> Result<(), QueryValidationError> {
        let target = match &field.referenced_type {
            Some(target) => target,
            None => {
                return Err(QueryValidationError::new(
                    "",
                    format!("Reference field '{}' has no referenced type", field.name),
                ))
            }
        };
        let id = self.to_text();
        match ctx.store().exists(Some(ctx.stage()), target, &id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(QueryValidationError::new(
                "",
                format!("Referenced record '{}' not found in '{}'", id, target),
            )
            .with_suggestion(format!("Insert the '{}' record first", target))
            .with_metadata(json!({ "referencedType": target, "id": id }))),
            Err(e) => Err(QueryValidationError::new(
                "",
                format!("Could not verify reference '{}' in '{}': {}", id, target, e),
            )),
        }
    }

    /// Values are comparable when their runtime types match. Null handling is the
    /// caller's concern.
    pub fn is_comparable_with(&self, other: &Value, operator: &str) -> Result<(), String> {
        let (left, right) = (self.get_type(), other.get_type());
        if left == right {
            Ok(())
        } else {
            Err(format!(
                "Cannot compare {} with {} using '{}'",
                left, right, operator
            ))
        }
    }

    /// Total order over two values of the same runtime type.
    pub fn compare_to(&self, other: &Value) -> Ordering {
        match (&self.value, &other.value) {
            (Json::Number(a), Json::Number(b)) => {
                let a = a.as_f64().unwrap_or(0.0);
                let b = b.as_f64().unwrap_or(0.0);
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            }
            (Json::String(a), Json::String(b)) => a.cmp(b),
            (Json::Bool(a), Json::Bool(b)) => a.cmp(b),
            _ => self.to_text().cmp(&other.to_text()),
        }
    }
}

impl From<Json> for Value {
    fn from(value: Json) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// Parse the date formats accepted by `date` fields.
pub fn parse_date(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
