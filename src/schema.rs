//! Type definitions (tables) and their fields.
//!
//! A `Schema` is loaded once, wrapped in an `Arc`, and shared read-only by every query.
//! Type and field names are stored lower-cased; lookups lower-case the probe as well.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::record::SYSTEM_COLUMNS;

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    /// RFC 3339 / `YYYY-MM-DD` string, or epoch milliseconds.
    Date,
    Enum,
    /// Foreign key holding the id of a record in `referenced_type`.
    Reference,
    /// Any non-null JSON value.
    Json,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Enum => "enum",
            FieldType::Reference => "reference",
            FieldType::Json => "json",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_nullable() -> bool {
    true
}

/// Schema for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referenced_type: Option<String>,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

impl TypeField {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_lowercase(),
            field_type,
            enum_values: None,
            referenced_type: None,
            nullable: true,
        }
    }

    pub fn enumeration(name: &str, values: &[&str]) -> Self {
        let mut field = Self::new(name, FieldType::Enum);
        field.enum_values = Some(values.iter().map(|v| v.to_string()).collect());
        field
    }

    pub fn reference(name: &str, referenced_type: &str) -> Self {
        let mut field = Self::new(name, FieldType::Reference);
        field.referenced_type = Some(referenced_type.to_lowercase());
        field
    }

    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    fn normalize(&mut self) {
        self.name = self.name.to_lowercase();
        if let Some(referenced) = &mut self.referenced_type {
            *referenced = referenced.to_lowercase();
        }
    }
}

/// Schema for one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: String,
    #[serde(default)]
    pub friendly_name: String,
    #[serde(default)]
    pub fields: Vec<TypeField>,
}

impl TypeDef {
    pub fn new(name: &str, fields: Vec<TypeField>) -> Self {
        let mut def = Self {
            name: name.to_string(),
            friendly_name: name.to_string(),
            fields,
        };
        def.normalize();
        def
    }

    pub fn with_friendly_name(mut self, friendly_name: &str) -> Self {
        self.friendly_name = friendly_name.to_string();
        self
    }

    /// Find a field by name, case-insensitively.
    pub fn field(&self, name: &str) -> Option<&TypeField> {
        let name = name.to_lowercase();
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Comma separated column list used in error suggestions.
    pub fn available_columns(&self) -> String {
        self.field_names().join(", ")
    }

    fn normalize(&mut self) {
        self.name = self.name.to_lowercase();
        if self.friendly_name.is_empty() {
            self.friendly_name = self.name.clone();
        }
        for field in &mut self.fields {
            field.normalize();
        }
    }
}

/// A structural problem in a loaded schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaIssue {
    pub type_name: String,
    pub field: Option<String>,
    pub message: String,
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}.{}: {}", self.type_name, field, self.message),
            None => write!(f, "{}: {}", self.type_name, self.message),
        }
    }
}

#[derive(Deserialize)]
struct SchemaFile {
    #[serde(default)]
    types: Vec<TypeDef>,
}

/// Registry of type definitions keyed by lower-case type name.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    types: BTreeMap<String, TypeDef>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_types(types: impl IntoIterator<Item = TypeDef>) -> Self {
        let mut schema = Self::new();
        for def in types {
            schema.insert(def);
        }
        schema
    }

    pub fn insert(&mut self, mut def: TypeDef) {
        def.normalize();
        self.types.insert(def.name.clone(), def);
    }

    pub fn get(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(&name.to_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(|k| k.as_str())
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Merge another schema into this one. Types in `other` replace same-named types.
    pub fn extend(&mut self, other: Schema) {
        for (_, def) in other.types {
            self.insert(def);
        }
    }

    pub fn from_toml_str(source: &str) -> EngineResult<Self> {
        let file: SchemaFile = toml::from_str(source)?;
        Ok(Self::from_types(file.types))
    }

    pub fn from_json_str(source: &str) -> EngineResult<Self> {
        let file: SchemaFile = serde_json::from_str(source)?;
        Ok(Self::from_types(file.types))
    }

    /// Load a schema file; `.json` files are read as JSON, anything else as TOML.
    pub fn from_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        let schema = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&source)?,
            _ => Self::from_toml_str(&source)?,
        };
        tracing::debug!(path = %path.display(), types = schema.len(), "Loaded schema");
        Ok(schema)
    }

    /// Structural checks that loading alone does not enforce.
    pub fn lint(&self) -> Vec<SchemaIssue> {
        let mut issues = Vec::new();

        for def in self.types.values() {
            let issue = |field: Option<&str>, message: String| SchemaIssue {
                type_name: def.name.clone(),
                field: field.map(|f| f.to_string()),
                message,
            };

            let mut seen = std::collections::HashSet::new();
            for field in &def.fields {
                if !seen.insert(field.name.as_str()) {
                    issues.push(issue(Some(&field.name), "Duplicate field name".to_string()));
                }
                if SYSTEM_COLUMNS.contains(&field.name.as_str()) {
                    issues.push(issue(
                        Some(&field.name),
                        "Field shadows a system column".to_string(),
                    ));
                }
                match field.field_type {
                    FieldType::Enum => {
                        if field.enum_values.as_ref().map_or(true, |v| v.is_empty()) {
                            issues.push(issue(
                                Some(&field.name),
                                "Enum field has no allowed values".to_string(),
                            ));
                        }
                    }
                    FieldType::Reference => match &field.referenced_type {
                        None => issues.push(issue(
                            Some(&field.name),
                            "Reference field has no referenced_type".to_string(),
                        )),
                        Some(target) if !self.types.contains_key(target) => {
                            issues.push(issue(
                                Some(&field.name),
                                format!("References unknown type '{}'", target),
                            ))
                        }
                        _ => {}
                    },
                    _ => {}
                }
            }
        }

        issues
    }

    /// Fail with the first lint issue, if any.
    pub fn validate(&self) -> EngineResult<()> {
        match self.lint().into_iter().next() {
            Some(issue) => Err(EngineError::Schema(issue.to_string())),
            None => Ok(()),
        }
    }
}
