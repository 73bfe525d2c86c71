use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Columns maintained by the store rather than by field assignment.
pub const SYSTEM_COLUMNS: [&str; 3] = ["id", "created", "updated"];

pub fn is_system_column(name: &str) -> bool {
    SYSTEM_COLUMNS.contains(&name)
}

/// One stored row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRecord {
    /// Stable identifier, assigned once at insert time
    pub id: String,

    pub created: DateTime<Utc>,

    pub updated: DateTime<Utc>,

    /// User-defined columns only; system columns never appear here
    pub fields: Map<String, Value>,
}

impl DataRecord {
    /// Allocate a fresh, time-ordered record id
    pub fn generate_id() -> String {
        Uuid::new_v7(uuid::Timestamp::now(uuid::NoContext)).to_string()
    }

    /// Create a record with a specific id
    pub fn with_id(id: String, mut fields: Map<String, Value>) -> Self {
        let now = Utc::now();
        strip_system_columns(&mut fields);
        Self {
            id,
            created: now,
            updated: now,
            fields,
        }
    }

    /// Create a record with an auto-generated id
    pub fn new(fields: Map<String, Value>) -> Self {
        Self::with_id(Self::generate_id(), fields)
    }

    /// Merge changed columns into the record and bump `updated`
    pub fn apply(&mut self, changes: Map<String, Value>) {
        for (key, value) in changes {
            if !is_system_column(&key) {
                self.fields.insert(key, value);
            }
        }
        self.updated = Utc::now();
    }

    /// Read a column, system columns included
    pub fn get(&self, column: &str) -> Option<Value> {
        match column {
            "id" => Some(Value::String(self.id.clone())),
            "created" => Some(Value::String(self.created.to_rfc3339())),
            "updated" => Some(Value::String(self.updated.to_rfc3339())),
            _ => self.fields.get(column).cloned(),
        }
    }

    /// Flattened row: system columns first, then user fields
    pub fn to_row(&self) -> Value {
        let mut row = Map::with_capacity(self.fields.len() + SYSTEM_COLUMNS.len());
        row.insert("id".to_string(), Value::String(self.id.clone()));
        row.insert(
            "created".to_string(),
            Value::String(self.created.to_rfc3339()),
        );
        row.insert(
            "updated".to_string(),
            Value::String(self.updated.to_rfc3339()),
        );
        for (key, value) in &self.fields {
            row.insert(key.clone(), value.clone());
        }
        Value::Object(row)
    }
}

fn strip_system_columns(fields: &mut Map<String, Value>) {
    for column in SYSTEM_COLUMNS {
        fields.remove(column);
    }
}
