//! Engine configuration loaded from TOML.
//!
//! ```toml
//! log_filter = "docql=debug"
//! schema_path = "schema.toml"
//!
//! [limits]
//! max_scan_rows = 50000
//!
//! [[types]]
//! name = "teams"
//! [[types.fields]]
//! name = "title"
//! type = "string"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::context::QueryLimits;
use crate::error::{EngineError, EngineResult};
use crate::schema::{Schema, TypeDef};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "DOCQL_CONFIG";

pub const DEFAULT_LOG_FILTER: &str = "docql=info";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub limits: QueryLimits,
    pub log_filter: String,
    /// Separate schema file; relative paths resolve against the config file's directory
    pub schema_path: Option<PathBuf>,
    /// Inline types. They replace same-named types from `schema_path`.
    pub types: Vec<TypeDef>,
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: QueryLimits::default(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            schema_path: None,
            types: Vec::new(),
            base_dir: None,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(source: &str) -> EngineResult<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("Cannot read '{}': {}", path.display(), e))
        })?;
        let mut config = Self::from_toml_str(&source)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Load from the file named by `DOCQL_CONFIG`, or defaults when it is unset.
    pub fn from_env() -> EngineResult<Self> {
        match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.is_empty() => Self::from_file(path),
            _ => Ok(Self::default()),
        }
    }

    /// Resolved location of the schema file, if one is configured.
    pub fn schema_file(&self) -> Option<PathBuf> {
        let path = self.schema_path.as_ref()?;
        match &self.base_dir {
            Some(base) if path.is_relative() => Some(base.join(path)),
            _ => Some(path.clone()),
        }
    }

    /// Types from `schema_path` merged with the inline types.
    pub fn schema(&self) -> EngineResult<Schema> {
        let mut schema = match self.schema_file() {
            Some(path) => Schema::from_file(&path)?,
            None => Schema::new(),
        };
        schema.extend(Schema::from_types(self.types.clone()));
        if schema.is_empty() {
            return Err(EngineError::Config("No types configured".to_string()));
        }
        Ok(schema)
    }
}
