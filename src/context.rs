//! Per-query state.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::QueryValidationError;
use crate::schema::{Schema, TypeDef};
use crate::state::{StageId, TableStore};

/// Configuration for query execution limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryLimits {
    /// Maximum number of records scanned per source (default: 10,000)
    pub max_scan_rows: usize,
    /// Maximum LIKE pattern length in characters (default: 1000)
    pub max_like_pattern: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            max_scan_rows: 10_000,
            max_like_pattern: 1000,
        }
    }
}

/// State for one statement execution.
///
/// Created fresh for every top-level query and dropped afterwards. The schema is shared
/// read-only; aliases, errors and the stage holding this query's writes belong to this
/// query alone.
pub struct QueryContext {
    pub types: Arc<Schema>,
    /// Alias -> type name for every source bound by the current join.
    pub aliases: HashMap<String, String>,
    pub limits: QueryLimits,
    validation_errors: Vec<QueryValidationError>,
    store: Arc<dyn TableStore>,
    stage: StageId,
}

impl QueryContext {
    /// Opens a new stage on `store` for the writes of this query.
    pub fn new(types: Arc<Schema>, store: Arc<dyn TableStore>) -> Self {
        let stage = store.begin();
        Self {
            types,
            aliases: HashMap::new(),
            limits: QueryLimits::default(),
            validation_errors: Vec::new(),
            store,
            stage,
        }
    }

    pub fn with_limits(mut self, limits: QueryLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn store(&self) -> &Arc<dyn TableStore> {
        &self.store
    }

    pub fn stage(&self) -> StageId {
        self.stage
    }

    /// Resolve a source name to its type: aliases first, then type names.
    pub fn resolve_source(&self, source: &str) -> Option<&TypeDef> {
        match self.aliases.get(source) {
            Some(type_name) => self.types.get(type_name),
            None => self.types.get(source),
        }
    }

    /// Aliases bound to `type_name` in the current join, sorted.
    pub fn aliases_of(&self, type_name: &str) -> Vec<&str> {
        let mut aliases: Vec<&str> = self
            .aliases
            .iter()
            .filter(|(_, target)| target.as_str() == type_name)
            .map(|(alias, _)| alias.as_str())
            .collect();
        aliases.sort_unstable();
        aliases
    }

    /// Whether rows currently being evaluated are joined pseudo-records.
    pub fn in_join(&self) -> bool {
        !self.aliases.is_empty()
    }

    pub fn report(&mut self, error: QueryValidationError) {
        tracing::debug!(path = %error.path, message = %error.message, "Validation error");
        self.validation_errors.push(error);
    }

    /// Report unless an identical error is already recorded.
    pub fn report_once(&mut self, error: QueryValidationError) {
        if !self.validation_errors.contains(&error) {
            self.report(error);
        }
    }

    /// Prefix the path of every error reported since `since` with `prefix`.
    ///
    /// Errors that become identical to one already recorded are dropped, so a predicate
    /// evaluated once per row reports a broken column once.
    pub fn scope_errors(&mut self, since: usize, prefix: &str) {
        if since >= self.validation_errors.len() {
            return;
        }
        let scoped: Vec<QueryValidationError> = self.validation_errors.drain(since..).collect();
        for mut error in scoped {
            error.path = if error.path.is_empty() {
                prefix.to_string()
            } else {
                format!("{}.{}", prefix, error.path)
            };
            if !self.validation_errors.contains(&error) {
                self.validation_errors.push(error);
            }
        }
    }

    pub fn validation_errors(&self) -> &[QueryValidationError] {
        &self.validation_errors
    }

    pub fn has_errors(&self) -> bool {
        !self.validation_errors.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.validation_errors.len()
    }

    pub fn take_errors(&mut self) -> Vec<QueryValidationError> {
        std::mem::take(&mut self.validation_errors)
    }
}
