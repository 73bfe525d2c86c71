//! Table state: the store that owns committed records.
//!
//! The engine only proposes mutations through `TableStore`. Every query context opens
//! its own stage with `begin()`; writes land in that stage and become durable only
//! through `commit(stage)`. `rollback(stage)` discards them without touching any other
//! stage.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{EngineError, EngineResult};
use crate::record::DataRecord;

/// Identifies one set of staged writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StageId(u64);

impl StageId {
    pub fn from_u64(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage:{}", self.0)
    }
}

/// Per-table record storage consumed by statements.
///
/// Reads take an optional stage: `None` sees committed records only, `Some(stage)` also
/// sees that stage's own writes. Each primitive is expected to be atomic on its own.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Open a new stage.
    fn begin(&self) -> StageId;

    /// Stage a new record under `id`.
    async fn add_insert(
        &self,
        stage: StageId,
        table: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> EngineResult<DataRecord>;

    /// Merge `fields` into the existing record `id`.
    async fn add_update(
        &self,
        stage: StageId,
        table: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> EngineResult<DataRecord>;

    async fn get(
        &self,
        stage: Option<StageId>,
        table: &str,
        id: &str,
    ) -> EngineResult<Option<DataRecord>>;

    /// All records of a table in insertion order, optionally truncated.
    async fn scan(
        &self,
        stage: Option<StageId>,
        table: &str,
        limit: Option<usize>,
    ) -> EngineResult<Vec<DataRecord>>;

    async fn exists(&self, stage: Option<StageId>, table: &str, id: &str) -> EngineResult<bool> {
        Ok(self.get(stage, table, id).await?.is_some())
    }

    /// Make the stage's writes durable. Returns the number of staged writes applied.
    async fn commit(&self, _stage: StageId) -> EngineResult<usize> {
        Ok(0)
    }

    /// Discard the stage's writes. Returns the number of staged writes dropped.
    async fn rollback(&self, _stage: StageId) -> EngineResult<usize> {
        Ok(0)
    }
}

#[derive(Debug, Clone, Default)]
struct Table {
    records: Vec<DataRecord>,
    index: HashMap<String, usize>,
}

impl Table {
    fn get(&self, id: &str) -> Option<&DataRecord> {
        self.index.get(id).map(|&pos| &self.records[pos])
    }

    fn push(&mut self, record: DataRecord) {
        self.index.insert(record.id.clone(), self.records.len());
        self.records.push(record);
    }

    /// Replace the record with the same id, or append it.
    fn upsert(&mut self, record: DataRecord) {
        match self.index.get(&record.id) {
            Some(&pos) => self.records[pos] = record,
            None => self.push(record),
        }
    }
}

/// Writes of one stage: the latest version of every touched record, per table.
#[derive(Debug, Default)]
struct Stage {
    tables: HashMap<String, Table>,
    writes: usize,
}

#[derive(Debug, Default)]
struct Inner {
    committed: HashMap<String, Table>,
    stages: HashMap<StageId, Stage>,
}

impl Inner {
    fn staged(&self, stage: Option<StageId>, table: &str) -> Option<&Table> {
        stage
            .and_then(|stage| self.stages.get(&stage))
            .and_then(|stage| stage.tables.get(table))
    }

    fn lookup(&self, stage: Option<StageId>, table: &str, id: &str) -> Option<&DataRecord> {
        self.staged(stage, table)
            .and_then(|t| t.get(id))
            .or_else(|| self.committed.get(table).and_then(|t| t.get(id)))
    }

    /// Committed records with the stage's versions laid over them, then the stage's
    /// new records.
    fn records(&self, stage: Option<StageId>, table: &str, limit: usize) -> Vec<DataRecord> {
        let staged = self.staged(stage, table);
        let committed = self.committed.get(table);

        let base = committed.into_iter().flat_map(|t| t.records.iter()).map(|record| {
            staged
                .and_then(|s| s.get(&record.id))
                .unwrap_or(record)
        });
        let added = staged
            .into_iter()
            .flat_map(|s| s.records.iter())
            .filter(|record| committed.map_or(true, |t| t.get(&record.id).is_none()));

        base.chain(added).take(limit).cloned().collect()
    }
}

/// In-memory `TableStore` with one overlay per stage.
///
/// A stage reads its own writes, so a statement sees the rows it just inserted. Other
/// stages only see them after `commit`. Concurrent commits touching the same record
/// resolve as last writer wins.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    next_stage: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load committed records directly, bypassing staging.
    pub fn load(&self, table: &str, records: Vec<DataRecord>) {
        let mut inner = self.inner.write();
        let target = inner.committed.entry(table.to_lowercase()).or_default();
        for record in records {
            target.push(record);
        }
    }

    /// Convenience for seeding: insert committed fields under a known id.
    pub fn seed(&self, table: &str, id: &str, fields: Value) {
        let fields = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.load(table, vec![DataRecord::with_id(id.to_string(), fields)]);
    }

    /// Whether any stage holds uncommitted writes.
    pub fn has_pending(&self) -> bool {
        self.inner.read().stages.values().any(|s| s.writes > 0)
    }

    /// Committed record count of a table, ignoring staged writes.
    pub fn committed_len(&self, table: &str) -> usize {
        self.inner
            .read()
            .committed
            .get(&table.to_lowercase())
            .map_or(0, |t| t.records.len())
    }
}

#[async_trait]
impl TableStore for MemoryStore {
    fn begin(&self) -> StageId {
        StageId(self.next_stage.fetch_add(1, Ordering::Relaxed) + 1)
    }

    async fn add_insert(
        &self,
        stage: StageId,
        table: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> EngineResult<DataRecord> {
        let table = table.to_lowercase();
        let mut inner = self.inner.write();
        if inner.lookup(Some(stage), &table, id).is_some() {
            return Err(EngineError::Storage(format!(
                "Record '{}' already exists in table '{}'",
                id, table
            )));
        }

        let record = DataRecord::with_id(id.to_string(), fields);
        let staged = inner.stages.entry(stage).or_default();
        staged.tables.entry(table.clone()).or_default().push(record.clone());
        staged.writes += 1;
        tracing::trace!(%stage, table = %table, id, "Staged insert");
        Ok(record)
    }

    async fn add_update(
        &self,
        stage: StageId,
        table: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> EngineResult<DataRecord> {
        let table = table.to_lowercase();
        let mut inner = self.inner.write();
        let mut record = inner
            .lookup(Some(stage), &table, id)
            .cloned()
            .ok_or_else(|| EngineError::RecordNotFound {
                table: table.clone(),
                id: id.to_string(),
            })?;
        record.apply(fields);

        let staged = inner.stages.entry(stage).or_default();
        staged.tables.entry(table.clone()).or_default().upsert(record.clone());
        staged.writes += 1;
        tracing::trace!(%stage, table = %table, id, "Staged update");
        Ok(record)
    }

    async fn get(
        &self,
        stage: Option<StageId>,
        table: &str,
        id: &str,
    ) -> EngineResult<Option<DataRecord>> {
        let inner = self.inner.read();
        Ok(inner.lookup(stage, &table.to_lowercase(), id).cloned())
    }

    async fn scan(
        &self,
        stage: Option<StageId>,
        table: &str,
        limit: Option<usize>,
    ) -> EngineResult<Vec<DataRecord>> {
        let inner = self.inner.read();
        Ok(inner.records(stage, &table.to_lowercase(), limit.unwrap_or(usize::MAX)))
    }

    async fn commit(&self, stage: StageId) -> EngineResult<usize> {
        let mut inner = self.inner.write();
        let staged = match inner.stages.remove(&stage) {
            Some(staged) => staged,
            None => return Ok(0),
        };
        for (table, writes) in staged.tables {
            let target = inner.committed.entry(table).or_default();
            for record in writes.records {
                target.upsert(record);
            }
        }
        Ok(staged.writes)
    }

    async fn rollback(&self, stage: StageId) -> EngineResult<usize> {
        let mut inner = self.inner.write();
        Ok(inner.stages.remove(&stage).map_or(0, |staged| staged.writes))
    }
}
