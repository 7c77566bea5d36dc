//! In-memory record store

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::api::StoreProvider;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::{Fields, ListQuery, Record, RecordStore};

/// Record store backed by a map of tables.
///
/// Formulas are ignored: a filtered list answers the whole table, so callers
/// must re-check matches themselves exactly as they do against the real
/// store. Tables and single records can be set to fail with an upstream
/// status.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<Record>>>,
    failing_tables: HashMap<String, u16>,
    failing_updates: HashSet<String>,
    next_id: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: &str, records: Vec<Record>) -> Self {
        self.tables
            .get_mut()
            .entry(table.to_string())
            .or_default()
            .extend(records);
        self
    }

    /// Every call touching `table` answers `status`.
    pub fn failing_table(mut self, table: &str, status: u16) -> Self {
        self.failing_tables.insert(table.to_string(), status);
        self
    }

    /// Updates of record `id` answer 422.
    pub fn failing_update(mut self, id: &str) -> Self {
        self.failing_updates.insert(id.to_string());
        self
    }

    pub async fn records(&self, table: &str) -> Vec<Record> {
        self.tables
            .lock()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Calls in the order they were made, as `"<op> <table>"`.
    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    async fn enter(&self, op: &str, table: &str) -> Result<()> {
        self.calls.lock().await.push(format!("{op} {table}"));
        match self.failing_tables.get(table) {
            Some(&status) => Err(Error::Upstream {
                status,
                table: table.to_string(),
                payload: json!({ "error": "SIMULATED_FAILURE" }),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn list(&self, table: &str, query: &ListQuery) -> Result<Vec<Record>> {
        self.enter("list", table).await?;
        let mut records = self.records(table).await;
        if let Some(max) = query.max_records {
            records.truncate(max);
        }
        Ok(records)
    }

    async fn get(&self, table: &str, id: &str) -> Result<Record> {
        self.enter("get", table).await?;
        self.tables
            .lock()
            .await
            .get(table)
            .and_then(|records| records.iter().find(|r| r.id == id))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("{table} record {id}")))
    }

    async fn create(&self, table: &str, records: Vec<Fields>) -> Result<Vec<Record>> {
        self.enter("create", table).await?;
        let created: Vec<Record> = records
            .into_iter()
            .map(|fields| {
                let n = self.next_id.fetch_add(1, Ordering::SeqCst);
                Record {
                    id: format!("recNEW{n:04}"),
                    created_time: Some(Utc::now().to_rfc3339()),
                    fields,
                }
            })
            .collect();
        self.tables
            .lock()
            .await
            .entry(table.to_string())
            .or_default()
            .extend(created.iter().cloned());
        Ok(created)
    }

    async fn update(&self, table: &str, id: &str, fields: Fields) -> Result<Record> {
        self.enter("update", table).await?;
        if self.failing_updates.contains(id) {
            return Err(Error::Upstream {
                status: 422,
                table: table.to_string(),
                payload: json!({ "error": "INVALID_VALUE_FOR_COLUMN" }),
            });
        }

        let mut tables = self.tables.lock().await;
        let record = tables
            .get_mut(table)
            .and_then(|records| records.iter_mut().find(|r| r.id == id))
            .ok_or_else(|| Error::NotFound(format!("{table} record {id}")))?;
        record.fields.extend(fields);
        Ok(record.clone())
    }
}

/// Hands every request the same store.
pub struct StaticStoreProvider {
    store: Arc<dyn RecordStore>,
}

impl StaticStoreProvider {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

impl StoreProvider for StaticStoreProvider {
    fn store(&self, _config: &Config) -> Result<Arc<dyn RecordStore>> {
        Ok(self.store.clone())
    }
}
