//! Remote record store access.
//!
//! The store holds named tables of records; each record has a stable id and a
//! free-form map of field name to JSON value. [`RecordStore`] is the seam the
//! rest of the crate fetches through, so joins and handlers can be driven by
//! the HTTP client in production and by an in-memory store in tests.

pub mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

pub use client::HttpRecordStore;

pub const TRAININGS: &str = "Trainings";
pub const SESSIONS: &str = "Sessions";
pub const PARTICIPATIONS: &str = "Participations";
pub const QUESTIONS: &str = "Questions";

/// Field name to value mapping as stored remotely.
pub type Fields = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(rename = "createdTime", default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
    #[serde(default)]
    pub fields: Fields,
}

impl Record {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            created_time: None,
            fields,
        }
    }
}

/// Options for listing a table.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// Store-side formula filter. Only used where the formula cannot be
    /// defeated by field-name drift; joins always filter client-side.
    pub filter_formula: Option<String>,
    pub max_records: Option<usize>,
}

impl ListQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_formula(formula: impl Into<String>) -> Self {
        Self {
            filter_formula: Some(formula.into()),
            max_records: None,
        }
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch every record of `table` matching `query`, following pagination
    /// until the store stops returning a continuation cursor.
    async fn list(&self, table: &str, query: &ListQuery) -> Result<Vec<Record>>;

    async fn get(&self, table: &str, id: &str) -> Result<Record>;

    /// Create records; the store answers with the created records in order.
    async fn create(&self, table: &str, records: Vec<Fields>) -> Result<Vec<Record>>;

    /// Patch the given fields of one record, leaving the others untouched.
    async fn update(&self, table: &str, id: &str, fields: Fields) -> Result<Record>;

    async fn list_all(&self, table: &str) -> Result<Vec<Record>> {
        self.list(table, &ListQuery::all()).await
    }
}
