use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::alert::SentLedger;
use crate::error::Result;

/// Ledger kept in memory only.
#[derive(Default)]
pub struct MemoryLedger {
    sent: Mutex<HashMap<(String, String), NaiveDate>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn recorded(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl SentLedger for MemoryLedger {
    async fn last_sent(&self, training_id: &str, recipient: &str) -> Result<Option<NaiveDate>> {
        let key = (training_id.to_string(), recipient.to_lowercase());
        Ok(self.sent.lock().await.get(&key).copied())
    }

    async fn claim(&self, training_id: &str, recipient: &str, date: NaiveDate) -> Result<bool> {
        let key = (training_id.to_string(), recipient.to_lowercase());
        let mut sent = self.sent.lock().await;
        if sent.get(&key).is_some_and(|last| *last >= date) {
            return Ok(false);
        }
        sent.insert(key, date);
        Ok(true)
    }

    async fn release(&self, training_id: &str, recipient: &str, date: NaiveDate) -> Result<()> {
        let key = (training_id.to_string(), recipient.to_lowercase());
        let mut sent = self.sent.lock().await;
        if sent.get(&key) == Some(&date) {
            sent.remove(&key);
        }
        Ok(())
    }
}
