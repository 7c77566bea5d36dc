//! Last-sent dates per (training, recipient).
//!
//! A pair is claimed before its mail goes out and released again when the
//! send fails, so overlapping runs never both send to the same pair on the
//! same day.

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};

#[async_trait]
pub trait SentLedger: Send + Sync {
    async fn last_sent(&self, training_id: &str, recipient: &str) -> Result<Option<NaiveDate>>;

    /// Mark the pair as sent on `date`. Returns `false` when it already was,
    /// in which case the caller must not send.
    async fn claim(&self, training_id: &str, recipient: &str, date: NaiveDate) -> Result<bool>;

    /// Undo a claim for `date` whose send failed.
    async fn release(&self, training_id: &str, recipient: &str, date: NaiveDate) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    version: u32,
    /// Keyed by training id, then lowercased recipient address.
    sent: BTreeMap<String, BTreeMap<String, NaiveDate>>,
}

impl LedgerFile {
    fn get(&self, training_id: &str, recipient: &str) -> Option<NaiveDate> {
        self.sent
            .get(training_id)
            .and_then(|by_recipient| by_recipient.get(&recipient.to_lowercase()))
            .copied()
    }

    /// Drop entries sent before `cutoff` and trainings left without any.
    fn prune(&mut self, cutoff: NaiveDate) {
        for by_recipient in self.sent.values_mut() {
            by_recipient.retain(|_, sent| *sent >= cutoff);
        }
        self.sent.retain(|_, by_recipient| !by_recipient.is_empty());
    }
}

const LOCK_TIMEOUT: Duration = Duration::from_secs(10);
const LOCK_RETRY: Duration = Duration::from_millis(25);
/// A lock file older than this belongs to a process that died holding it.
const LOCK_STALE_AFTER: Duration = Duration::from_secs(60);

/// Removes the lock file when dropped.
struct LockFileGuard {
    path: PathBuf,
}

impl Drop for LockFileGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "could not remove ledger lock");
            }
        }
    }
}

/// Ledger persisted as a JSON document shared by every process that sends
/// alerts. Each operation takes a `<file>.lock` file created exclusively,
/// re-reads the document, and rewrites it through a temp file and a rename so
/// a crash never leaves half a ledger.
pub struct JsonFileLedger {
    path: PathBuf,
    retain_days: u64,
    local: Mutex<()>,
}

impl JsonFileLedger {
    /// Open the ledger at `path`. A missing file reads as empty; a corrupt
    /// one is an error.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let ledger = Self {
            path: path.into(),
            retain_days: 7,
            local: Mutex::new(()),
        };
        ledger.read().await?;
        debug!(path = %ledger.path.display(), "opened alert ledger");
        Ok(ledger)
    }

    /// Keep entries for `days` before the day being written. Only same-day
    /// entries matter for deduplication.
    pub fn retain_days(mut self, days: i64) -> Self {
        self.retain_days = u64::try_from(days).unwrap_or(0);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("json.lock")
    }

    async fn read(&self) -> Result<LedgerFile> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(LedgerFile {
                version: 1,
                ..Default::default()
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, state: &LedgerFile) -> Result<()> {
        let json = serde_json::to_string_pretty(state)?;
        let temp = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp, json).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }

    async fn acquire_file_lock(&self) -> Result<LockFileGuard> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let lock_path = self.lock_path();
        let deadline = tokio::time::Instant::now() + LOCK_TIMEOUT;
        loop {
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
                .await
            {
                Ok(_) => return Ok(LockFileGuard { path: lock_path }),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }

            if self.lock_is_stale(&lock_path).await {
                warn!(path = %lock_path.display(), "removing stale ledger lock");
                let _ = tokio::fs::remove_file(&lock_path).await;
                continue;
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Io(std::io::Error::new(
                    ErrorKind::TimedOut,
                    format!("ledger lock {} is held", lock_path.display()),
                )));
            }
            tokio::time::sleep(LOCK_RETRY).await;
        }
    }

    async fn lock_is_stale(&self, lock_path: &Path) -> bool {
        tokio::fs::metadata(lock_path)
            .await
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age > LOCK_STALE_AFTER)
    }

    /// Read-modify-write under both the in-process and the file lock.
    async fn update<T>(&self, change: impl FnOnce(&mut LedgerFile) -> (T, bool)) -> Result<T> {
        let _local = self.local.lock().await;
        let _file = self.acquire_file_lock().await?;

        let mut state = self.read().await?;
        let (result, dirty) = change(&mut state);
        if dirty {
            self.persist(&state).await?;
        }
        Ok(result)
    }
}

#[async_trait]
impl SentLedger for JsonFileLedger {
    async fn last_sent(&self, training_id: &str, recipient: &str) -> Result<Option<NaiveDate>> {
        let _local = self.local.lock().await;
        Ok(self.read().await?.get(training_id, recipient))
    }

    async fn claim(&self, training_id: &str, recipient: &str, date: NaiveDate) -> Result<bool> {
        let retain = self.retain_days;
        self.update(|state| {
            if state.get(training_id, recipient).is_some_and(|last| last >= date) {
                return (false, false);
            }
            state
                .sent
                .entry(training_id.to_string())
                .or_default()
                .insert(recipient.to_lowercase(), date);
            if let Some(cutoff) = date.checked_sub_days(Days::new(retain)) {
                state.prune(cutoff);
            }
            (true, true)
        })
        .await
    }

    async fn release(&self, training_id: &str, recipient: &str, date: NaiveDate) -> Result<()> {
        self.update(|state| {
            let Some(by_recipient) = state.sent.get_mut(training_id) else {
                return ((), false);
            };
            let key = recipient.to_lowercase();
            if by_recipient.get(&key) != Some(&date) {
                return ((), false);
            }
            by_recipient.remove(&key);
            if by_recipient.is_empty() {
                state.sent.remove(training_id);
            }
            ((), true)
        })
        .await
    }
}
