//! Testing utilities and fixtures
//!
//! In-memory stand-ins for the record store, the mailer and the alert
//! ledger, plus record and model builders shared by unit and integration
//! tests.

pub mod fixtures;
pub mod mocks;

use std::sync::Arc;

use crate::api::AppState;
use crate::config::Config;

pub use mocks::{MemoryLedger, MemoryStore, RecordingMailer, StaticStoreProvider};

/// Configuration with store credentials filled in, as a deployed service
/// would have.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.store.token = Some("test-token".to_string());
    config.store.base_id = Some("appTEST".to_string());
    config.site_url = "https://capacitaciones.example.org".to_string();
    config
}

/// Handler state over an in-memory store with a recording mailer and an
/// in-memory ledger.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
    pub ledger: Arc<MemoryLedger>,
    pub state: AppState,
}

impl TestApp {
    pub fn new(store: MemoryStore) -> Self {
        Self::with_config(store, test_config())
    }

    pub fn with_config(store: MemoryStore, config: Config) -> Self {
        let store = Arc::new(store);
        let mailer = Arc::new(RecordingMailer::new());
        let ledger = Arc::new(MemoryLedger::new());
        let state = AppState {
            config: Arc::new(config),
            stores: Arc::new(StaticStoreProvider::new(store.clone())),
            mailer: mailer.clone(),
            ledger: ledger.clone(),
        };
        Self {
            store,
            mailer,
            ledger,
            state,
        }
    }
}
