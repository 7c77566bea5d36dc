//! Mock implementations for testing

pub mod ledger;
pub mod mailer;
pub mod store;

pub use ledger::MemoryLedger;
pub use mailer::RecordingMailer;
pub use store::{MemoryStore, StaticStoreProvider};
