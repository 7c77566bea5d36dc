//! # Trainwatch
//!
//! Backend for staff training programmes: trainings, attendance sessions,
//! pretest/posttest participations and the reports built over them. Records
//! live in a remote tabular store reached over HTTPS; this crate joins them,
//! computes statistics and renders downloadable reports.
//!
//! ## Modules
//!
//! - `store` - Record store seam and its paginating HTTP client
//! - `fields` - Alias-tolerant field access over raw records
//! - `models` - Typed trainings, sessions, participations and questions
//! - `join` - Training to session to participation joins
//! - `stats` - Per-training, quarterly and dashboard aggregation
//! - `report` - HTML and workbook rendering
//! - `alert` - Upcoming-training mail alerts with a sent ledger
//! - `api` - axum handlers
//! - `testing` - In-memory store, mocks and fixtures
pub mod alert;
pub mod api;
pub mod config;
pub mod error;
pub mod fields;
pub mod join;
pub mod models;
pub mod report;
pub mod stats;
pub mod store;

pub mod testing;

pub use error::{Error, Result};
