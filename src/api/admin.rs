//! Health check, admin gate and the manual alert trigger.

use axum::extract::State;
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::trainings::parse_day;
use super::{ok, required, ApiJson, ApiResult, AppState};
use crate::alert::{AlertProcessor, AlertRunSummary};
use crate::error::Error;
use crate::fields::is_present;
use crate::store::ListQuery;

pub async fn health() -> ApiResult<&'static str> {
    ok("healthy")
}

#[derive(Debug, Default, Deserialize)]
pub struct VerifyRequest {
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub verified: bool,
}

/// Compare a password against the first record of the admin table that
/// carries the configured field.
pub async fn verify(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<VerifyRequest>,
) -> ApiResult<VerifyResponse> {
    let password = required(req.password, "password")?;
    let admin = &state.config.admin;
    let store = state.store()?;

    let records = store.list(&admin.table, &ListQuery::all()).await?;
    let expected = records
        .iter()
        .filter_map(|r| r.fields.get(&admin.field))
        .find(|v| is_present(v))
        .map(|v| match v {
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        })
        .ok_or_else(|| {
            Error::Config(format!(
                "no admin password in {}.{}",
                admin.table, admin.field
            ))
        })?;

    if password != expected {
        warn!("admin verification rejected");
        return Err(Error::Unauthorized("invalid password".into()));
    }
    info!("admin verified");
    ok(VerifyResponse { verified: true })
}

#[derive(Debug, Default, Deserialize)]
pub struct RunAlertsRequest {
    pub date: Option<String>,
}

pub async fn run_alerts(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RunAlertsRequest>,
) -> ApiResult<AlertRunSummary> {
    let today = match req.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        Some(raw) => parse_day(raw)?,
        None => Local::now().date_naive(),
    };
    let processor = AlertProcessor::new(
        state.store()?,
        state.mailer.clone(),
        state.ledger.clone(),
        &state.config,
    )?;
    ok(processor.run(today).await?)
}
