//! Report handlers: participant roll-up, quarterly report, dashboard and
//! their downloads.

use axum::extract::State;
use chrono::Local;
use serde::Deserialize;

use super::{ok, required, ApiJson, ApiResult, AppState};
use crate::error::Result;
use crate::join::JoinEngine;
use crate::report::{render_quarter, render_training, Document, ExportFormat};
use crate::stats::{
    build_dashboard, build_quarter_report, build_training_report, DashboardStats, Quarter,
    QuarterReport, TrainingReport,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingReportRequest {
    pub training_id: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarterRequest {
    pub year: Option<i32>,
    pub quarter: Option<u32>,
    pub format: Option<String>,
}

impl QuarterRequest {
    /// The requested quarter, defaulting to the one containing today.
    fn quarter(&self) -> Result<Quarter> {
        let current = Quarter::containing(Local::now().date_naive());
        Quarter::new(
            self.year.unwrap_or(current.year),
            self.quarter.unwrap_or(current.number),
        )
    }
}

fn export_format(raw: Option<&str>) -> Result<ExportFormat> {
    raw.map_or(Ok(ExportFormat::default()), str::parse::<ExportFormat>)
}

async fn training_report(state: &AppState, training_id: &str) -> Result<TrainingReport> {
    let engine = JoinEngine::new(state.store()?);
    let bundle = engine.load_training(training_id).await?;
    Ok(build_training_report(&bundle, &state.config.pass_policy))
}

async fn quarter_report(state: &AppState, quarter: Quarter) -> Result<QuarterReport> {
    let engine = JoinEngine::new(state.store()?);
    let collections = engine.load_collections().await?;
    Ok(build_quarter_report(
        &collections,
        quarter,
        &state.config.pass_policy,
    ))
}

pub async fn participants(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<TrainingReportRequest>,
) -> ApiResult<TrainingReport> {
    let training_id = required(req.training_id, "trainingId")?;
    ok(training_report(&state, &training_id).await?)
}

pub async fn export_training(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<TrainingReportRequest>,
) -> Result<Document> {
    let format = export_format(req.format.as_deref())?;
    let training_id = required(req.training_id, "trainingId")?;
    let report = training_report(&state, &training_id).await?;
    render_training(&report, format)
}

pub async fn quarterly(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<QuarterRequest>,
) -> ApiResult<QuarterReport> {
    let quarter = req.quarter()?;
    ok(quarter_report(&state, quarter).await?)
}

pub async fn export_quarterly(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<QuarterRequest>,
) -> Result<Document> {
    let format = export_format(req.format.as_deref())?;
    let quarter = req.quarter()?;
    let report = quarter_report(&state, quarter).await?;
    render_quarter(&report, format)
}

pub async fn dashboard(State(state): State<AppState>) -> ApiResult<DashboardStats> {
    let engine = JoinEngine::new(state.store()?);
    let collections = engine.load_collections().await?;
    let today = Local::now().date_naive();
    ok(build_dashboard(
        &collections,
        &state.config.pass_policy,
        today,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use chrono::Datelike;

    #[test]
    fn test_quarter_defaults_to_today() {
        let req = QuarterRequest::default();
        let q = req.quarter().unwrap();
        assert_eq!(q.year, Local::now().year());
        assert!((1..=4).contains(&q.number));
    }

    #[test]
    fn test_quarter_out_of_range_is_rejected() {
        let req = QuarterRequest {
            year: Some(2024),
            quarter: Some(5),
            format: None,
        };
        assert!(matches!(req.quarter(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_missing_format_is_html() {
        assert_eq!(export_format(None).unwrap(), ExportFormat::Html);
        assert_eq!(export_format(Some("csv")).unwrap(), ExportFormat::Csv);
    }
}
