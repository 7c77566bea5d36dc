//! Downloadable report documents.

pub mod html;
pub mod workbook;

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::fields::normalize_key;
use crate::stats::{QuarterReport, TrainingReport};

pub use html::HtmlRenderer;
pub use workbook::{Cell, Sheet, Workbook};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Html,
    Csv,
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "html" => Ok(ExportFormat::Html),
            "csv" | "excel" | "workbook" => Ok(ExportFormat::Csv),
            other => Err(Error::Validation(format!(
                "unsupported export format '{other}', expected html or csv"
            ))),
        }
    }
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Html => "text/html; charset=utf-8",
            ExportFormat::Csv => "text/csv; charset=utf-8",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Html => "html",
            ExportFormat::Csv => "csv",
        }
    }
}

/// A rendered download.
#[derive(Debug, Clone)]
pub struct Document {
    pub format: ExportFormat,
    pub filename: String,
    pub body: Vec<u8>,
}

impl Document {
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.filename)
    }
}

pub fn render_training(report: &TrainingReport, format: ExportFormat) -> Result<Document> {
    let stem = format!("reporte-{}", slug(&report.training.title));
    let body = match format {
        ExportFormat::Html => HtmlRenderer::new()?.training(report)?.into_bytes(),
        ExportFormat::Csv => workbook::training_workbook(report).to_csv()?,
    };
    Ok(Document {
        format,
        filename: format!("{stem}.{}", format.extension()),
        body,
    })
}

pub fn render_quarter(report: &QuarterReport, format: ExportFormat) -> Result<Document> {
    let stem = format!("reporte-trimestral-{}-q{}", report.quarter.year, report.quarter.number);
    let body = match format {
        ExportFormat::Html => HtmlRenderer::new()?.quarter(report)?.into_bytes(),
        ExportFormat::Csv => workbook::quarter_workbook(report).to_csv()?,
    };
    Ok(Document {
        format,
        filename: format!("{stem}.{}", format.extension()),
        body,
    })
}

/// ASCII file-name slug: accents dropped, runs of other characters collapsed
/// to a single dash.
pub fn slug(raw: &str) -> String {
    let mut out = String::new();
    let mut dash = false;
    for c in normalize_key(raw).chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            dash = false;
        } else if !dash && !out.is_empty() {
            out.push('-');
            dash = true;
        }
    }
    let trimmed = out.trim_end_matches('-');
    if trimmed.is_empty() {
        "capacitacion".to_string()
    } else {
        trimmed.to_string()
    }
}
