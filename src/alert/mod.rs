//! Upcoming-training alerts.
//!
//! A training is due when its date is between today and `lead_days` ahead.
//! Each recipient of a due training gets at most one mail per day: the pair is
//! claimed in the [`SentLedger`] before sending, and a failed send releases
//! its claim without stopping the remaining recipients.

pub mod ledger;
pub mod mailer;

use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tera::{Context, Tera};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::fields::FieldMisses;
use crate::models::Training;
use crate::store::{RecordStore, TRAININGS};

pub use ledger::{JsonFileLedger, SentLedger};
pub use mailer::{LogMailer, MailMessage, Mailer, RelayMailer};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DueTraining {
    pub training_id: String,
    pub title: String,
    pub date: NaiveDate,
    pub days_until: i64,
    pub lead_days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub training_id: String,
    pub recipient: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedDelivery {
    pub training_id: String,
    pub recipient: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRunSummary {
    pub date: Option<NaiveDate>,
    pub candidates: usize,
    pub due: Vec<DueTraining>,
    pub sent: Vec<Delivery>,
    pub skipped: Vec<Delivery>,
    pub failed: Vec<FailedDelivery>,
}

/// Whole calendar days from `today` to `date`; negative once it has passed.
pub fn days_until(date: NaiveDate, today: NaiveDate) -> i64 {
    (date - today).num_days()
}

pub fn is_due(days_until: i64, lead_days: i64) -> bool {
    (0..=lead_days).contains(&days_until)
}

pub struct AlertProcessor {
    store: Arc<dyn RecordStore>,
    mailer: Arc<dyn Mailer>,
    ledger: Arc<dyn SentLedger>,
    default_lead_days: i64,
    site_url: String,
    templates: Tera,
}

impl AlertProcessor {
    pub fn new(
        store: Arc<dyn RecordStore>,
        mailer: Arc<dyn Mailer>,
        ledger: Arc<dyn SentLedger>,
        config: &Config,
    ) -> Result<Self> {
        let mut templates = Tera::default();
        templates.add_raw_template("alert.html", ALERT_TEMPLATE)?;

        Ok(Self {
            store,
            mailer,
            ledger,
            default_lead_days: config.alerts.lead_days,
            site_url: config.site_url.clone(),
            templates,
        })
    }

    pub async fn run(&self, today: NaiveDate) -> Result<AlertRunSummary> {
        let records = self.store.list_all(TRAININGS).await?;
        let mut misses = FieldMisses::new();
        let trainings: Vec<Training> = records
            .iter()
            .map(|r| Training::from_record(r, &mut misses))
            .collect();
        misses.log("alert candidates");

        let mut summary = AlertRunSummary {
            date: Some(today),
            ..Default::default()
        };

        for training in &trainings {
            let Some(date) = training.date else { continue };
            if !training.active || training.finalized || training.alert_recipients.is_empty() {
                continue;
            }
            summary.candidates += 1;

            let lead_days = training.alert_lead_days.unwrap_or(self.default_lead_days);
            let days = days_until(date, today);
            if !is_due(days, lead_days) {
                continue;
            }

            summary.due.push(DueTraining {
                training_id: training.id.clone(),
                title: training.title.clone(),
                date,
                days_until: days,
                lead_days,
            });
            self.notify(training, date, days, today, &mut summary).await?;
        }

        info!(
            candidates = summary.candidates,
            due = summary.due.len(),
            sent = summary.sent.len(),
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            mailer = self.mailer.name(),
            "alert run finished"
        );
        Ok(summary)
    }

    async fn notify(
        &self,
        training: &Training,
        date: NaiveDate,
        days: i64,
        today: NaiveDate,
        summary: &mut AlertRunSummary,
    ) -> Result<()> {
        let message_html = self.render(training, date, days)?;
        let subject = format!("Recordatorio: {} ({})", training.title, date.format("%d/%m/%Y"));

        for recipient in &training.alert_recipients {
            let delivery = Delivery {
                training_id: training.id.clone(),
                recipient: recipient.clone(),
            };

            match self.ledger.claim(&training.id, recipient, today).await {
                Ok(true) => {}
                Ok(false) => {
                    summary.skipped.push(delivery);
                    continue;
                }
                Err(e) => {
                    warn!(training = %training.id, recipient = %recipient, error = %e, "could not claim alert");
                    summary.failed.push(FailedDelivery {
                        training_id: training.id.clone(),
                        recipient: recipient.clone(),
                        error: e.to_string(),
                    });
                    continue;
                }
            }

            let message = MailMessage {
                to: recipient.clone(),
                subject: subject.clone(),
                html: message_html.clone(),
            };
            if let Err(e) = self.mailer.send(&message).await {
                warn!(training = %training.id, recipient = %recipient, error = %e, "alert mail failed");
                if let Err(release) = self.ledger.release(&training.id, recipient, today).await {
                    warn!(training = %training.id, recipient = %recipient, error = %release, "could not release alert claim");
                }
                summary.failed.push(FailedDelivery {
                    training_id: training.id.clone(),
                    recipient: recipient.clone(),
                    error: e.to_string(),
                });
                continue;
            }

            summary.sent.push(delivery);
        }
        Ok(())
    }

    fn render(&self, training: &Training, date: NaiveDate, days: i64) -> Result<String> {
        let mut context = Context::new();
        context.insert("training", training);
        context.insert("date", &date.format("%d/%m/%Y").to_string());
        context.insert("days_until", &days);
        context.insert("site_url", &self.site_url);
        Ok(self.templates.render("alert.html", &context)?)
    }
}

const ALERT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="es">
<head>
    <meta charset="UTF-8">
    <style>
        body { font-family: Arial, sans-serif; color: #333; }
        .card { max-width: 560px; margin: 0 auto; padding: 24px; border: 1px solid #e0e0e0; border-radius: 8px; }
        h2 { color: #1f4e79; margin-top: 0; }
        .when { font-size: 18px; font-weight: bold; }
        .footer { color: #888; font-size: 12px; margin-top: 24px; }
    </style>
</head>
<body>
    <div class="card">
        <h2>{{ training.title }}</h2>
        {% if training.process %}<p>Proceso: {{ training.process }}</p>{% endif %}
        <p class="when">
            {% if days_until == 0 %}La capacitación es hoy, {{ date }}.
            {% elif days_until == 1 %}La capacitación es mañana, {{ date }}.
            {% else %}La capacitación es en {{ days_until }} días, el {{ date }}.{% endif %}
        </p>
        {% if training.description %}<p>{{ training.description }}</p>{% endif %}
        <p class="footer">Mensaje automático de {{ site_url }}</p>
    </div>
</body>
</html>
"#;
