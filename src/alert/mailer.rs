use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::MailSettings;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<()>;
    fn name(&self) -> &str;
}

/// Only logs; used when no relay is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        info!(to = %message.to, subject = %message.subject, "alert mail (log only)");
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

#[derive(Debug, Serialize)]
struct RelayPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// Delivers through an authenticated HTTP mail relay.
pub struct RelayMailer {
    http: Client,
    settings: MailSettings,
}

impl RelayMailer {
    pub fn new(settings: MailSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { http, settings })
    }
}

#[async_trait]
impl Mailer for RelayMailer {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        let mut request = self.http.post(&self.settings.relay_url).json(&RelayPayload {
            from: &self.settings.from,
            to: &message.to,
            subject: &message.subject,
            html: &message.html,
        });
        if let Some(user) = &self.settings.user {
            request = request.basic_auth(user, self.settings.password.as_ref());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Mail(format!(
                "relay answered {status} for {}: {body}",
                message.to
            )));
        }

        debug!(to = %message.to, "alert mail relayed");
        Ok(())
    }

    fn name(&self) -> &str {
        "relay"
    }
}

/// Relay when configured, otherwise log only.
pub fn from_settings(settings: Option<&MailSettings>) -> Result<Arc<dyn Mailer>> {
    match settings {
        Some(settings) => Ok(Arc::new(RelayMailer::new(settings.clone())?)),
        None => Ok(Arc::new(LogMailer)),
    }
}
