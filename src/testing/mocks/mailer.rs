//! Mailer that records what it was asked to send

use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::alert::{MailMessage, Mailer};
use crate::error::{Error, Result};

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<MailMessage>>,
    failing: HashSet<String>,
    delay: Option<Duration>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends to `address` fail with a relay error.
    pub fn failing_for(mut self, address: &str) -> Self {
        self.failing.insert(address.to_lowercase());
        self
    }

    /// Every send waits `delay` before completing, like a slow relay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&message.to.to_lowercase()) {
            return Err(Error::Mail(format!("relay rejected {}", message.to)));
        }
        self.sent.lock().await.push(message.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}
