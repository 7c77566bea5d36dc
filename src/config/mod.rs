//! Service configuration read from the process environment.
//!
//! Nothing here is fatal at startup. The record store credential and base id
//! are checked when a request needs them, so a misconfigured deployment still
//! answers `/health` and reports a 500 with a descriptive message per request.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::stats::PassPolicy;

pub const ENV_PREFIX: &str = "TRAINWATCH_";

const DEFAULT_STORE_URL: &str = "https://api.airtable.com/v0";
const DEFAULT_SITE_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreSettings,
    pub admin: AdminSettings,
    pub site_url: String,
    pub pass_policy: PassPolicy,
    pub alerts: AlertSettings,
    pub mail: Option<MailSettings>,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub base_id: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
}

/// Credentials resolved for a single request.
#[derive(Debug, Clone)]
pub struct StoreCredentials {
    pub token: String,
    pub base_id: String,
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminSettings {
    pub table: String,
    pub field: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertSettings {
    pub lead_days: i64,
    pub ledger_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailSettings {
    pub relay_url: String,
    pub user: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: IpAddr,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreSettings {
                token: None,
                base_id: None,
                base_url: DEFAULT_STORE_URL.to_string(),
                timeout_secs: 30,
            },
            admin: AdminSettings {
                table: "AppConfig".to_string(),
                field: "Admin Password".to_string(),
            },
            site_url: DEFAULT_SITE_URL.to_string(),
            pass_policy: PassPolicy::default(),
            alerts: AlertSettings {
                lead_days: 7,
                ledger_path: PathBuf::from(".trainwatch/alerts.json"),
            },
            mail: None,
            server: ServerSettings {
                host: IpAddr::from([0, 0, 0, 0]),
                port: 8080,
            },
        }
    }
}

impl Config {
    /// Load from the real process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary lookup so tests can inject variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Config::default();

        // An alternate variable name may hold the credential instead.
        config.store.token = var("STORE_TOKEN").or_else(|| {
            var("STORE_TOKEN_VAR")
                .and_then(|alt| lookup(&alt))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        });
        config.store.base_id = var("STORE_BASE_ID");
        if let Some(url) = var("STORE_URL") {
            config.store.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = var("STORE_TIMEOUT_SECS") {
            config.store.timeout_secs = parse_setting("STORE_TIMEOUT_SECS", &secs)?;
        }

        if let Some(table) = var("ADMIN_TABLE") {
            config.admin.table = table;
        }
        if let Some(field) = var("ADMIN_FIELD") {
            config.admin.field = field;
        }
        if let Some(site) = var("SITE_URL") {
            config.site_url = site.trim_end_matches('/').to_string();
        }

        if let Some(scale) = var("SCORE_SCALE") {
            config.pass_policy.scale = parse_setting("SCORE_SCALE", &scale)?;
        }
        if let Some(percent) = var("PASS_PERCENT") {
            config.pass_policy.pass_percent = parse_setting("PASS_PERCENT", &percent)?;
        }
        config.pass_policy.validate()?;

        if let Some(days) = var("ALERT_LEAD_DAYS") {
            config.alerts.lead_days = parse_setting("ALERT_LEAD_DAYS", &days)?;
        }
        if let Some(path) = var("ALERT_LEDGER") {
            config.alerts.ledger_path = PathBuf::from(path);
        }

        if let Some(relay_url) = var("MAIL_RELAY_URL") {
            config.mail = Some(MailSettings {
                relay_url,
                user: var("MAIL_RELAY_USER"),
                password: var("MAIL_RELAY_PASSWORD"),
                from: var("MAIL_FROM").unwrap_or_else(|| "no-reply@localhost".to_string()),
            });
        }

        if let Some(host) = var("HOST") {
            config.server.host = parse_setting("HOST", &host)?;
        }
        if let Some(port) = var("PORT") {
            config.server.port = parse_setting("PORT", &port)?;
        }

        Ok(config)
    }

    /// Resolve the store credentials a request needs, failing with a
    /// configuration error naming the missing variable.
    pub fn store_credentials(&self) -> Result<StoreCredentials> {
        let token = self.store.token.clone().ok_or_else(|| {
            Error::Config(format!(
                "record store token is not set ({ENV_PREFIX}STORE_TOKEN)"
            ))
        })?;
        let base_id = self.store.base_id.clone().ok_or_else(|| {
            Error::Config(format!(
                "record store base id is not set ({ENV_PREFIX}STORE_BASE_ID)"
            ))
        })?;

        Ok(StoreCredentials {
            token,
            base_id,
            base_url: self.store.base_url.clone(),
            timeout: Duration::from_secs(self.store.timeout_secs),
        })
    }

    pub fn posttest_link(&self, code: &str) -> String {
        format!("{}/posttest?code={}", self.site_url, code)
    }
}

fn parse_setting<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| Error::Config(format!("invalid {ENV_PREFIX}{name} value '{raw}': {e}")))
}
