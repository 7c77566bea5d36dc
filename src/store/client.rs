//! HTTPS client for the record store REST API.
//!
//! Lists are paginated: every response may carry an opaque `offset` cursor
//! that must be echoed back to get the next page. Any non-success page aborts
//! the whole listing with [`Error::Upstream`]; no retries are attempted.

use async_trait::async_trait;
use reqwest::{Client, Method, Response, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use super::{Fields, ListQuery, Record, RecordStore};
use crate::config::StoreCredentials;
use crate::error::{Error, Result};

/// Largest page the store accepts.
pub const PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct ListPage {
    #[serde(default)]
    records: Vec<Record>,
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateEnvelope {
    records: Vec<FieldsEnvelope>,
}

#[derive(Debug, Serialize)]
struct FieldsEnvelope {
    fields: Fields,
}

#[derive(Debug, Deserialize)]
struct CreatedRecords {
    records: Vec<Record>,
}

#[derive(Debug, Clone)]
pub struct HttpRecordStore {
    http: Client,
    token: String,
    base: Url,
}

impl HttpRecordStore {
    pub fn new(credentials: StoreCredentials) -> Result<Self> {
        let http = Client::builder()
            .timeout(credentials.timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;

        let mut base = Url::parse(&credentials.base_url)
            .map_err(|e| Error::Config(format!("invalid record store URL: {e}")))?;
        base.path_segments_mut()
            .map_err(|_| Error::Config("record store URL cannot be a base".to_string()))?
            .pop_if_empty()
            .push(&credentials.base_id);

        Ok(Self {
            http,
            token: credentials.token,
            base,
        })
    }

    fn table_url(&self, table: &str, id: Option<&str>) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(table);
            if let Some(id) = id {
                segments.push(id);
            }
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Content-Type", "application/json")
    }

    /// Turn a non-success response into an upstream error carrying the
    /// store's status and payload.
    async fn check(table: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let payload = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
        Err(Error::Upstream {
            status: status.as_u16(),
            table: table.to_string(),
            payload,
        })
    }
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    async fn list(&self, table: &str, query: &ListQuery) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        let mut offset: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let mut params: Vec<(&str, String)> = vec![("pageSize", PAGE_SIZE.to_string())];
            if let Some(formula) = &query.filter_formula {
                params.push(("filterByFormula", formula.clone()));
            }
            if let Some(max) = query.max_records {
                params.push(("maxRecords", max.to_string()));
            }
            if let Some(cursor) = &offset {
                params.push(("offset", cursor.clone()));
            }

            let response = self
                .request(Method::GET, self.table_url(table, None))
                .query(&params)
                .send()
                .await?;
            let page: ListPage = Self::check(table, response).await?.json().await?;

            pages += 1;
            trace!(table, page = pages, count = page.records.len(), "fetched page");
            records.extend(page.records);

            match page.offset {
                Some(next) if !next.is_empty() => offset = Some(next),
                _ => break,
            }
        }

        debug!(table, pages, total = records.len(), "listed records");
        Ok(records)
    }

    async fn get(&self, table: &str, id: &str) -> Result<Record> {
        let response = self
            .request(Method::GET, self.table_url(table, Some(id)))
            .send()
            .await?;
        Ok(Self::check(table, response).await?.json().await?)
    }

    async fn create(&self, table: &str, records: Vec<Fields>) -> Result<Vec<Record>> {
        let body = CreateEnvelope {
            records: records
                .into_iter()
                .map(|fields| FieldsEnvelope { fields })
                .collect(),
        };

        let response = self
            .request(Method::POST, self.table_url(table, None))
            .json(&body)
            .send()
            .await?;
        let created: CreatedRecords = Self::check(table, response).await?.json().await?;
        debug!(table, count = created.records.len(), "created records");
        Ok(created.records)
    }

    async fn update(&self, table: &str, id: &str, fields: Fields) -> Result<Record> {
        let response = self
            .request(Method::PATCH, self.table_url(table, Some(id)))
            .json(&FieldsEnvelope { fields })
            .send()
            .await?;
        Ok(Self::check(table, response).await?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn credentials(base_url: &str) -> StoreCredentials {
        StoreCredentials {
            token: "tok".to_string(),
            base_id: "appBase".to_string(),
            base_url: base_url.to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_table_url_layout() {
        let store = HttpRecordStore::new(credentials("https://api.example.com/v0")).unwrap();
        assert_eq!(
            store.table_url("Trainings", None).as_str(),
            "https://api.example.com/v0/appBase/Trainings"
        );
        assert_eq!(
            store.table_url("App Config", Some("rec1")).as_str(),
            "https://api.example.com/v0/appBase/App%20Config/rec1"
        );
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let err = HttpRecordStore::new(credentials("not a url")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
