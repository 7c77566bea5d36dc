//! HTTP handlers.
//!
//! Every route answers JSON in the `{ success, data | error }` envelope,
//! except the export routes which answer a downloadable document. CORS is
//! permissive and preflight requests are answered by the CORS layer.

pub mod admin;
pub mod participations;
pub mod reports;
pub mod trainings;

use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
    http::header,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{de::DeserializeOwned, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::alert::{Mailer, SentLedger};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::report::Document;
use crate::store::{HttpRecordStore, RecordStore};

/// Builds the record store a request talks to. Credentials are resolved per
/// request, so a missing token fails that request rather than startup.
pub trait StoreProvider: Send + Sync {
    fn store(&self, config: &Config) -> Result<Arc<dyn RecordStore>>;
}

pub struct HttpStoreProvider;

impl StoreProvider for HttpStoreProvider {
    fn store(&self, config: &Config) -> Result<Arc<dyn RecordStore>> {
        Ok(Arc::new(HttpRecordStore::new(config.store_credentials()?)?))
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub stores: Arc<dyn StoreProvider>,
    pub mailer: Arc<dyn Mailer>,
    pub ledger: Arc<dyn SentLedger>,
}

impl AppState {
    pub fn store(&self) -> Result<Arc<dyn RecordStore>> {
        self.stores.store(&self.config)
    }
}

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>>;

pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

/// JSON body extractor whose rejections use the error envelope. An empty
/// body reads as `{}` so GET and POST can share a handler.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| Error::Validation(format!("unreadable request body: {e}")))?;
        let body: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
            &b"{}"[..]
        } else {
            &bytes[..]
        };
        serde_json::from_slice(body)
            .map(ApiJson)
            .map_err(|e| Error::Validation(format!("invalid request body: {e}")))
    }
}

impl IntoResponse for Document {
    fn into_response(self) -> Response {
        (
            [
                (header::CONTENT_TYPE, self.format.content_type().to_string()),
                (header::CONTENT_DISPOSITION, self.content_disposition()),
            ],
            self.body,
        )
            .into_response()
    }
}

/// Trim a required string field, rejecting it when blank.
pub fn required(value: Option<String>, name: &str) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Validation(format!("{name} is required")))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(admin::health))
        .route(
            "/api/trainings",
            get(trainings::list_trainings).post(trainings::list_trainings),
        )
        .route("/api/trainings/create", post(trainings::create_training))
        .route("/api/trainings/status", post(trainings::set_training_status))
        .route("/api/sessions/resolve", post(trainings::resolve_session))
        .route("/api/questions", post(trainings::list_questions))
        .route(
            "/api/participations/pretest",
            post(participations::submit_pretest),
        )
        .route(
            "/api/participations/posttest",
            post(participations::submit_posttest),
        )
        .route("/api/reports/participants", post(reports::participants))
        .route(
            "/api/reports/training/export",
            post(reports::export_training),
        )
        .route("/api/reports/quarterly", post(reports::quarterly))
        .route(
            "/api/reports/quarterly/export",
            post(reports::export_quarterly),
        )
        .route(
            "/api/dashboard",
            get(reports::dashboard).post(reports::dashboard),
        )
        .route("/api/admin/verify", post(admin::verify))
        .route("/api/alerts/run", post(admin::run_alerts))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let app = router(state);

    info!("Starting training API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
