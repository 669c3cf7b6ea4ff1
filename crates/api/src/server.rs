use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_server::{tls_rustls::RustlsConfig, Handle};
use conduit_core::{ConduitError, Kind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::review::AdmissionReview;
use crate::AdmissionHandler;

const DEFAULT_CERT: &str = "/etc/webhook/certs/tls.crt";
const DEFAULT_KEY: &str = "/etc/webhook/certs/tls.key";
const DEFAULT_PORT: u16 = 8443;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Invalid admission review: {0}")]
    InvalidReview(String),
    #[error("Missing request")]
    MissingRequest,
    #[error("Unknown resource kind: {0}")]
    UnknownKind(String),
    #[error("Not found")]
    NotFound,
    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::InvalidReview(_) | ApiError::MissingRequest => StatusCode::BAD_REQUEST,
            ApiError::UnknownKind(_) | ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(detail) => {
                error!(%detail, "admission handler failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(serde_json::json!({"error": self.to_string()}))).into_response()
    }
}

/// Kinds with an admission route: everything below the ownership root.
pub fn admission_kinds() -> impl Iterator<Item = Kind> {
    Kind::ALL.into_iter().filter(|k| k.has_owner())
}

/// `POST /validate/<plural|singular>` per guarded kind plus `GET /health` and `GET /healthz`.
pub fn router(handler: Arc<AdmissionHandler>) -> Router {
    Router::new()
        .route("/validate/:kind", post(validate).fallback(method_not_allowed))
        .route("/health", get(health).fallback(method_not_allowed))
        .route("/healthz", get(health).fallback(method_not_allowed))
        .fallback(not_found)
        .with_state(handler)
}

async fn health() -> &'static str { "OK" }

async fn method_not_allowed() -> ApiError { ApiError::MethodNotAllowed }

async fn not_found() -> ApiError { ApiError::NotFound }

async fn validate(
    State(handler): State<Arc<AdmissionHandler>>,
    Path(segment): Path<String>,
    body: Bytes,
) -> Result<Json<AdmissionReview>, ApiError> {
    let kind = Kind::from_route(&segment).filter(|k| k.has_owner()).ok_or_else(|| ApiError::UnknownKind(segment.clone()))?;
    let review: AdmissionReview = serde_json::from_slice(&body).map_err(|e| ApiError::InvalidReview(e.to_string()))?;
    let request = review.request.ok_or(ApiError::MissingRequest)?;
    // A panic inside validation becomes a 500 instead of a dropped connection.
    let response = tokio::spawn(async move { handler.review(kind, &request).await })
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(AdmissionReview::from_response(response)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// `None` serves plain HTTP.
    pub tls: Option<TlsPaths>,
    pub shutdown_grace: Duration,
}

impl ServerConfig {
    /// `WEBHOOK_PORT`, `TLS_CERT_PATH` and `TLS_KEY_PATH`, with TLS dropped when `insecure`.
    pub fn from_env(insecure: bool) -> Self {
        let port = std::env::var("WEBHOOK_PORT").ok().and_then(|s| s.parse().ok()).unwrap_or(DEFAULT_PORT);
        let tls = (!insecure).then(|| TlsPaths {
            cert: std::env::var("TLS_CERT_PATH").unwrap_or_else(|_| DEFAULT_CERT.to_string()).into(),
            key: std::env::var("TLS_KEY_PATH").unwrap_or_else(|_| DEFAULT_KEY.to_string()).into(),
        });
        Self { port, tls, shutdown_grace: Duration::from_secs(10) }
    }
}

/// Read the PEM pair, failing as a configuration error when either file is missing.
pub async fn load_tls(paths: &TlsPaths) -> anyhow::Result<RustlsConfig> {
    for p in [&paths.cert, &paths.key] {
        if !p.is_file() {
            return Err(ConduitError::Configuration(format!("TLS file not found: {}", p.display())).into());
        }
    }
    RustlsConfig::from_pem_file(&paths.cert, &paths.key)
        .await
        .with_context(|| format!("loading TLS material from {}", paths.cert.display()))
}

/// Serve `router` until `shutdown` fires, then drain connections for the grace period.
pub async fn serve(router: Router, config: ServerConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let handle = Handle::new();
    let watcher = handle.clone();
    let grace = config.shutdown_grace;
    tokio::spawn(async move {
        shutdown.cancelled().await;
        info!(grace_ms = grace.as_millis() as u64, "admission server draining");
        watcher.graceful_shutdown(Some(grace));
    });

    match &config.tls {
        Some(paths) => {
            let tls = load_tls(paths).await?;
            info!(%addr, cert = %paths.cert.display(), "admission server listening (tls)");
            axum_server::bind_rustls(addr, tls)
                .handle(handle)
                .serve(router.into_make_service())
                .await
                .context("admission server")?;
        }
        None => {
            warn!(%addr, "admission server listening without TLS");
            axum_server::bind(addr).handle(handle).serve(router.into_make_service()).await.context("admission server")?;
        }
    }
    info!("admission server stopped");
    Ok(())
}
