//! HTTP surface: multipart upload, path-style retrieval, optional listing.
//!
//! Success and error bodies are JSON; the `name` and `key` fields of an
//! upload response are percent-encoded so they can be pasted into a
//! retrieval URL unchanged. Retrieval decodes the object fully before
//! responding: a wrong key must answer with the invalid-key error, never a
//! 200 followed by garbage bytes.

use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::ShelterError;
use crate::storage::{FilePart, Store, StoredEntry, UploadRequest};

/// Maximum accepted upload body (500 MB)
pub const MAX_UPLOAD_SIZE_BYTES: usize = 500 * 1024 * 1024;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<String>,
}

impl IntoResponse for ShelterError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(ErrorResponse {
            code: self.code(),
            message: self.public_message(),
        });
        (status, body).into_response()
    }
}

/// Builds the application router. The listing route only exists when
/// enabled; a disabled listing request falls through to the file route and
/// answers not-found.
pub fn router(store: Arc<Store>) -> Router {
    let mut router = Router::new().route("/upload", post(upload));
    if store.listing_enabled() {
        router = router.route("/files", get(list));
    }
    router
        .route("/:file", get(view))
        .route("/:file/:key", get(view_with_key))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

/// Binds the listener and serves until ctrl-c.
pub async fn serve(cfg: &Config, store: Arc<Store>) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "shelter listening");

    axum::serve(listener, router(store))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to install shutdown handler");
        return;
    }
    info!("shutdown signal received");
}

async fn upload(
    State(store): State<Arc<Store>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ShelterError> {
    let mut multipart = multipart.map_err(|_| ShelterError::NotFormData)?;

    let mut secret: Option<String> = None;
    let mut file: Option<(String, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| {
            warn!(error = %err, "multipart parsing failed");
            ShelterError::NotFormData
        })?
    {
        match field.name().unwrap_or("") {
            "secret" => {
                secret = Some(field.text().await.map_err(|err| {
                    warn!(error = %err, "reading secret field failed");
                    ShelterError::NotFormData
                })?);
            }
            "file" => {
                let filename = field
                    .file_name()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "unnamed".to_string());
                let data = field.bytes().await.map_err(|err| {
                    warn!(filename, error = %err, "reading file field failed");
                    ShelterError::NotFormData
                })?;
                file = Some((filename, data));
            }
            other => {
                debug!(field = other, "ignoring unknown multipart field");
            }
        }
    }

    let stored = store
        .write(UploadRequest {
            secret,
            file: file.map(|(filename, data)| {
                let extension = split_extension(&filename);
                FilePart {
                    filename,
                    extension,
                    content: Cursor::new(data),
                }
            }),
        })
        .await?;

    Ok(Json(UploadResponse {
        name: urlencoding::encode(&stored.name).into_owned(),
        key: stored
            .key
            .as_deref()
            .map(|k| urlencoding::encode(k).into_owned()),
    }))
}

async fn view(
    State(store): State<Arc<Store>>,
    Path(file): Path<String>,
) -> Result<Response, ShelterError> {
    view_inner(store, file, None).await
}

async fn view_with_key(
    State(store): State<Arc<Store>>,
    Path((file, key)): Path<(String, String)>,
) -> Result<Response, ShelterError> {
    view_inner(store, file, Some(key)).await
}

async fn view_inner(
    store: Arc<Store>,
    file: String,
    key: Option<String>,
) -> Result<Response, ShelterError> {
    let mut buf = Vec::new();
    let outcome = store.read(&file, key.as_deref(), &mut buf).await?;

    let mut builder = Response::builder().status(StatusCode::OK);
    if let Some(content_type) = outcome.content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    builder
        .body(Body::from(buf))
        .map_err(|e| ShelterError::unexpected(e.to_string()))
}

async fn list(State(store): State<Arc<Store>>) -> Result<Json<Vec<StoredEntry>>, ShelterError> {
    Ok(Json(store.list().await?))
}

fn split_extension(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_string())
        .unwrap_or_default()
}
