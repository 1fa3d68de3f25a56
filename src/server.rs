//! HTTP service: `POST /convert` in, zip out.
//!
//! A thin axum layer over [`crate::convert::convert_upload_with`]. The only
//! behaviour that lives here rather than in the pipeline is *when* the
//! workspace goes away on success: the [`crate::DeferredCleanup`] is moved
//! into the response body stream, so the workspace is removed once the last
//! byte of the archive has been written to the socket (or the client hung
//! up and the body was dropped).
//!
//! | Route           | Success                          | Failure |
//! |-----------------|----------------------------------|---------|
//! | `POST /convert` | `200 application/zip` attachment | `500 {"error": "…"}` (pipeline), `400`/`413` (upload) |
//! | `GET /health`   | `200 {"status": "ok"}`           | |

use crate::config::ConversionConfig;
use crate::convert::convert_upload_with;
use crate::error::Doc2ImgError;
use crate::output::ConvertedArchive;
use crate::pipeline::cleanup::DeferredCleanup;
use crate::pipeline::process::{ProcessRunner, SystemRunner};
use axum::body::{Body, Bytes};
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::Serialize;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio_util::io::ReaderStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Listener settings for [`serve`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind. Default: `0.0.0.0:8000`.
    pub listen: SocketAddr,
    /// Largest accepted request body in bytes. Default: 50 MiB.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8000)),
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Shared, read-only state handed to every request.
#[derive(Clone)]
pub struct AppState {
    config: Arc<ConversionConfig>,
    runner: Arc<dyn ProcessRunner>,
}

impl AppState {
    /// State using the system converters.
    pub fn new(config: ConversionConfig) -> Self {
        let runner = Arc::new(SystemRunner::new(config.stage_timeout()));
        Self::with_runner(config, runner)
    }

    pub fn with_runner(config: ConversionConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            config: Arc::new(config),
            runner,
        }
    }
}

/// Build the application router.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/convert", post(convert))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(server: ServerConfig, config: ConversionConfig) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(server.listen).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(AppState::new(config), server.max_upload_bytes))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

// ── Handlers ─────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn convert(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let (file_name, bytes) = match read_upload(&mut multipart).await {
        Ok(Some(upload)) => upload,
        Ok(None) => return ApiError::bad_request("No file uploaded").into_response(),
        Err(e) => return ApiError::from(e).into_response(),
    };

    match convert_upload_with(file_name, bytes.to_vec(), &state.config, Arc::clone(&state.runner)).await
    {
        Ok(archive) => archive_response(archive).await,
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// First multipart field carrying a file name, preferring one named `file`.
async fn read_upload(multipart: &mut Multipart) -> Result<Option<(String, Bytes)>, MultipartError> {
    let mut fallback = None;
    while let Some(field) = multipart.next_field().await? {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let is_file_field = field.name() == Some("file");
        let bytes = field.bytes().await?;
        if is_file_field {
            return Ok(Some((file_name, bytes)));
        }
        if fallback.is_none() {
            fallback = Some((file_name, bytes));
        }
    }
    Ok(fallback)
}

/// Stream the archive, keeping its workspace alive until the body is done.
async fn archive_response(archive: ConvertedArchive) -> Response {
    let file = match tokio::fs::File::open(archive.path()).await {
        Ok(f) => f,
        Err(e) => {
            return ApiError::from(Doc2ImgError::Resource {
                path: archive.path().to_path_buf(),
                source: e,
            })
            .into_response();
        }
    };

    let (packaged, _stats, cleanup) = archive.into_parts();
    let body = ArchiveBody {
        stream: ReaderStream::new(file),
        _cleanup: cleanup,
    };

    let built = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_LENGTH, packaged.size_bytes)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition(&packaged.filename),
        )
        .body(Body::from_stream(body));

    match built {
        Ok(response) => response,
        Err(e) => ApiError::internal(format!("Failed to build response: {e}")).into_response(),
    }
}

/// Archive bytes plus the hook that removes their workspace.
///
/// Fields drop in order: the file handle closes, then the workspace goes.
struct ArchiveBody {
    stream: ReaderStream<tokio::fs::File>,
    _cleanup: DeferredCleanup,
}

impl Stream for ArchiveBody {
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().stream).poll_next(cx)
    }
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 name.
fn content_disposition(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii,
        urlencoding::encode(filename)
    )
}

// ── Errors ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// An error rendered as `{"error": "<message>"}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<Doc2ImgError> for ApiError {
    fn from(e: Doc2ImgError) -> Self {
        Self::internal(e.to_string())
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        Self {
            status: e.status(),
            message: e.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!("Request failed: {}", self.message);
        }
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}
