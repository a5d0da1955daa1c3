//! HTTP surface: the sync endpoint and the static file tree.
//!
//! ```text
//! POST    /download-image   { link, id?, imgNo? } → run the pipeline
//! GET     /files/{*path}    published bundles under the output root
//! OPTIONS *                 204, CORS preflight
//! *                         404 { success: false, message: "Not found" }
//! ```
//!
//! Every response carries permissive CORS headers.

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::pipeline::compress::Reencoder;
use crate::pipeline::rasterize::Rasterizer;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::sync::{process_bundle, BundleRequest, Collaborators};
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path as RoutePath, Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SyncConfig>,
    pub rasterizer: Arc<dyn Rasterizer>,
    pub reencoder: Arc<dyn Reencoder>,
    pub progress: ProgressCallback,
}

impl AppState {
    pub fn new(config: SyncConfig, rasterizer: Arc<dyn Rasterizer>, reencoder: Arc<dyn Reencoder>) -> Self {
        Self {
            config: Arc::new(config),
            rasterizer,
            reencoder,
            progress: Arc::new(NoopProgressCallback),
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/download-image", post(download_image))
        .route("/files/{*path}", get(serve_file))
        .fallback(not_found)
        .with_state(state)
        .layer(middleware::from_fn(cors))
        .layer(middleware::from_fn(log_responses))
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Sync service listening on http://{}", listener.local_addr()?);
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
}

// ── Bodies ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncResponse {
    success: bool,
    folder_name: String,
    zip_path: PathBuf,
    preview_path: Option<PathBuf>,
    zip_url: String,
    preview_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct FailureBody {
    success: bool,
    message: String,
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(FailureBody {
            success: false,
            message: message.into(),
        }),
    )
        .into_response()
}

fn status_for(err: &SyncError) -> StatusCode {
    if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else if err.is_upstream_error() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────

async fn download_image(
    State(state): State<AppState>,
    payload: Result<Json<BundleRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!("Rejected sync request body: {}", rejection.body_text());
            return failure(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    let with = Collaborators {
        rasterizer: state.rasterizer.as_ref(),
        reencoder: state.reencoder.as_ref(),
        progress: state.progress.as_ref(),
    };
    match process_bundle(&request, &state.config, with).await {
        Ok(output) => Json(SyncResponse {
            success: true,
            folder_name: output.folder_name,
            zip_path: output.zip_path,
            preview_path: output.preview_path,
            zip_url: output.zip_url,
            preview_url: output.preview_url,
        })
        .into_response(),
        Err(err) => {
            let status = status_for(&err);
            if status.is_server_error() {
                error!("Sync request failed: {}", err);
            }
            failure(status, err.to_string())
        }
    }
}

async fn serve_file(State(state): State<AppState>, RoutePath(path): RoutePath<String>) -> Response {
    let Some(absolute) = resolve_public_path(&state.config.output_dir, &path) else {
        warn!("Refused file path '{}'", path);
        return failure(StatusCode::FORBIDDEN, "Forbidden");
    };

    let file = match tokio::fs::File::open(&absolute).await {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return not_found().await,
        Err(err) => {
            error!("Failed to open {}: {}", absolute.display(), err);
            return failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file");
        }
    };
    let metadata = match file.metadata().await {
        Ok(m) if m.is_file() => m,
        Ok(_) => return not_found().await,
        Err(err) => {
            error!("Failed to stat {}: {}", absolute.display(), err);
            return failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file");
        }
    };

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type_for(&absolute)));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(metadata.len()));
    let name = absolute
        .file_name()
        .map(|n| n.to_string_lossy().replace('"', "'"))
        .unwrap_or_default();
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{name}\"")) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

async fn not_found() -> Response {
    failure(StatusCode::NOT_FOUND, "Not found")
}

/// Map a request path onto the output root.
///
/// Returns `None` for anything that could leave the root or reach a staging
/// directory: absolute paths, `..`, `.`, and dot-prefixed components.
pub fn resolve_public_path(root: &Path, requested: &str) -> Option<PathBuf> {
    let relative = Path::new(requested);
    if requested.is_empty() || relative.is_absolute() {
        return None;
    }
    let safe = relative.components().all(|component| match component {
        Component::Normal(name) => !name.to_string_lossy().starts_with('.'),
        Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_) => false,
    });
    safe.then(|| root.join(relative))
}

/// Content type by file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    match crate::pipeline::walk::extension_lower(path).as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}

// ── Middleware ───────────────────────────────────────────────────────────

async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("OPTIONS, GET, POST"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

async fn log_responses(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();
    let response = next.run(request).await;
    info!(
        "{} {} → {} in {}ms",
        method,
        uri.path(),
        response.status().as_u16(),
        start.elapsed().as_millis()
    );
    response
}
