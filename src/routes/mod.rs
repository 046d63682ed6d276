//! Router assembly and the shared error response.
//!
//! SYSTEM CONTEXT
//! ==============
//! The HTTP surface is a thin query layer over the tracking engine. Handlers
//! take snapshots, hand CPU-bound work to the blocking pool, and translate
//! service errors into `{code, message, retryable}` JSON bodies.

pub mod archives;
pub mod canvas;

use axum::Router;
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use image::{ImageFormat, RgbaImage};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{ErrorCode, ErrorKind};
use crate::state::AppState;

/// Build the full application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/status", get(canvas::status))
        .route("/api/cooldown", get(canvas::cooldown))
        .route("/api/board.png", get(canvas::board_png))
        .route("/api/progress", post(canvas::progress))
        .route("/api/progress.png", post(canvas::progress_png))
        .route("/api/layer", post(canvas::layer))
        .route("/api/archives", get(archives::list_canvases))
        .route("/api/placemap", post(archives::placemap))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

// =============================================================================
// ERRORS
// =============================================================================

/// Error response rendered as `{code, message, retryable}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into(), retryable: false }
    }

    /// The canvas failed to bootstrap and is not being tracked.
    #[must_use]
    pub fn untracked() -> Self {
        Self { retryable: true, ..Self::new(StatusCode::SERVICE_UNAVAILABLE, "E_CANVAS_UNTRACKED", "canvas is not tracked") }
    }

    #[must_use]
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    #[must_use]
    pub fn internal(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, code, message)
    }
}

#[must_use]
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Input => StatusCode::BAD_REQUEST,
        ErrorKind::Data => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl<E: ErrorCode> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self { status: status_for(err.kind()), code: err.error_code(), message: err.to_string(), retryable: err.retryable() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "code": self.code, "message": self.message, "retryable": self.retryable });
        (self.status, Json(body)).into_response()
    }
}

/// Run CPU-bound work on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::internal("E_TASK", e.to_string()))
}

// =============================================================================
// PNG
// =============================================================================

fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, ApiError> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| ApiError::internal("E_PNG_ENCODE", e.to_string()))?;
    Ok(bytes)
}

fn png_response(bytes: Vec<u8>, headers: &[(&'static str, String)]) -> Response {
    let mut response = ([(header::CONTENT_TYPE, "image/png")], bytes).into_response();
    for (name, value) in headers {
        if let Ok(value) = HeaderValue::from_str(value) {
            response.headers_mut().insert(HeaderName::from_static(name), value);
        }
    }
    response
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
