//! Archived canvas queries.

use axum::extract::State;
use axum::response::{Json, Response};
use serde::Deserialize;

use super::{ApiError, blocking, encode_png, png_response};
use crate::state::AppState;

/// Canvas codes present in the archive directory.
pub async fn list_canvases(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let archives = state.archives.clone();
    let codes = blocking(move || archives.canvas_codes()).await??;
    Ok(Json(codes))
}

#[derive(Debug, Deserialize)]
pub struct PlacemapBody {
    pub canvas_code: String,
    pub user_key: String,
}

/// Replay an archived log for one user and return the placemap as PNG.
pub async fn placemap(State(state): State<AppState>, Json(body): Json<PlacemapBody>) -> Result<Response, ApiError> {
    if body.user_key.trim().is_empty() {
        return Err(ApiError::bad_request("E_USER_KEY_EMPTY", "user_key must not be empty"));
    }

    let archives = state.archives.clone();
    let (bytes, counters) = blocking(move || {
        let (result, palette) = archives.placemap(&body.canvas_code, &body.user_key)?;
        let bytes = encode_png(&result.render(&palette))?;
        Ok::<_, ApiError>((bytes, result.counters))
    })
    .await??;

    Ok(png_response(
        bytes,
        &[
            ("x-placed-count", counters.placed_count.to_string()),
            ("x-undo-count", counters.undo_count.to_string()),
            ("x-replaced-by-others", counters.replaced_by_others_count.to_string()),
            ("x-replaced-by-owner", counters.replaced_by_owner_count.to_string()),
        ],
    ))
}

#[cfg(test)]
#[path = "archives_test.rs"]
mod tests;
