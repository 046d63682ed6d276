//! Live canvas queries: status, cooldown, board export, template progress
//! and layering.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{Json, Response};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};

use super::{ApiError, blocking, encode_png, png_response};
use crate::services::cooldown::{CooldownPolicy, format_duration};
use crate::services::ingest::ConnectionState;
use crate::services::layer::{self as layering, LayerError, LayerSummary};
use crate::services::template::{ProgressSnapshot, Template};
use crate::services::template_source::resolve_template;
use crate::state::{AppState, CanvasTracker};

fn tracker(state: &AppState) -> Result<Arc<CanvasTracker>, ApiError> {
    state.tracker.clone().ok_or_else(ApiError::untracked)
}

// =============================================================================
// STATUS
// =============================================================================

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub tracked: bool,
    pub canvas_code: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub online_count: Option<u32>,
    pub connection: Option<ConnectionState>,
    pub paused: bool,
    pub dropped_events: u64,
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let Some(tracker) = state.tracker.as_ref() else {
        return Json(StatusResponse {
            tracked: false,
            canvas_code: None,
            width: None,
            height: None,
            online_count: None,
            connection: None,
            paused: false,
            dropped_events: 0,
        });
    };

    let (width, height) = tracker.board.dimensions();
    Json(StatusResponse {
        tracked: true,
        canvas_code: Some(tracker.meta().canvas_code.clone()),
        width: Some(width),
        height: Some(height),
        online_count: tracker.board.online_count(),
        connection: Some(tracker.ingest.connection_state()),
        paused: tracker.ingest.is_paused(),
        dropped_events: tracker.ingest.gate().dropped(),
    })
}

// =============================================================================
// COOLDOWN
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CooldownQuery {
    pub online: Option<i64>,
    pub multiplier: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct CooldownRow {
    pub stack_index: u32,
    pub incremental_seconds: f64,
    pub cumulative_seconds: f64,
    pub incremental: String,
    pub cumulative: String,
}

#[derive(Debug, Serialize)]
pub struct CooldownResponse {
    pub online: i64,
    pub policy: CooldownPolicy,
    pub entries: Vec<CooldownRow>,
}

/// Cooldown schedule for `online` users, defaulting to the live online count.
pub async fn cooldown(
    State(state): State<AppState>,
    Query(query): Query<CooldownQuery>,
) -> Result<Json<CooldownResponse>, ApiError> {
    let live = state
        .tracker
        .as_ref()
        .and_then(|t| t.board.online_count())
        .map(i64::from);
    let online = query
        .online
        .or(live)
        .ok_or_else(|| ApiError::bad_request("E_ONLINE_UNKNOWN", "online count is unknown; pass ?online="))?;

    let policy = state.cooldown_policy();
    let schedule = policy.schedule(online, query.multiplier)?;
    let entries = schedule
        .entries
        .iter()
        .map(|e| CooldownRow {
            stack_index: e.stack_index,
            incremental_seconds: e.incremental_seconds,
            cumulative_seconds: e.cumulative_seconds,
            incremental: format_duration(e.incremental_seconds),
            cumulative: format_duration(e.cumulative_seconds),
        })
        .collect();

    Ok(Json(CooldownResponse { online, policy, entries }))
}

// =============================================================================
// BOARD
// =============================================================================

/// Full-canvas PNG. Ingest is paused only for the snapshot; rendering runs
/// on the blocking pool.
pub async fn board_png(State(state): State<AppState>) -> Result<Response, ApiError> {
    let tracker = tracker(&state)?;
    let snapshot = {
        let _paused = tracker.ingest.gate().paused();
        tracker.board.snapshot()
    };

    let palette = Arc::clone(&tracker.meta().palette);
    let bytes = blocking(move || encode_png(&palette.render(snapshot.pixels(), snapshot.width(), snapshot.height()))).await??;
    Ok(png_response(bytes, &[]))
}

// =============================================================================
// PROGRESS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ProgressBody {
    /// Template link.
    pub template: String,
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub title: Option<String>,
    pub source_url: Option<String>,
    pub preview_url: Option<String>,
    pub ox: i32,
    pub oy: i32,
    pub width: u32,
    pub height: u32,
    pub progress: ProgressSnapshot,
    pub percent: f64,
}

impl ProgressResponse {
    fn new(template: Template, progress: ProgressSnapshot) -> Self {
        Self {
            title: template.meta.title,
            source_url: template.meta.source_url,
            preview_url: template.meta.preview_url,
            ox: template.target.ox,
            oy: template.target.oy,
            width: template.target.width,
            height: template.target.height,
            percent: progress.percent(),
            progress,
        }
    }
}

pub async fn progress(
    State(state): State<AppState>,
    Json(body): Json<ProgressBody>,
) -> Result<Json<ProgressResponse>, ApiError> {
    let tracker = tracker(&state)?;
    let template = resolve_template(&body.template, state.fetcher.as_ref(), Arc::clone(&tracker.meta().palette)).await?;
    let snapshot = tracker.board.snapshot();

    let response = blocking(move || {
        let progress = template.progress(&snapshot);
        ProgressResponse::new(template, progress)
    })
    .await?;
    Ok(Json(response))
}

/// Per-cell progress image of a template, counters in `x-*` headers.
pub async fn progress_png(State(state): State<AppState>, Json(body): Json<ProgressBody>) -> Result<Response, ApiError> {
    let tracker = tracker(&state)?;
    let template = resolve_template(&body.template, state.fetcher.as_ref(), Arc::clone(&tracker.meta().palette)).await?;
    let snapshot = tracker.board.snapshot();

    let (bytes, progress) = blocking(move || {
        let progress = template.progress(&snapshot);
        encode_png(&template.target.progress_image(&snapshot)).map(|bytes| (bytes, progress))
    })
    .await??;

    Ok(png_response(
        bytes,
        &[("x-correct", progress.correct.to_string()), ("x-total-placeable", progress.total_placeable.to_string())],
    ))
}

// =============================================================================
// LAYER
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LayerBody {
    /// Template links, top layer first.
    pub templates: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct LayerResponse {
    pub layer: LayerSummary,
    pub progress: ProgressSnapshot,
    pub percent: f64,
}

pub async fn layer(State(state): State<AppState>, Json(body): Json<LayerBody>) -> Result<Json<LayerResponse>, ApiError> {
    let tracker = tracker(&state)?;
    if body.templates.is_empty() {
        return Err(LayerError::EmptyInput.into());
    }

    let fetcher = state.fetcher.as_ref();
    let palette = Arc::clone(&tracker.meta().palette);
    let templates = try_join_all(
        body.templates
            .iter()
            .map(|link| resolve_template(link, fetcher, Arc::clone(&palette))),
    )
    .await?;
    let snapshot = tracker.board.snapshot();

    let response = blocking(move || {
        let refs: Vec<&Template> = templates.iter().collect();
        let layered = layering::layer(&refs)?;
        let progress = layered.progress(&snapshot);
        Ok::<_, LayerError>(LayerResponse { layer: layered.summary(), percent: progress.percent(), progress })
    })
    .await??;
    Ok(Json(response))
}

#[cfg(test)]
#[path = "canvas_test.rs"]
mod tests;
