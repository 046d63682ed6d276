//! Canvas bootstrap — fetch board info and initial grids over HTTP.
//!
//! DESIGN
//! ======
//! The canvas server publishes `/info` (canvas code, size, palette, cooldown
//! settings) and three raw `width * height` byte grids: `/boarddata` (palette
//! index per cell, 255 = empty), `/virginmap` (non-zero = never placed) and
//! `/placemap` (0 = placeable). Requests carry a random `pxls-validate`
//! cookie, as the server expects from browsers.
//!
//! ERROR HANDLING
//! ==============
//! Any failure here is a setup failure: the caller logs it and leaves the
//! canvas untracked. Grids of the wrong length are data errors.

use std::time::Duration;

use serde::Deserialize;
use tracing::info;
use url::Url;
use uuid::Uuid;

use super::board::{BoardError, BoardGrid};
use super::cooldown::{CooldownParams, CooldownPolicy};
use crate::error::{ErrorCode, ErrorKind};
use crate::palette::{HexEntry, Palette, PaletteError};

const CONNECT_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("http client build failed: {0}")]
    HttpClientBuild(String),
    #[error("invalid canvas api url: {0}")]
    InvalidUrl(String),
    #[error("request to /{endpoint} failed: {message}")]
    Request { endpoint: &'static str, message: String },
    #[error("/{endpoint} returned status {status}")]
    Status { endpoint: &'static str, status: u16 },
    #[error("board info is malformed: {0}")]
    Info(#[from] serde_json::Error),
    #[error(transparent)]
    Palette(#[from] PaletteError),
    #[error(transparent)]
    Board(#[from] BoardError),
}

impl ErrorCode for BootstrapError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT",
            Self::InvalidUrl(_) => "E_BOOTSTRAP_URL",
            Self::Request { .. } => "E_BOOTSTRAP_REQUEST",
            Self::Status { .. } => "E_BOOTSTRAP_STATUS",
            Self::Info(_) => "E_BOOTSTRAP_INFO",
            Self::Palette(e) => e.error_code(),
            Self::Board(e) => e.error_code(),
        }
    }

    fn kind(&self) -> ErrorKind {
        match self {
            Self::Palette(_) | Self::Board(_) | Self::Info(_) => ErrorKind::Data,
            _ => ErrorKind::Fatal,
        }
    }
}

/// Static description of the current canvas generation.
#[derive(Debug, Clone)]
pub struct CanvasInfo {
    pub canvas_code: String,
    pub width: u32,
    pub height: u32,
    pub palette: Palette,
    pub cooldown: CooldownPolicy,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInfo {
    canvas_code: String,
    width: u32,
    height: u32,
    palette: Vec<HexEntry>,
    #[serde(default)]
    cooldown_info: Option<serde_json::Value>,
}

// =============================================================================
// PARSING
// =============================================================================

/// Parse an `/info` body. Missing or unknown cooldown settings fall back to
/// `cooldown_fallback`.
///
/// # Errors
///
/// Malformed JSON or an invalid palette.
pub fn parse_info(body: &[u8], cooldown_fallback: CooldownParams) -> Result<CanvasInfo, BootstrapError> {
    let raw: RawInfo = serde_json::from_slice(body)?;
    Ok(CanvasInfo {
        palette: Palette::from_hex_entries(&raw.palette)?,
        cooldown: CooldownPolicy::from_info(raw.cooldown_info.as_ref(), cooldown_fallback),
        canvas_code: raw.canvas_code,
        width: raw.width,
        height: raw.height,
    })
}

/// Assemble the board from raw endpoint bytes.
///
/// # Errors
///
/// [`BoardError::SizeMismatch`] when a buffer does not match the canvas size.
pub fn grid_from_buffers(info: &CanvasInfo, board: Vec<u8>, virginmap: &[u8], placemap: &[u8]) -> Result<BoardGrid, BootstrapError> {
    let virgin = virginmap.iter().map(|&v| v != 0).collect();
    let placeable = placemap.iter().map(|&p| p == 0).collect();
    Ok(BoardGrid::from_parts(info.width, info.height, board, virgin, placeable)?)
}

// =============================================================================
// CLIENT
// =============================================================================

/// HTTP client for the canvas server API.
#[derive(Debug, Clone)]
pub struct PxlsApi {
    http: reqwest::Client,
    base_url: Url,
}

impl PxlsApi {
    /// # Errors
    ///
    /// Invalid base URL or TLS backend failure.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BootstrapError> {
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized).map_err(|e| BootstrapError::InvalidUrl(format!("{base_url}: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| BootstrapError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url })
    }

    /// GET `/<endpoint>` and return the raw body.
    ///
    /// # Errors
    ///
    /// Transport failures and non-200 statuses.
    pub async fn fetch_bytes(&self, endpoint: &'static str) -> Result<Vec<u8>, BootstrapError> {
        let url = self
            .base_url
            .join(endpoint)
            .map_err(|e| BootstrapError::InvalidUrl(e.to_string()))?;
        let request_error = |e: reqwest::Error| BootstrapError::Request { endpoint, message: e.to_string() };

        let response = self
            .http
            .get(url)
            .header(reqwest::header::COOKIE, format!("pxls-validate={}", Uuid::new_v4()))
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(BootstrapError::Status { endpoint, status });
        }
        Ok(response.bytes().await.map_err(request_error)?.to_vec())
    }

    /// # Errors
    ///
    /// See [`PxlsApi::fetch_bytes`] and [`parse_info`].
    pub async fn fetch_info(&self, cooldown_fallback: CooldownParams) -> Result<CanvasInfo, BootstrapError> {
        parse_info(&self.fetch_bytes("info").await?, cooldown_fallback)
    }

    /// Fetch the three grids and build the initial board.
    ///
    /// # Errors
    ///
    /// Any fetch failure or size mismatch.
    pub async fn hydrate(&self, info: &CanvasInfo) -> Result<BoardGrid, BootstrapError> {
        let (board, virginmap, placemap) =
            tokio::try_join!(self.fetch_bytes("boarddata"), self.fetch_bytes("virginmap"), self.fetch_bytes("placemap"))?;
        let grid = grid_from_buffers(info, board, &virginmap, &placemap)?;
        info!(canvas_code = %info.canvas_code, width = info.width, height = info.height, "board hydrated");
        Ok(grid)
    }
}

#[cfg(test)]
#[path = "bootstrap_test.rs"]
mod tests;
