//! Canvas refresh — periodically re-read `/info` and follow canvas resets.
//!
//! DESIGN
//! ======
//! The canvas server can start a new canvas generation at any time: the
//! canvas code changes and the size, palette and cooldown settings may
//! change with it. A background task re-reads `/info` on a fixed interval.
//! When the code or the dimensions differ from the tracked generation it
//! re-hydrates the grids, swaps the board through the ingest gate and then
//! publishes the new [`CanvasMeta`]. Otherwise only the palette and cooldown
//! settings are swapped in.
//!
//! Readers take an `Arc<CanvasMeta>` from the [`CanvasSlot`] and keep a
//! consistent view for the whole request, the same way board snapshots work.
//!
//! ERROR HANDLING
//! ==============
//! A failed refresh is logged and retried on the next tick. The tracked
//! generation stays in place until a refresh fully succeeds.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::board::BoardGrid;
use super::bootstrap::{BootstrapError, CanvasInfo, PxlsApi};
use super::cooldown::{CooldownParams, CooldownPolicy};
use super::ingest::IngestGate;
use crate::error::ErrorCode;
use crate::palette::Palette;

// =============================================================================
// TYPES
// =============================================================================

/// Metadata of the tracked canvas generation.
#[derive(Debug, Clone)]
pub struct CanvasMeta {
    pub canvas_code: String,
    pub palette: Arc<Palette>,
    pub cooldown: CooldownPolicy,
}

impl From<CanvasInfo> for CanvasMeta {
    fn from(info: CanvasInfo) -> Self {
        Self { canvas_code: info.canvas_code, palette: Arc::new(info.palette), cooldown: info.cooldown }
    }
}

/// Swappable holder for the current [`CanvasMeta`].
#[derive(Debug)]
pub struct CanvasSlot {
    meta: RwLock<Arc<CanvasMeta>>,
}

impl CanvasSlot {
    #[must_use]
    pub fn new(meta: CanvasMeta) -> Self {
        Self { meta: RwLock::new(Arc::new(meta)) }
    }

    #[must_use]
    pub fn current(&self) -> Arc<CanvasMeta> {
        Arc::clone(&self.meta.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn replace(&self, meta: CanvasMeta) {
        *self.meta.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(meta);
    }
}

/// Where canvas info and grids come from.
#[async_trait]
pub trait CanvasSource: Send + Sync {
    async fn fetch_info(&self, cooldown_fallback: CooldownParams) -> Result<CanvasInfo, BootstrapError>;

    async fn hydrate(&self, info: &CanvasInfo) -> Result<BoardGrid, BootstrapError>;
}

#[async_trait]
impl CanvasSource for PxlsApi {
    async fn fetch_info(&self, cooldown_fallback: CooldownParams) -> Result<CanvasInfo, BootstrapError> {
        PxlsApi::fetch_info(self, cooldown_fallback).await
    }

    async fn hydrate(&self, info: &CanvasInfo) -> Result<BoardGrid, BootstrapError> {
        PxlsApi::hydrate(self, info).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Same generation; palette and cooldown settings re-read.
    Unchanged,
    /// A new generation was hydrated and swapped in.
    Reset { from: String, to: String },
}

// =============================================================================
// REFRESH
// =============================================================================

/// Re-read canvas info once and follow a reset if there was one.
///
/// # Errors
///
/// Any fetch or hydration failure; the tracked generation is left as is.
pub async fn refresh_once(
    source: &dyn CanvasSource,
    slot: &CanvasSlot,
    gate: &IngestGate,
    cooldown_fallback: CooldownParams,
) -> Result<RefreshOutcome, BootstrapError> {
    let info = source.fetch_info(cooldown_fallback).await?;
    let current = slot.current();
    let same_size = gate.board().dimensions() == (info.width, info.height);

    if info.canvas_code == current.canvas_code && same_size {
        slot.replace(CanvasMeta::from(info));
        return Ok(RefreshOutcome::Unchanged);
    }

    let grid = source.hydrate(&info).await?;
    gate.reset_board(grid);
    let outcome = RefreshOutcome::Reset { from: current.canvas_code.clone(), to: info.canvas_code.clone() };
    slot.replace(CanvasMeta::from(info));
    Ok(outcome)
}

/// Spawn the refresh loop. The first refresh runs one `interval` after start.
pub fn spawn_refresh(
    source: Arc<dyn CanvasSource>,
    slot: Arc<CanvasSlot>,
    gate: Arc<IngestGate>,
    cooldown_fallback: CooldownParams,
    interval: Duration,
) -> JoinHandle<()> {
    info!(interval_secs = interval.as_secs(), "canvas refresh configured");
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            match refresh_once(source.as_ref(), &slot, &gate, cooldown_fallback).await {
                Ok(RefreshOutcome::Unchanged) => debug!("canvas info refreshed"),
                Ok(RefreshOutcome::Reset { from, to }) => info!(%from, %to, "canvas reset; board re-hydrated"),
                Err(error) => warn!(code = error.error_code(), error = %error, "canvas refresh failed"),
            }
        }
    })
}

#[cfg(test)]
#[path = "refresh_test.rs"]
mod tests;
