//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is the single context object handed to every Axum handler via
//! the `State` extractor. It is built once in `main`; nothing in the crate
//! reaches for globals. A canvas whose bootstrap failed is simply absent
//! (`tracker: None`): archive and cooldown queries keep working.

use std::sync::Arc;

use crate::config::TrackerConfig;
use crate::services::archive::ArchiveStore;
use crate::services::board::BoardState;
use crate::services::bootstrap::CanvasInfo;
use crate::services::cooldown::CooldownPolicy;
use crate::services::ingest::IngestHandle;
use crate::services::refresh::{CanvasMeta, CanvasSlot};
use crate::services::template_source::ImageFetcher;

/// The live canvas being tracked. Metadata is swapped by the refresh task
/// on a canvas reset; handlers read it once per request via [`CanvasTracker::meta`].
#[derive(Debug)]
pub struct CanvasTracker {
    pub canvas: Arc<CanvasSlot>,
    pub board: Arc<BoardState>,
    pub ingest: IngestHandle,
}

impl CanvasTracker {
    #[must_use]
    pub fn new(info: CanvasInfo, board: Arc<BoardState>, ingest: IngestHandle) -> Self {
        Self { canvas: Arc::new(CanvasSlot::new(CanvasMeta::from(info))), board, ingest }
    }

    #[must_use]
    pub fn meta(&self) -> Arc<CanvasMeta> {
        self.canvas.current()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<TrackerConfig>,
    pub tracker: Option<Arc<CanvasTracker>>,
    pub archives: ArchiveStore,
    pub fetcher: Arc<dyn ImageFetcher>,
}

impl AppState {
    #[must_use]
    pub fn new(config: TrackerConfig, tracker: Option<CanvasTracker>, fetcher: Arc<dyn ImageFetcher>) -> Self {
        let archives = ArchiveStore::new(config.archive_dir.clone());
        Self { config: Arc::new(config), tracker: tracker.map(Arc::new), archives, fetcher }
    }

    /// Cooldown policy of the tracked canvas, or the configured formula.
    #[must_use]
    pub fn cooldown_policy(&self) -> CooldownPolicy {
        self.tracker
            .as_ref()
            .map_or(CooldownPolicy::Activity(self.config.cooldown), |t| t.meta().cooldown)
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
