//! Template layering: merge an ordered list of templates into one target.
//!
//! The first template in the list is on top. Every cell of the union
//! bounding box takes the value of the first template that is opaque there.

use serde::Serialize;

use super::board::BoardSnapshot;
use super::template::{ProgressSnapshot, TargetBuffer, Template};
use crate::error::{ErrorCode, ErrorKind};
use crate::palette::TRANSPARENT;

/// Largest union area, in cells, that [`layer`] will allocate.
pub const MAX_LAYER_CELLS: u64 = 1 << 26;

#[derive(Debug, thiserror::Error)]
pub enum LayerError {
    #[error("no templates to layer")]
    EmptyInput,
    #[error("layered templates have no placeable pixels")]
    NothingToLayer,
    #[error("layered area of {width}x{height} is too large")]
    TooLarge { width: i64, height: i64 },
}

impl ErrorCode for LayerError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyInput => "E_LAYER_EMPTY",
            Self::NothingToLayer => "E_LAYER_NOTHING",
            Self::TooLarge { .. } => "E_LAYER_TOO_LARGE",
        }
    }

    fn kind(&self) -> ErrorKind {
        ErrorKind::Input
    }
}

/// Composite of several templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayeredResult {
    pub target: TargetBuffer,
    /// Opaque cells of the composite.
    pub placeable: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LayerSummary {
    pub ox: i32,
    pub oy: i32,
    pub width: u32,
    pub height: u32,
    pub placeable: u64,
}

impl LayeredResult {
    #[must_use]
    pub fn progress(&self, board: &BoardSnapshot) -> ProgressSnapshot {
        self.target.progress(board)
    }

    #[must_use]
    pub fn summary(&self) -> LayerSummary {
        LayerSummary {
            ox: self.target.ox,
            oy: self.target.oy,
            width: self.target.width,
            height: self.target.height,
            placeable: self.placeable,
        }
    }
}

/// Layer `templates`, highest priority first.
///
/// # Errors
///
/// [`LayerError::EmptyInput`] for an empty list, [`LayerError::TooLarge`] when
/// the union box exceeds [`MAX_LAYER_CELLS`], [`LayerError::NothingToLayer`]
/// when every template is fully transparent.
pub fn layer(templates: &[&Template]) -> Result<LayeredResult, LayerError> {
    let targets: Vec<&TargetBuffer> = templates.iter().map(|t| &t.target).collect();
    layer_targets(&targets)
}

/// [`layer`] over bare target buffers.
///
/// # Errors
///
/// See [`layer`].
pub fn layer_targets(targets: &[&TargetBuffer]) -> Result<LayeredResult, LayerError> {
    let (x0, y0, x1, y1) = targets
        .iter()
        .map(|t| t.bounds())
        .reduce(|a, b| (a.0.min(b.0), a.1.min(b.1), a.2.max(b.2), a.3.max(b.3)))
        .ok_or(LayerError::EmptyInput)?;

    let too_large = || LayerError::TooLarge { width: x1 - x0, height: y1 - y0 };
    let width = u32::try_from(x1 - x0).map_err(|_| too_large())?;
    let height = u32::try_from(y1 - y0).map_err(|_| too_large())?;
    // Template origins are i32, so the union origin is too.
    let ox = i32::try_from(x0).map_err(|_| too_large())?;
    let oy = i32::try_from(y0).map_err(|_| too_large())?;
    let area = u64::from(width) * u64::from(height);
    if area > MAX_LAYER_CELLS {
        return Err(too_large());
    }
    let cell_count = usize::try_from(area).map_err(|_| too_large())?;

    let mut cells = vec![TRANSPARENT; cell_count];
    let mut placeable = 0;
    for (i, cell) in cells.iter_mut().enumerate() {
        let cx = x0 + (i % width as usize) as i64;
        let cy = y0 + (i / width as usize) as i64;
        if let Some(value) = targets.iter().map(|t| t.at_canvas(cx, cy)).find(|&v| v != TRANSPARENT) {
            *cell = value;
            placeable += 1;
        }
    }

    if placeable == 0 {
        return Err(LayerError::NothingToLayer);
    }

    Ok(LayeredResult { target: TargetBuffer { ox, oy, width, height, cells }, placeable })
}

#[cfg(test)]
#[path = "layer_test.rs"]
mod tests;
