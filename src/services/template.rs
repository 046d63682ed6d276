//! Template model — a source image reduced onto the palette and placed at a
//! canvas offset, plus progress accounting against a board snapshot.
//!
//! DESIGN
//! ======
//! A [`Template`] is built once and never mutated. Its reduced target grid is
//! a [`TargetBuffer`], the same type layering produces, so progress works the
//! same for a single template and for a layered composite.
//!
//! Placement validity is checked at query time: cells that land off the board
//! or on unplaceable cells simply do not count as placeable.

use image::{Rgba, RgbaImage};
use serde::Serialize;

use super::board::BoardSnapshot;
use crate::error::{ErrorCode, ErrorKind};
use crate::palette::{Palette, TRANSPARENT};

const CORRECT: Rgba<u8> = Rgba([0, 255, 0, 255]);
const WRONG: Rgba<u8> = Rgba([255, 0, 0, 255]);
const NOT_PLACEABLE: Rgba<u8> = Rgba([0, 0, 255, 255]);
const OUTSIDE: Rgba<u8> = Rgba([0, 0, 0, 0]);

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template image is empty")]
    EmptyImage,
    #[error("template offset ({0}, {1}) is outside canvas coordinates")]
    OffsetOutOfRange(i64, i64),
}

impl ErrorCode for TemplateError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyImage => "E_TEMPLATE_EMPTY",
            Self::OffsetOutOfRange(..) => "E_TEMPLATE_OFFSET",
        }
    }

    fn kind(&self) -> ErrorKind {
        ErrorKind::Input
    }
}

/// Palette-index grid placed at a canvas offset. [`TRANSPARENT`] cells are
/// not part of the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetBuffer {
    pub ox: i32,
    pub oy: i32,
    pub width: u32,
    pub height: u32,
    /// Row-major, `width * height` cells.
    pub cells: Vec<u8>,
}

/// Descriptive fields supplied by the template source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TemplateMeta {
    pub title: Option<String>,
    pub source_url: Option<String>,
    pub preview_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Template {
    pub meta: TemplateMeta,
    pub source: RgbaImage,
    pub target: TargetBuffer,
}

/// Progress of a target against one board snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub total_pixels: u64,
    pub total_placeable: u64,
    pub correct: u64,
    /// Correct cells that were never placed on.
    pub virgin_correct: u64,
}

impl ProgressSnapshot {
    /// Share of placeable cells that are correct, in percent.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self) -> f64 {
        if self.total_placeable == 0 {
            return 0.0;
        }
        self.correct as f64 * 100.0 / self.total_placeable as f64
    }
}

/// Status of one target cell against the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellStatus {
    Outside,
    NotPlaceable,
    Wrong,
    Correct,
}

// =============================================================================
// TARGET BUFFER
// =============================================================================

impl TargetBuffer {
    #[must_use]
    pub fn total_pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Cells that carry a palette index.
    #[must_use]
    pub fn opaque_pixels(&self) -> u64 {
        self.cells.iter().filter(|&&c| c != TRANSPARENT).count() as u64
    }

    /// Target value at template-local `(x, y)`.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        (x < self.width && y < self.height).then(|| self.cells[y as usize * self.width as usize + x as usize])
    }

    /// Target value at canvas coordinates; [`TRANSPARENT`] outside the buffer.
    #[must_use]
    pub fn at_canvas(&self, cx: i64, cy: i64) -> u8 {
        let x = cx - i64::from(self.ox);
        let y = cy - i64::from(self.oy);
        match (u32::try_from(x), u32::try_from(y)) {
            (Ok(x), Ok(y)) => self.get(x, y).unwrap_or(TRANSPARENT),
            _ => TRANSPARENT,
        }
    }

    /// Canvas-space bounds as `(x0, y0, x1, y1)`, exclusive end.
    #[must_use]
    pub fn bounds(&self) -> (i64, i64, i64, i64) {
        let x0 = i64::from(self.ox);
        let y0 = i64::from(self.oy);
        (x0, y0, x0 + i64::from(self.width), y0 + i64::from(self.height))
    }

    fn cell_status(&self, x: u32, y: u32, target: u8, board: &BoardSnapshot) -> CellStatus {
        if target == TRANSPARENT {
            return CellStatus::Outside;
        }
        let cx = i64::from(self.ox) + i64::from(x);
        let cy = i64::from(self.oy) + i64::from(y);
        if !board.is_placeable(cx, cy) {
            return CellStatus::NotPlaceable;
        }
        if board.pixel(cx, cy) == Some(target) { CellStatus::Correct } else { CellStatus::Wrong }
    }

    fn statuses<'a>(&'a self, board: &'a BoardSnapshot) -> impl Iterator<Item = (u32, u32, CellStatus)> + 'a {
        let width = self.width.max(1);
        self.cells.iter().zip(0u32..).map(move |(&target, i)| {
            let (x, y) = (i % width, i / width);
            (x, y, self.cell_status(x, y, target, board))
        })
    }

    /// Count placeable and correct cells against `board`.
    #[must_use]
    pub fn progress(&self, board: &BoardSnapshot) -> ProgressSnapshot {
        let mut snapshot = ProgressSnapshot { total_pixels: self.total_pixels(), ..ProgressSnapshot::default() };
        for (x, y, status) in self.statuses(board) {
            match status {
                CellStatus::Outside | CellStatus::NotPlaceable => {}
                CellStatus::Wrong => snapshot.total_placeable += 1,
                CellStatus::Correct => {
                    snapshot.total_placeable += 1;
                    snapshot.correct += 1;
                    if board.is_virgin(i64::from(self.ox) + i64::from(x), i64::from(self.oy) + i64::from(y)) {
                        snapshot.virgin_correct += 1;
                    }
                }
            }
        }
        snapshot
    }

    /// Per-cell status image: green correct, red wrong, blue not placeable,
    /// transparent outside the target.
    #[must_use]
    pub fn progress_image(&self, board: &BoardSnapshot) -> RgbaImage {
        let mut image = RgbaImage::from_pixel(self.width, self.height, OUTSIDE);
        for (x, y, status) in self.statuses(board) {
            let color = match status {
                CellStatus::Outside => OUTSIDE,
                CellStatus::NotPlaceable => NOT_PLACEABLE,
                CellStatus::Wrong => WRONG,
                CellStatus::Correct => CORRECT,
            };
            image.put_pixel(x, y, color);
        }
        image
    }
}

// =============================================================================
// TEMPLATE
// =============================================================================

impl Template {
    /// Reduce `source` onto `palette` and place it at `offset`.
    ///
    /// # Errors
    ///
    /// Fails on an empty image or an offset outside 32-bit canvas coordinates.
    pub fn build(source: RgbaImage, offset: (i64, i64), palette: &Palette, meta: TemplateMeta) -> Result<Self, TemplateError> {
        if source.width() == 0 || source.height() == 0 {
            return Err(TemplateError::EmptyImage);
        }
        let (Ok(ox), Ok(oy)) = (i32::try_from(offset.0), i32::try_from(offset.1)) else {
            return Err(TemplateError::OffsetOutOfRange(offset.0, offset.1));
        };

        let target = TargetBuffer { ox, oy, width: source.width(), height: source.height(), cells: palette.reduce(&source) };
        Ok(Self { meta, source, target })
    }

    #[must_use]
    pub fn progress(&self, board: &BoardSnapshot) -> ProgressSnapshot {
        self.target.progress(board)
    }
}

#[cfg(test)]
#[path = "template_test.rs"]
mod tests;
