//! Board service — the live canvas grid shared between ingest and queries.
//!
//! DESIGN
//! ======
//! The grid lives behind `RwLock<Arc<BoardGrid>>`. Readers clone the `Arc`
//! under the read lock and get an immutable [`BoardSnapshot`]; writers take
//! the write lock and mutate through `Arc::make_mut`, which copies the grid
//! only while a snapshot of the current generation is still alive. A reader
//! therefore never sees a grid with half of a batch applied.
//!
//! Only the ingest gate calls the mutators: feed events go through
//! `apply_batch` and a canvas reset through `replace`.
//!
//! ERROR HANDLING
//! ==============
//! Out-of-bounds, reserved-color or invalid-color events are rejected with a data error and
//! leave the grid untouched; the ingest loop logs them and carries on.

use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use feed::{ColorChange, PixelChange};

use crate::error::{ErrorCode, ErrorKind};

/// Board value of a cell that holds no color.
pub const UNSET: u8 = 255;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    #[error("pixel ({x}, {y}) is outside the {width}x{height} board")]
    OutOfBounds { x: u32, y: u32, width: u32, height: u32 },
    #[error("color index {0} is reserved")]
    ReservedColor(u8),
    #[error("feed color {0} is not a palette index or undo marker")]
    InvalidColor(i32),
    #[error("{what} has {actual} cells, expected {expected}")]
    SizeMismatch { what: &'static str, expected: usize, actual: usize },
}

impl ErrorCode for BoardError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::OutOfBounds { .. } => "E_BOARD_OUT_OF_BOUNDS",
            Self::ReservedColor(_) => "E_BOARD_RESERVED_COLOR",
            Self::InvalidColor(_) => "E_BOARD_INVALID_COLOR",
            Self::SizeMismatch { .. } => "E_BOARD_SIZE_MISMATCH",
        }
    }

    fn kind(&self) -> ErrorKind {
        ErrorKind::Data
    }
}

/// Row-major canvas grids for one canvas generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardGrid {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    /// True until any placement lands on the cell.
    virgin: Vec<bool>,
    /// False for cells the canvas does not accept placements on.
    placeable: Vec<bool>,
}

/// Immutable point-in-time view of the board.
#[derive(Debug, Clone)]
pub struct BoardSnapshot {
    grid: Arc<BoardGrid>,
    online_count: Option<u32>,
}

/// Live board shared by the ingest task and query handlers.
#[derive(Debug)]
pub struct BoardState {
    grid: RwLock<Arc<BoardGrid>>,
    online_count: Mutex<Option<u32>>,
}

// =============================================================================
// GRID
// =============================================================================

impl BoardGrid {
    /// All cells unset, virgin and placeable.
    #[must_use]
    pub fn blank(width: u32, height: u32) -> Self {
        let cells = width as usize * height as usize;
        Self {
            width,
            height,
            pixels: vec![UNSET; cells],
            virgin: vec![true; cells],
            placeable: vec![true; cells],
        }
    }

    /// Assemble a grid from hydrated buffers.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::SizeMismatch`] when any buffer is not `width * height` long.
    pub fn from_parts(
        width: u32,
        height: u32,
        pixels: Vec<u8>,
        virgin: Vec<bool>,
        placeable: Vec<bool>,
    ) -> Result<Self, BoardError> {
        let expected = width as usize * height as usize;
        for (what, actual) in [("board", pixels.len()), ("virgin map", virgin.len()), ("placemap", placeable.len())] {
            if actual != expected {
                return Err(BoardError::SizeMismatch { what, expected, actual });
            }
        }
        Ok(Self { width, height, pixels, virgin, placeable })
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Row-major offset of `(x, y)`, `None` off the board.
    #[must_use]
    pub fn offset(&self, x: i64, y: i64) -> Option<usize> {
        let x = u32::try_from(x).ok().filter(|&x| x < self.width)?;
        let y = u32::try_from(y).ok().filter(|&y| y < self.height)?;
        Some(y as usize * self.width as usize + x as usize)
    }

    #[must_use]
    pub fn pixel(&self, x: i64, y: i64) -> Option<u8> {
        self.offset(x, y).map(|i| self.pixels[i])
    }

    #[must_use]
    pub fn is_virgin(&self, x: i64, y: i64) -> bool {
        self.offset(x, y).is_some_and(|i| self.virgin[i])
    }

    #[must_use]
    pub fn is_placeable(&self, x: i64, y: i64) -> bool {
        self.offset(x, y).is_some_and(|i| self.placeable[i])
    }

    fn checked_offset(&self, x: u32, y: u32) -> Result<usize, BoardError> {
        self.offset(i64::from(x), i64::from(y)).ok_or(BoardError::OutOfBounds {
            x,
            y,
            width: self.width,
            height: self.height,
        })
    }

    fn place(&mut self, x: u32, y: u32, color: u8) -> Result<(), BoardError> {
        if color == UNSET {
            return Err(BoardError::ReservedColor(color));
        }
        let i = self.checked_offset(x, y)?;
        self.pixels[i] = color;
        self.virgin[i] = false;
        Ok(())
    }

    fn undo(&mut self, x: u32, y: u32) -> Result<(), BoardError> {
        let i = self.checked_offset(x, y)?;
        self.pixels[i] = UNSET;
        Ok(())
    }

    fn apply_change(&mut self, change: &PixelChange) -> Result<(), BoardError> {
        match change.change() {
            ColorChange::Place(color) => self.place(change.x, change.y, color),
            ColorChange::Clear => self.undo(change.x, change.y),
            ColorChange::Invalid(color) => Err(BoardError::InvalidColor(color)),
        }
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

impl BoardSnapshot {
    #[must_use]
    pub fn online_count(&self) -> Option<u32> {
        self.online_count
    }
}

impl Deref for BoardSnapshot {
    type Target = BoardGrid;

    fn deref(&self) -> &BoardGrid {
        &self.grid
    }
}

impl From<BoardGrid> for BoardSnapshot {
    fn from(grid: BoardGrid) -> Self {
        Self { grid: Arc::new(grid), online_count: None }
    }
}

// =============================================================================
// STATE
// =============================================================================

impl BoardState {
    #[must_use]
    pub fn new(grid: BoardGrid) -> Self {
        Self { grid: RwLock::new(Arc::new(grid)), online_count: Mutex::new(None) }
    }

    /// Consistent copy of the grid and online count.
    #[must_use]
    pub fn snapshot(&self) -> BoardSnapshot {
        let grid = Arc::clone(&self.grid.read().unwrap_or_else(PoisonError::into_inner));
        BoardSnapshot { grid, online_count: self.online_count() }
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        let grid = self.grid.read().unwrap_or_else(PoisonError::into_inner);
        (grid.width, grid.height)
    }

    /// Record a placement and clear the cell's virgin flag.
    ///
    /// # Errors
    ///
    /// Rejects coordinates off the board and the reserved [`UNSET`] color.
    pub fn apply_pixel_event(&self, x: u32, y: u32, color: u8) -> Result<(), BoardError> {
        self.mutate(|grid| grid.place(x, y, color))
    }

    /// Reset a cell to [`UNSET`]. The virgin flag stays cleared.
    ///
    /// # Errors
    ///
    /// Rejects coordinates off the board.
    pub fn apply_undo(&self, x: u32, y: u32) -> Result<(), BoardError> {
        self.mutate(|grid| grid.undo(x, y))
    }

    /// Apply a feed batch in order under one write lock. Rejected changes
    /// are returned; the others still apply.
    pub fn apply_batch(&self, changes: &[PixelChange]) -> Vec<BoardError> {
        self.mutate(|grid| changes.iter().filter_map(|c| grid.apply_change(c).err()).collect())
    }

    pub fn set_online_count(&self, count: u32) {
        *self.online_count.lock().unwrap_or_else(PoisonError::into_inner) = Some(count);
    }

    /// Mark the online count unknown, e.g. while the feed is disconnected.
    pub fn clear_online_count(&self) {
        *self.online_count.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    #[must_use]
    pub fn online_count(&self) -> Option<u32> {
        *self.online_count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Swap in a freshly hydrated grid (canvas reset).
    pub fn replace(&self, grid: BoardGrid) {
        *self.grid.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(grid);
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut BoardGrid) -> R) -> R {
        let mut guard = self.grid.write().unwrap_or_else(PoisonError::into_inner);
        f(Arc::make_mut(&mut guard))
    }
}

#[cfg(test)]
#[path = "board_test.rs"]
mod tests;
