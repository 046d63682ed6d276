//! Canvas archives — log parsing, per-user placemap replay and the on-disk
//! archive layout.
//!
//! DESIGN
//! ======
//! Each finished canvas keeps an append-only, tab-separated log:
//! `timestamp \t hash \t x \t y \t color \t action`. The hash is the hex
//! SHA-256 of `"timestamp,x,y,color,user_key"`, so only the holder of a
//! user key can tell which events are theirs.
//!
//! Replay walks the log strictly in file order and keeps two grids: the
//! user's placemap (what they placed and did not undo) and a "survived" grid
//! tracking which of their pixels still stand, which drives the
//! replaced-by-others / replaced-by-owner counters.
//!
//! ERROR HANDLING
//! ==============
//! A malformed or out-of-bounds line fails the whole replay with its line
//! number; counters must never be silently wrong.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use image::RgbaImage;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::board::UNSET;
use crate::error::{ErrorCode, ErrorKind};
use crate::palette::{HexEntry, Palette, PaletteError};

const PALETTE_FILE: &str = "palette.json";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("invalid canvas code `{0}`")]
    InvalidCanvasCode(String),
    #[error("no archive for canvas {0}")]
    UnknownCanvas(String),
    #[error("no log file for canvas {0}")]
    MissingLog(String),
    #[error("no final image for canvas {0}")]
    MissingImage(String),
    #[error("palette not found for c{0}")]
    MissingPalette(String),
    #[error("log line {line}: {reason}")]
    MalformedLine { line: usize, reason: String },
    #[error("log line {line}: pixel ({x}, {y}) is outside the {width}x{height} canvas")]
    OutOfBounds { line: usize, x: u32, y: u32, width: u32, height: u32 },
    #[error("archive io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("archive palette is not valid json: {0}")]
    PaletteJson(#[from] serde_json::Error),
    #[error(transparent)]
    Palette(#[from] PaletteError),
}

impl ErrorCode for ArchiveError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidCanvasCode(_) => "E_ARCHIVE_CANVAS_CODE",
            Self::UnknownCanvas(_) => "E_ARCHIVE_UNKNOWN_CANVAS",
            Self::MissingLog(_) => "E_ARCHIVE_MISSING_LOG",
            Self::MissingImage(_) => "E_ARCHIVE_MISSING_IMAGE",
            Self::MissingPalette(_) => "E_ARCHIVE_MISSING_PALETTE",
            Self::MalformedLine { .. } => "E_ARCHIVE_MALFORMED_LINE",
            Self::OutOfBounds { .. } => "E_ARCHIVE_OUT_OF_BOUNDS",
            Self::Io(_) => "E_ARCHIVE_IO",
            Self::Image(_) => "E_ARCHIVE_IMAGE",
            Self::PaletteJson(_) => "E_ARCHIVE_PALETTE_JSON",
            Self::Palette(e) => e.error_code(),
        }
    }

    fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCanvasCode(_)
            | Self::UnknownCanvas(_)
            | Self::MissingLog(_)
            | Self::MissingImage(_)
            | Self::MissingPalette(_) => ErrorKind::Input,
            Self::MalformedLine { .. } | Self::OutOfBounds { .. } | Self::Image(_) | Self::PaletteJson(_) | Self::Palette(_) => {
                ErrorKind::Data
            }
            Self::Io(_) => ErrorKind::Fatal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogAction {
    Place,
    Undo,
    /// Moderation and other server-side actions. They never belong to a user
    /// key but still overwrite cells.
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub timestamp: String,
    pub hash: String,
    pub x: u32,
    pub y: u32,
    pub color: i32,
    pub action: LogAction,
}

/// A user's reconstructed contribution to one canvas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacemapResult {
    pub width: u32,
    pub height: u32,
    /// Row-major palette indices, [`UNSET`] where the user left nothing.
    pub placemap: Vec<u8>,
    pub counters: PlacemapCounters,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlacemapCounters {
    pub undo_count: u64,
    pub placed_count: u64,
    pub replaced_by_others_count: u64,
    pub replaced_by_owner_count: u64,
}

// =============================================================================
// LOG LINES
// =============================================================================

/// Hex SHA-256 ownership digest of one log event.
#[must_use]
pub fn ownership_hash(timestamp: &str, x: u32, y: u32, color: i32, user_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{timestamp},{x},{y},{color},{user_key}").as_bytes());
    let bytes = hasher.finalize();
    bytes.iter().map(|b| format!("{b:02x}")).collect::<String>()
}

/// Parse one log line. `line` is the 1-based line number used in errors.
///
/// # Errors
///
/// [`ArchiveError::MalformedLine`] on a wrong field count, non-numeric
/// coordinates or color, or a placement with an invalid color.
pub fn parse_log_line(line: usize, text: &str) -> Result<LogEvent, ArchiveError> {
    let malformed = |reason: String| ArchiveError::MalformedLine { line, reason };

    let fields: Vec<&str> = text.split('\t').collect();
    let [timestamp, hash, x, y, color, action] = fields.as_slice() else {
        return Err(malformed(format!("expected 6 fields, found {}", fields.len())));
    };

    let x: u32 = x.trim().parse().map_err(|_| malformed(format!("invalid x `{x}`")))?;
    let y: u32 = y.trim().parse().map_err(|_| malformed(format!("invalid y `{y}`")))?;
    let color: i32 = color.trim().parse().map_err(|_| malformed(format!("invalid color `{color}`")))?;

    let action = match action.trim() {
        "user place" => LogAction::Place,
        "user undo" => LogAction::Undo,
        other => LogAction::Other(other.to_owned()),
    };
    if action == LogAction::Place && !(0..i32::from(UNSET)).contains(&color) {
        return Err(malformed(format!("placement with invalid color {color}")));
    }

    Ok(LogEvent { timestamp: (*timestamp).to_owned(), hash: hash.trim().to_owned(), x, y, color, action })
}

// =============================================================================
// REPLAY
// =============================================================================

/// Incremental placemap replay over events in log order.
#[derive(Debug)]
pub struct Replayer<'k> {
    user_key: &'k str,
    width: u32,
    height: u32,
    placemap: Vec<u8>,
    survived: Vec<u8>,
    counters: PlacemapCounters,
}

impl<'k> Replayer<'k> {
    #[must_use]
    pub fn new(user_key: &'k str, width: u32, height: u32) -> Self {
        let cells = width as usize * height as usize;
        Self {
            user_key,
            width,
            height,
            placemap: vec![UNSET; cells],
            survived: vec![UNSET; cells],
            counters: PlacemapCounters::default(),
        }
    }

    /// Apply the next event. `line` is only used in errors.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::OutOfBounds`] for coordinates outside the canvas.
    pub fn apply(&mut self, line: usize, event: &LogEvent) -> Result<(), ArchiveError> {
        if event.x >= self.width || event.y >= self.height {
            return Err(ArchiveError::OutOfBounds { line, x: event.x, y: event.y, width: self.width, height: self.height });
        }
        let i = event.y as usize * self.width as usize + event.x as usize;

        let owned = ownership_hash(&event.timestamp, event.x, event.y, event.color, self.user_key) == event.hash;
        if !owned {
            if self.survived[i] != UNSET {
                self.counters.replaced_by_others_count += 1;
                self.survived[i] = UNSET;
            }
            return Ok(());
        }

        match event.action {
            LogAction::Place => {
                self.counters.placed_count += 1;
                if self.survived[i] != UNSET {
                    self.counters.replaced_by_owner_count += 1;
                }
                // Validated by parse_log_line; anything else stays unset.
                let color = u8::try_from(event.color).unwrap_or(UNSET);
                self.placemap[i] = color;
                self.survived[i] = color;
            }
            LogAction::Undo => {
                self.counters.undo_count += 1;
                self.placemap[i] = UNSET;
                self.survived[i] = UNSET;
            }
            LogAction::Other(_) => {}
        }
        Ok(())
    }

    #[must_use]
    pub fn finish(self) -> PlacemapResult {
        PlacemapResult { width: self.width, height: self.height, placemap: self.placemap, counters: self.counters }
    }
}

/// Replay parsed events in order for `user_key` on a `width x height` canvas.
///
/// # Errors
///
/// [`ArchiveError::OutOfBounds`] with the 1-based event position.
pub fn replay(events: &[LogEvent], user_key: &str, dimensions: (u32, u32)) -> Result<PlacemapResult, ArchiveError> {
    let mut replayer = Replayer::new(user_key, dimensions.0, dimensions.1);
    for (i, event) in events.iter().enumerate() {
        replayer.apply(i + 1, event)?;
    }
    Ok(replayer.finish())
}

/// Stream a log through the replay. Empty lines are skipped.
///
/// # Errors
///
/// I/O failures and any malformed or out-of-bounds line.
pub fn replay_log(reader: impl BufRead, user_key: &str, dimensions: (u32, u32)) -> Result<PlacemapResult, ArchiveError> {
    let mut replayer = Replayer::new(user_key, dimensions.0, dimensions.1);
    for (i, text) in reader.lines().enumerate() {
        let text = text?;
        if text.trim().is_empty() {
            continue;
        }
        let event = parse_log_line(i + 1, &text)?;
        replayer.apply(i + 1, &event)?;
    }
    Ok(replayer.finish())
}

impl PlacemapResult {
    /// Render the placemap; cells the user does not own are transparent.
    #[must_use]
    pub fn render(&self, palette: &Palette) -> RgbaImage {
        palette.render(&self.placemap, self.width, self.height)
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Archived canvases under `<root>/<canvas_code>/`.
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    root: PathBuf,
}

impl ArchiveStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canvas codes with an archive directory, sorted.
    ///
    /// # Errors
    ///
    /// I/O failures other than a missing root.
    pub fn canvas_codes(&self) -> Result<Vec<String>, ArchiveError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut codes = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                codes.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        codes.sort();
        Ok(codes)
    }

    fn canvas_dir(&self, canvas_code: &str) -> Result<PathBuf, ArchiveError> {
        let valid = !canvas_code.is_empty()
            && canvas_code != "."
            && canvas_code != ".."
            && !canvas_code.contains(['/', '\\']);
        if !valid {
            return Err(ArchiveError::InvalidCanvasCode(canvas_code.to_owned()));
        }
        let dir = self.root.join(canvas_code);
        if !dir.is_dir() {
            return Err(ArchiveError::UnknownCanvas(canvas_code.to_owned()));
        }
        Ok(dir)
    }

    /// First `*.log` file under the canvas directory.
    ///
    /// # Errors
    ///
    /// Unknown canvas or no log file.
    pub fn log_path(&self, canvas_code: &str) -> Result<PathBuf, ArchiveError> {
        let dir = self.canvas_dir(canvas_code)?;
        find_file(&dir, &|path| path.extension().is_some_and(|ext| ext == "log"))?
            .ok_or_else(|| ArchiveError::MissingLog(canvas_code.to_owned()))
    }

    /// The `final c<code>.png` image of a canvas.
    ///
    /// # Errors
    ///
    /// Unknown canvas or no final image.
    pub fn final_image_path(&self, canvas_code: &str) -> Result<PathBuf, ArchiveError> {
        let dir = self.canvas_dir(canvas_code)?;
        let name = format!("final c{canvas_code}.png");
        find_file(&dir, &|path| path.file_name().is_some_and(|n| *n == *name))?
            .ok_or_else(|| ArchiveError::MissingImage(canvas_code.to_owned()))
    }

    /// Canvas size, read from the final image header.
    ///
    /// # Errors
    ///
    /// Missing or unreadable final image.
    pub fn dimensions(&self, canvas_code: &str) -> Result<(u32, u32), ArchiveError> {
        Ok(image::image_dimensions(self.final_image_path(canvas_code)?)?)
    }

    /// Palette in effect for a canvas, from its `palette.json`.
    ///
    /// # Errors
    ///
    /// Missing, malformed or invalid palette file.
    pub fn palette(&self, canvas_code: &str) -> Result<Palette, ArchiveError> {
        let path = self.canvas_dir(canvas_code)?.join(PALETTE_FILE);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ArchiveError::MissingPalette(canvas_code.to_owned()));
            }
            Err(e) => return Err(e.into()),
        };
        let entries: Vec<HexEntry> = serde_json::from_slice(&raw)?;
        Ok(Palette::from_hex_entries(&entries)?)
    }

    /// Replay a canvas log for `user_key`. CPU- and IO-bound; call off the
    /// async path.
    ///
    /// # Errors
    ///
    /// Any lookup, IO or replay failure.
    pub fn placemap(&self, canvas_code: &str, user_key: &str) -> Result<(PlacemapResult, Palette), ArchiveError> {
        let log = self.log_path(canvas_code)?;
        let dimensions = self.dimensions(canvas_code)?;
        let palette = self.palette(canvas_code)?;
        debug!(%canvas_code, log = %log.display(), ?dimensions, "replaying canvas log");

        let result = replay_log(BufReader::new(File::open(&log)?), user_key, dimensions)?;
        Ok((result, palette))
    }
}

/// Depth-first search in sorted directory order.
fn find_file(dir: &Path, matches: &dyn Fn(&Path) -> bool) -> Result<Option<PathBuf>, ArchiveError> {
    let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(std::fs::DirEntry::file_name);

    for entry in entries {
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            if let Some(found) = find_file(&path, matches)? {
                return Ok(Some(found));
            }
        } else if matches(&path) {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

#[cfg(test)]
#[path = "archive_test.rs"]
mod tests;
