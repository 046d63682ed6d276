//! Wire model and JSON codec for the realtime canvas feed.
//!
//! This crate owns the message shapes pushed by the canvas server over its
//! websocket. Messages are discriminated by a `type` field; anything the
//! tracker does not understand decodes to [`FeedMessage::Unknown`] so new
//! server message kinds never break ingestion.

use serde::{Deserialize, Serialize};

/// Color value the server uses for a cleared cell.
pub const CLEARED_COLOR: i32 = 255;

/// Error returned by [`decode_message`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The payload was not valid JSON or did not match any message shape.
    #[error("failed to decode feed message: {0}")]
    Json(#[from] serde_json::Error),
}

/// One message on the realtime feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeedMessage {
    /// A batch of pixel changes, in the order the server applied them.
    Pixel { pixels: Vec<PixelChange> },
    /// Current number of connected users.
    Users { count: u32 },
    /// Any message kind the tracker does not consume.
    #[serde(other)]
    Unknown,
}

/// A single cell change inside a [`FeedMessage::Pixel`] batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelChange {
    pub x: u32,
    pub y: u32,
    /// Palette index, or a negative / cleared value when the cell was undone.
    #[serde(alias = "color_index")]
    pub color: i32,
}

/// What a [`PixelChange`] does to its cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorChange {
    /// Paint the cell with this palette index.
    Place(u8),
    /// The cell was undone or cleared.
    Clear,
    /// Color above the cleared marker; no valid meaning.
    Invalid(i32),
}

impl PixelChange {
    /// Classify the color: negative values and [`CLEARED_COLOR`] clear the
    /// cell, anything larger is invalid.
    #[must_use]
    pub fn change(&self) -> ColorChange {
        match u8::try_from(self.color) {
            Ok(index) if i32::from(index) != CLEARED_COLOR => ColorChange::Place(index),
            Ok(_) => ColorChange::Clear,
            Err(_) if self.color < 0 => ColorChange::Clear,
            Err(_) => ColorChange::Invalid(self.color),
        }
    }
}

/// Decode one feed payload (text or binary websocket frame body).
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the payload is not a JSON object with a
/// `type` field or a known message has the wrong shape.
pub fn decode_message(bytes: &[u8]) -> Result<FeedMessage, CodecError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Encode a message the way the server sends it.
#[must_use]
pub fn encode_message(message: &FeedMessage) -> Vec<u8> {
    // Serializing these plain structs into a Vec cannot fail.
    serde_json::to_vec(message).unwrap_or_default()
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
