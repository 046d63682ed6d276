//! Palette model and perceptual color matching.
//!
//! DESIGN
//! ======
//! Colors are compared in CIE L*a*b* (sRGB → linear RGB → XYZ/D65 → Lab)
//! with the CIEDE2000 difference. Palette Lab values are computed once when
//! the palette is built; reducing a whole image caches matches per RGB
//! triple since source images rarely use more than a few hundred colors.
//!
//! Index `255` is reserved: it means "transparent" in template targets and
//! "unset" on the board. It is never a real palette entry.

use std::cmp::Ordering;
use std::collections::HashMap;

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, ErrorKind};

/// Reserved index for transparent / unset cells.
pub const TRANSPARENT: u8 = 255;

/// Source pixels with an alpha below this are treated as transparent.
pub const ALPHA_THRESHOLD: u8 = 128;

const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PaletteError {
    #[error("palette is empty")]
    Empty,
    #[error("duplicate palette index {0}")]
    DuplicateIndex(u8),
    #[error("palette index {0} is reserved for transparent cells")]
    ReservedIndex(u8),
    #[error("palette has {0} colors; at most 255 are supported")]
    TooManyColors(usize),
    #[error("invalid hex color `{0}`")]
    InvalidHex(String),
}

impl ErrorCode for PaletteError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Empty => "E_PALETTE_EMPTY",
            Self::DuplicateIndex(_) => "E_PALETTE_DUPLICATE_INDEX",
            Self::ReservedIndex(_) => "E_PALETTE_RESERVED_INDEX",
            Self::TooManyColors(_) => "E_PALETTE_TOO_LARGE",
            Self::InvalidHex(_) => "E_PALETTE_INVALID_HEX",
        }
    }

    fn kind(&self) -> ErrorKind {
        ErrorKind::Data
    }
}

/// One palette entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaletteColor {
    pub index: u8,
    pub name: String,
    pub rgb: [u8; 3],
}

/// Palette entry as published by the canvas server: `{"name": .., "value": "RRGGBB"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HexEntry {
    pub name: String,
    pub value: String,
}

/// CIE L*a*b* color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lab {
    pub l: f64,
    pub a: f64,
    pub b: f64,
}

/// Result of matching one source color against a palette.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Match {
    /// The source color is (mostly) transparent.
    Transparent,
    /// Closest palette entry and its CIEDE2000 distance.
    Color { index: u8, distance: f64 },
}

impl Match {
    /// Target cell value: the palette index, or [`TRANSPARENT`].
    #[must_use]
    pub fn index(self) -> u8 {
        match self {
            Self::Transparent => TRANSPARENT,
            Self::Color { index, .. } => index,
        }
    }
}

/// Ordered palette for one canvas generation.
#[derive(Debug, Clone)]
pub struct Palette {
    /// Sorted by index.
    colors: Vec<PaletteColor>,
    /// Lab value of each entry in `colors`, same order.
    labs: Vec<Lab>,
}

// =============================================================================
// PALETTE
// =============================================================================

impl Palette {
    /// Build a palette from explicit entries.
    ///
    /// # Errors
    ///
    /// Fails if the list is empty, uses an index twice, or uses the reserved
    /// transparent index.
    pub fn new(mut colors: Vec<PaletteColor>) -> Result<Self, PaletteError> {
        if colors.is_empty() {
            return Err(PaletteError::Empty);
        }
        colors.sort_by_key(|c| c.index);
        if let Some(pair) = colors.windows(2).find(|pair| pair[0].index == pair[1].index) {
            return Err(PaletteError::DuplicateIndex(pair[0].index));
        }
        if colors.last().is_some_and(|c| c.index == TRANSPARENT) {
            return Err(PaletteError::ReservedIndex(TRANSPARENT));
        }

        let labs = colors.iter().map(|c| srgb_to_lab(c.rgb)).collect();
        Ok(Self { colors, labs })
    }

    /// Build a palette from server entries; the position in the list is the index.
    ///
    /// # Errors
    ///
    /// Fails on malformed hex values or more than 255 entries.
    pub fn from_hex_entries(entries: &[HexEntry]) -> Result<Self, PaletteError> {
        if entries.len() >= usize::from(TRANSPARENT) + 1 {
            return Err(PaletteError::TooManyColors(entries.len()));
        }
        let colors = entries
            .iter()
            .enumerate()
            .map(|(position, entry)| {
                let index = u8::try_from(position).map_err(|_| PaletteError::TooManyColors(entries.len()))?;
                Ok(PaletteColor { index, name: entry.name.clone(), rgb: parse_hex(&entry.value)? })
            })
            .collect::<Result<Vec<_>, PaletteError>>()?;
        Self::new(colors)
    }

    #[must_use]
    pub fn colors(&self) -> &[PaletteColor] {
        &self.colors
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: u8) -> Option<&PaletteColor> {
        self.colors
            .binary_search_by_key(&index, |c| c.index)
            .ok()
            .map(|position| &self.colors[position])
    }

    #[must_use]
    pub fn contains(&self, index: u8) -> bool {
        self.get(index).is_some()
    }

    /// Closest palette entry to `color`, or [`Match::Transparent`] when the
    /// alpha is below [`ALPHA_THRESHOLD`]. Ties go to the lowest index.
    #[must_use]
    pub fn nearest(&self, color: Rgba<u8>) -> Match {
        if color[3] < ALPHA_THRESHOLD {
            return Match::Transparent;
        }
        self.nearest_rgb([color[0], color[1], color[2]])
    }

    fn nearest_rgb(&self, rgb: [u8; 3]) -> Match {
        let lab = srgb_to_lab(rgb);
        let mut best_index = self.colors[0].index;
        let mut best_distance = f64::INFINITY;

        // Strict comparison over index-sorted entries keeps the lowest index on ties.
        for (color, palette_lab) in self.colors.iter().zip(&self.labs) {
            let distance = ciede2000(lab, *palette_lab);
            if distance < best_distance {
                best_distance = distance;
                best_index = color.index;
            }
        }

        Match::Color { index: best_index, distance: best_distance }
    }

    /// Opaque color of a palette index; unknown indices and [`TRANSPARENT`]
    /// render fully transparent.
    #[must_use]
    pub fn color_of(&self, index: u8) -> Rgba<u8> {
        self.get(index)
            .map_or(CLEAR, |c| Rgba([c.rgb[0], c.rgb[1], c.rgb[2], u8::MAX]))
    }

    /// Classify every pixel of `image`, row-major, into palette indices.
    #[must_use]
    pub fn reduce(&self, image: &RgbaImage) -> Vec<u8> {
        let mut cache: HashMap<[u8; 3], u8> = HashMap::new();
        image
            .pixels()
            .map(|px| {
                if px[3] < ALPHA_THRESHOLD {
                    return TRANSPARENT;
                }
                let rgb = [px[0], px[1], px[2]];
                *cache
                    .entry(rgb)
                    .or_insert_with(|| self.nearest_rgb(rgb).index())
            })
            .collect()
    }

    /// Render a row-major index buffer to an RGBA image.
    #[must_use]
    pub fn render(&self, indices: &[u8], width: u32, height: u32) -> RgbaImage {
        let row = width as usize;
        RgbaImage::from_fn(width, height, |x, y| {
            indices
                .get(y as usize * row + x as usize)
                .map_or(CLEAR, |&index| self.color_of(index))
        })
    }
}

fn parse_hex(raw: &str) -> Result<[u8; 3], PaletteError> {
    let digits = raw.trim().trim_start_matches('#');
    let invalid = || PaletteError::InvalidHex(raw.to_owned());
    if digits.len() != 6 || !digits.is_ascii() {
        return Err(invalid());
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&digits[range], 16).map_err(|_| invalid());
    Ok([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

// =============================================================================
// COLOR SPACE
// =============================================================================

/// sRGB (0-255) to CIE L*a*b* under D65.
#[must_use]
pub fn srgb_to_lab(rgb: [u8; 3]) -> Lab {
    xyz_to_lab(srgb_to_xyz(rgb))
}

fn srgb_to_xyz(rgb: [u8; 3]) -> [f64; 3] {
    let [r, g, b] = rgb.map(|channel| {
        let c = f64::from(channel) / 255.0;
        let linear = if c > 0.040_45 { ((c + 0.055) / 1.055).powf(2.4) } else { c / 12.92 };
        linear * 100.0
    });
    [
        r * 0.4124 + g * 0.3576 + b * 0.1805,
        r * 0.2126 + g * 0.7152 + b * 0.0722,
        r * 0.0193 + g * 0.1192 + b * 0.9505,
    ]
}

fn xyz_to_lab(xyz: [f64; 3]) -> Lab {
    const WHITE: [f64; 3] = [95.047, 100.0, 108.883];
    let f = |t: f64| if t > 0.008_856 { t.cbrt() } else { 7.787 * t + 16.0 / 116.0 };
    let fx = f(xyz[0] / WHITE[0]);
    let fy = f(xyz[1] / WHITE[1]);
    let fz = f(xyz[2] / WHITE[2]);
    Lab { l: 116.0 * fy - 16.0, a: 500.0 * (fx - fy), b: 200.0 * (fy - fz) }
}

// =============================================================================
// CIEDE2000
// =============================================================================

/// CIEDE2000 color difference with unit weighting factors.
#[must_use]
pub fn ciede2000(lab1: Lab, lab2: Lab) -> f64 {
    // Evaluate in a canonical argument order so the result is exactly symmetric.
    let (lab1, lab2) = if lab_order(lab2, lab1) == Ordering::Less { (lab2, lab1) } else { (lab1, lab2) };
    let pow25_7 = 25_f64.powi(7);

    let c1 = lab1.a.hypot(lab1.b);
    let c2 = lab2.a.hypot(lab2.b);
    let c_mean = (c1 + c2) / 2.0;

    let g = 0.5 * (1.0 - (c_mean.powi(7) / (c_mean.powi(7) + pow25_7)).sqrt());
    let a1p = (1.0 + g) * lab1.a;
    let a2p = (1.0 + g) * lab2.a;

    let c1p = a1p.hypot(lab1.b);
    let c2p = a2p.hypot(lab2.b);

    let h1p = lab1.b.atan2(a1p).to_degrees().rem_euclid(360.0);
    let h2p = lab2.b.atan2(a2p).to_degrees().rem_euclid(360.0);
    // Circular hue difference in [-180, 180).
    let dhp = (h2p - h1p + 180.0).rem_euclid(360.0) - 180.0;

    let delta_l = lab2.l - lab1.l;
    let delta_c = c2p - c1p;
    let delta_h = 2.0 * (c1p * c2p).sqrt() * (dhp / 2.0).to_radians().sin();

    let l_mean = (lab1.l + lab2.l) / 2.0;
    let cp_mean = (c1p + c2p) / 2.0;
    let hp_mean = (dhp / 2.0 + h1p).rem_euclid(360.0);

    let t = 1.0 - 0.17 * (hp_mean - 30.0).to_radians().cos()
        + 0.24 * (2.0 * hp_mean).to_radians().cos()
        + 0.32 * (3.0 * hp_mean + 6.0).to_radians().cos()
        - 0.20 * (4.0 * hp_mean - 63.0).to_radians().cos();
    let d_theta = 30.0 * (-((hp_mean - 275.0) / 25.0).powi(2)).exp();

    let r_c = 2.0 * (cp_mean.powi(7) / (cp_mean.powi(7) + pow25_7)).sqrt();
    let s_l = 1.0 + 0.015 * (l_mean - 50.0).powi(2) / (20.0 + (l_mean - 50.0).powi(2)).sqrt();
    let s_c = 1.0 + 0.045 * cp_mean;
    let s_h = 1.0 + 0.015 * cp_mean * t;
    let r_t = -(2.0 * d_theta).to_radians().sin() * r_c;

    let l_term = delta_l / s_l;
    let c_term = delta_c / s_c;
    let h_term = delta_h / s_h;
    (l_term.powi(2) + c_term.powi(2) + h_term.powi(2) + r_t * c_term * h_term).sqrt()
}

/// Perceptual distance between two sRGB colors.
#[must_use]
pub fn distance(a: [u8; 3], b: [u8; 3]) -> f64 {
    ciede2000(srgb_to_lab(a), srgb_to_lab(b))
}

fn lab_order(x: Lab, y: Lab) -> Ordering {
    x.l.total_cmp(&y.l)
        .then(x.a.total_cmp(&y.a))
        .then(x.b.total_cmp(&y.b))
}

#[cfg(test)]
#[path = "palette_test.rs"]
mod tests;
