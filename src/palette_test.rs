use super::*;

fn lab(l: f64, a: f64, b: f64) -> Lab {
    Lab { l, a, b }
}

fn entry(index: u8, name: &str, rgb: [u8; 3]) -> PaletteColor {
    PaletteColor { index, name: name.to_owned(), rgb }
}

fn sample_palette() -> Palette {
    Palette::new(vec![
        entry(0, "White", [255, 255, 255]),
        entry(1, "Black", [0, 0, 0]),
        entry(2, "Red", [255, 0, 0]),
        entry(3, "Green", [0, 200, 0]),
        entry(4, "Blue", [0, 0, 255]),
        entry(5, "Yellow", [255, 230, 0]),
    ])
    .expect("valid palette")
}

fn assert_close(actual: f64, expected: f64) {
    assert!((actual - expected).abs() < 1e-4, "expected {expected}, got {actual}");
}

// =============================================================================
// CIEDE2000
// =============================================================================

#[test]
fn ciede2000_matches_published_reference_pairs() {
    assert_close(ciede2000(lab(50.0, 2.6772, -79.7751), lab(50.0, 0.0, -82.7485)), 2.0425);
    assert_close(ciede2000(lab(50.0, 0.0, 0.0), lab(50.0, -1.0, 2.0)), 2.3669);
    assert_close(ciede2000(lab(50.0, 2.5, 0.0), lab(73.0, 25.0, -18.0)), 27.1492);
    assert_close(ciede2000(lab(50.0, 2.5, 0.0), lab(61.0, -5.0, 29.0)), 22.8977);
    assert_close(ciede2000(lab(60.2574, -34.0099, 36.2677), lab(60.4626, -34.1751, 39.4387)), 1.2644);
}

#[test]
fn distance_is_symmetric() {
    let colors = [[255, 0, 0], [12, 200, 34], [0, 0, 0], [255, 255, 255], [128, 64, 250], [3, 3, 4]];
    for a in colors {
        for b in colors {
            assert_eq!(distance(a, b).to_bits(), distance(b, a).to_bits(), "{a:?} vs {b:?}");
        }
    }
}

#[test]
fn distance_to_self_is_zero() {
    for rgb in [[0, 0, 0], [255, 255, 255], [34, 120, 200], [250, 1, 90]] {
        assert_eq!(distance(rgb, rgb), 0.0);
    }
}

#[test]
fn srgb_white_and_black_land_on_lab_extremes() {
    let white = srgb_to_lab([255, 255, 255]);
    assert!((white.l - 100.0).abs() < 0.01);
    assert!(white.a.abs() < 0.05 && white.b.abs() < 0.05);

    let black = srgb_to_lab([0, 0, 0]);
    assert!(black.l.abs() < 1e-9);
}

// =============================================================================
// NEAREST
// =============================================================================

#[test]
fn nearest_picks_perceptually_closest_entry() {
    let palette = sample_palette();
    assert_eq!(palette.nearest(Rgba([250, 10, 5, 255])).index(), 2);
    assert_eq!(palette.nearest(Rgba([10, 10, 20, 255])).index(), 1);
    assert_eq!(palette.nearest(Rgba([245, 245, 240, 255])).index(), 0);
}

#[test]
fn nearest_of_exact_entry_has_zero_distance() {
    let palette = sample_palette();
    assert_eq!(palette.nearest(Rgba([0, 0, 255, 255])), Match::Color { index: 4, distance: 0.0 });
}

#[test]
fn nearest_always_returns_a_palette_index() {
    let palette = Palette::new(vec![entry(7, "A", [10, 20, 30]), entry(42, "B", [200, 100, 0])]).expect("palette");
    for r in (0..=255).step_by(51) {
        for g in (0..=255).step_by(51) {
            for b in (0..=255).step_by(51) {
                let found = palette.nearest(Rgba([r, g, b, 255])).index();
                assert!(palette.contains(found), "index {found} not in palette");
            }
        }
    }
}

#[test]
fn equidistant_entries_resolve_to_lowest_index() {
    let palette = Palette::new(vec![
        entry(5, "Second", [90, 90, 90]),
        entry(3, "First", [90, 90, 90]),
        entry(8, "Other", [255, 255, 255]),
    ])
    .expect("palette");
    assert_eq!(palette.nearest(Rgba([80, 80, 80, 255])).index(), 3);
    assert_eq!(palette.reduce(&RgbaImage::from_pixel(1, 1, Rgba([90, 90, 90, 255]))), vec![3]);
}

#[test]
fn alpha_below_threshold_is_transparent() {
    let palette = sample_palette();
    assert_eq!(palette.nearest(Rgba([255, 0, 0, 0])), Match::Transparent);
    assert_eq!(palette.nearest(Rgba([255, 0, 0, ALPHA_THRESHOLD - 1])), Match::Transparent);
    assert_eq!(palette.nearest(Rgba([255, 0, 0, ALPHA_THRESHOLD])).index(), 2);
    assert_eq!(Match::Transparent.index(), TRANSPARENT);
}

// =============================================================================
// RENDER / REDUCE
// =============================================================================

#[test]
fn render_then_reduce_reproduces_indices() {
    let palette = sample_palette();
    let indices = vec![0, 1, 2, 3, 4, 5, TRANSPARENT, 2, 2];
    let image = palette.render(&indices, 3, 3);
    assert_eq!(palette.reduce(&image), indices);
}

#[test]
fn render_unknown_index_is_clear() {
    let palette = sample_palette();
    let image = palette.render(&[TRANSPARENT, 99], 2, 1);
    assert_eq!(image.get_pixel(0, 0)[3], 0);
    assert_eq!(image.get_pixel(1, 0)[3], 0);
}

// =============================================================================
// CONSTRUCTION
// =============================================================================

#[test]
fn from_hex_entries_uses_list_position_as_index() {
    let palette = Palette::from_hex_entries(&[
        HexEntry { name: "White".into(), value: "FFFFFF".into() },
        HexEntry { name: "Cyan".into(), value: "#00c8ff".into() },
    ])
    .expect("hex palette");
    assert_eq!(palette.len(), 2);
    assert_eq!(palette.get(1).map(|c| c.rgb), Some([0x00, 0xc8, 0xff]));
    assert_eq!(palette.get(1).map(|c| c.name.as_str()), Some("Cyan"));
}

#[test]
fn invalid_palettes_are_rejected() {
    assert!(matches!(Palette::new(Vec::new()), Err(PaletteError::Empty)));
    assert!(matches!(
        Palette::new(vec![entry(1, "A", [0, 0, 0]), entry(1, "B", [1, 1, 1])]),
        Err(PaletteError::DuplicateIndex(1))
    ));
    assert!(matches!(Palette::new(vec![entry(TRANSPARENT, "A", [0, 0, 0])]), Err(PaletteError::ReservedIndex(_))));

    let err = Palette::from_hex_entries(&[HexEntry { name: "Bad".into(), value: "12345G".into() }])
        .expect_err("invalid hex");
    assert_eq!(err.error_code(), "E_PALETTE_INVALID_HEX");
    assert_eq!(err.kind(), ErrorKind::Data);
}
