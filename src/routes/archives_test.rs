use std::fs;
use std::path::Path;

use axum::http::StatusCode;
use image::RgbaImage;

use super::*;
use crate::services::archive::ownership_hash;
use crate::state::test_helpers::{MemoryFetcher, test_config, untracked_state};

const KEY: &str = "owner-key";

fn log_line(timestamp: &str, x: u32, y: u32, color: i32, key: &str) -> String {
    let hash = ownership_hash(timestamp, x, y, color, key);
    format!("{timestamp}\t{hash}\t{x}\t{y}\t{color}\tuser place")
}

fn archive_state(root: &Path) -> AppState {
    let mut config = test_config();
    config.archive_dir = root.to_path_buf();
    untracked_state(config, MemoryFetcher::default())
}

fn seed(root: &Path, code: &str) {
    let dir = root.join(code);
    fs::create_dir_all(&dir).expect("mkdir");
    let log = [log_line("t1", 0, 0, 1, KEY), log_line("t2", 1, 0, 0, "other"), log_line("t3", 0, 0, 0, KEY)].join("\n");
    fs::write(dir.join("pixels.log"), log).expect("write log");
    RgbaImage::new(2, 1).save(dir.join(format!("final c{code}.png"))).expect("write png");
    fs::write(dir.join("palette.json"), r#"[{"name":"White","value":"FFFFFF"},{"name":"Black","value":"000000"}]"#)
        .expect("write palette");
}

fn header(response: &Response, name: &str) -> String {
    response.headers()[name].to_str().expect("ascii header").to_owned()
}

#[tokio::test]
async fn lists_archived_canvases() {
    let tmp = tempfile::tempdir().expect("tempdir");
    seed(tmp.path(), "9");
    seed(tmp.path(), "10");

    let Json(codes) = list_canvases(State(archive_state(tmp.path()))).await.expect("list");
    assert_eq!(codes, vec!["10".to_owned(), "9".to_owned()]);
}

#[tokio::test]
async fn placemap_returns_png_with_counters() {
    let tmp = tempfile::tempdir().expect("tempdir");
    seed(tmp.path(), "9");

    let body = PlacemapBody { canvas_code: "9".into(), user_key: KEY.into() };
    let response = placemap(State(archive_state(tmp.path())), Json(body)).await.expect("placemap");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "image/png");
    assert_eq!(header(&response, "x-placed-count"), "2");
    assert_eq!(header(&response, "x-replaced-by-owner"), "1");
    assert_eq!(header(&response, "x-replaced-by-others"), "0");

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let image = image::load_from_memory(&bytes).expect("png").to_rgba8();
    assert_eq!(image.dimensions(), (2, 1));
    assert_eq!(image.get_pixel(0, 0).0, [255, 255, 255, 255]);
    assert_eq!(image.get_pixel(1, 0)[3], 0);
}

#[tokio::test]
async fn unknown_canvas_is_a_bad_request() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let body = PlacemapBody { canvas_code: "404".into(), user_key: KEY.into() };

    let err = placemap(State(archive_state(tmp.path())), Json(body)).await.err().expect("unknown canvas");
    assert_eq!(err.status, StatusCode::BAD_REQUEST);
    assert_eq!(err.code, "E_ARCHIVE_UNKNOWN_CANVAS");
}

#[tokio::test]
async fn blank_user_key_is_rejected() {
    let tmp = tempfile::tempdir().expect("tempdir");
    seed(tmp.path(), "9");
    let body = PlacemapBody { canvas_code: "9".into(), user_key: "  ".into() };

    let err = placemap(State(archive_state(tmp.path())), Json(body)).await.err().expect("blank key");
    assert_eq!(err.code, "E_USER_KEY_EMPTY");
}
