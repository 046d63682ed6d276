use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use feed::{FeedMessage, PixelChange};
use tokio::time::{sleep, timeout};

use super::*;
use crate::services::board::BoardState;
use crate::state::test_helpers::test_palette;

/// Publishes whatever info it currently holds; hydrates a blank grid of that size.
struct ScriptedSource {
    info: Mutex<CanvasInfo>,
    hydrations: AtomicUsize,
    fail_hydrate: bool,
}

impl ScriptedSource {
    fn new(info: CanvasInfo) -> Self {
        Self { info: Mutex::new(info), hydrations: AtomicUsize::new(0), fail_hydrate: false }
    }

    fn publish(&self, info: CanvasInfo) {
        *self.info.lock().expect("info lock") = info;
    }

    fn hydrations(&self) -> usize {
        self.hydrations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CanvasSource for ScriptedSource {
    async fn fetch_info(&self, _cooldown_fallback: CooldownParams) -> Result<CanvasInfo, BootstrapError> {
        Ok(self.info.lock().expect("info lock").clone())
    }

    async fn hydrate(&self, info: &CanvasInfo) -> Result<BoardGrid, BootstrapError> {
        self.hydrations.fetch_add(1, Ordering::SeqCst);
        if self.fail_hydrate {
            return Err(BootstrapError::Status { endpoint: "boarddata", status: 503 });
        }
        Ok(BoardGrid::blank(info.width, info.height))
    }
}

fn info(code: &str, width: u32, height: u32) -> CanvasInfo {
    CanvasInfo {
        canvas_code: code.into(),
        width,
        height,
        palette: test_palette(),
        cooldown: CooldownPolicy::Activity(CooldownParams::default()),
    }
}

fn tracked(code: &str, width: u32, height: u32) -> (CanvasSlot, Arc<IngestGate>) {
    let slot = CanvasSlot::new(CanvasMeta::from(info(code, width, height)));
    let board = Arc::new(BoardState::new(BoardGrid::blank(width, height)));
    (slot, Arc::new(IngestGate::new(board, 16)))
}

fn pixel_message(x: u32, y: u32, color: i32) -> FeedMessage {
    FeedMessage::Pixel { pixels: vec![PixelChange { x, y, color }] }
}

#[tokio::test]
async fn same_canvas_keeps_board_and_updates_settings() {
    let (slot, gate) = tracked("7", 2, 2);
    gate.dispatch(pixel_message(1, 1, 2));

    let mut next = info("7", 2, 2);
    next.cooldown = CooldownPolicy::Static { seconds: 30.0, stack_multiplier: 1.0 };
    let source = ScriptedSource::new(next);

    let outcome = refresh_once(&source, &slot, &gate, CooldownParams::default()).await.expect("refresh");
    assert_eq!(outcome, RefreshOutcome::Unchanged);
    assert_eq!(source.hydrations(), 0);
    assert_eq!(gate.board().snapshot().pixel(1, 1), Some(2));
    assert_eq!(slot.current().cooldown, CooldownPolicy::Static { seconds: 30.0, stack_multiplier: 1.0 });
}

#[tokio::test]
async fn new_canvas_code_rehydrates_and_swaps_metadata() {
    let (slot, gate) = tracked("7", 2, 2);
    gate.dispatch(pixel_message(0, 0, 1));
    let before = slot.current();

    let source = ScriptedSource::new(info("8", 5, 3));
    let outcome = refresh_once(&source, &slot, &gate, CooldownParams::default()).await.expect("refresh");

    assert_eq!(outcome, RefreshOutcome::Reset { from: "7".into(), to: "8".into() });
    assert_eq!(source.hydrations(), 1);
    assert_eq!(slot.current().canvas_code, "8");
    assert_eq!(gate.board().dimensions(), (5, 3));
    assert!(gate.board().snapshot().is_virgin(0, 0));

    // Metadata handed out earlier stays consistent.
    assert_eq!(before.canvas_code, "7");

    // Events for the new size now apply.
    gate.dispatch(pixel_message(4, 2, 1));
    assert_eq!(gate.board().snapshot().pixel(4, 2), Some(1));
}

#[tokio::test]
async fn resized_canvas_with_same_code_is_rehydrated() {
    let (slot, gate) = tracked("7", 2, 2);
    let source = ScriptedSource::new(info("7", 4, 4));

    let outcome = refresh_once(&source, &slot, &gate, CooldownParams::default()).await.expect("refresh");
    assert!(matches!(outcome, RefreshOutcome::Reset { .. }));
    assert_eq!(gate.board().dimensions(), (4, 4));
}

#[tokio::test]
async fn failed_hydration_keeps_current_generation() {
    let (slot, gate) = tracked("7", 2, 2);
    gate.dispatch(pixel_message(0, 0, 1));
    let mut source = ScriptedSource::new(info("8", 5, 3));
    source.fail_hydrate = true;

    let err = refresh_once(&source, &slot, &gate, CooldownParams::default()).await.expect_err("hydrate fails");
    assert_eq!(err.error_code(), "E_BOOTSTRAP_STATUS");
    assert_eq!(slot.current().canvas_code, "7");
    assert_eq!(gate.board().dimensions(), (2, 2));
    assert_eq!(gate.board().snapshot().pixel(0, 0), Some(1));
}

#[tokio::test]
async fn reset_discards_messages_queued_for_old_board() {
    let (slot, gate) = tracked("7", 2, 2);
    let source = ScriptedSource::new(info("8", 2, 2));

    let _paused = gate.paused();
    gate.dispatch(pixel_message(0, 0, 1));
    refresh_once(&source, &slot, &gate, CooldownParams::default()).await.expect("refresh");
    assert_eq!(gate.resume(), 0);
    assert_eq!(gate.board().snapshot().pixel(0, 0), Some(crate::services::board::UNSET));
}

#[tokio::test]
async fn refresh_task_follows_reset() {
    let (slot, gate) = tracked("7", 2, 2);
    let slot = Arc::new(slot);
    let source = Arc::new(ScriptedSource::new(info("7", 2, 2)));

    let task = spawn_refresh(
        Arc::clone(&source) as Arc<dyn CanvasSource>,
        Arc::clone(&slot),
        Arc::clone(&gate),
        CooldownParams::default(),
        Duration::from_millis(10),
    );
    source.publish(info("9", 3, 3));

    timeout(Duration::from_secs(2), async {
        while slot.current().canvas_code != "9" {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("reset not observed in time");
    assert_eq!(gate.board().dimensions(), (3, 3));
    task.abort();
}
