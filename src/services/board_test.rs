use super::*;

fn change(x: u32, y: u32, color: i32) -> PixelChange {
    PixelChange { x, y, color }
}

#[test]
fn blank_board_is_unset_and_virgin() {
    let board = BoardState::new(BoardGrid::blank(3, 2));
    let snap = board.snapshot();
    assert_eq!(snap.pixels(), &[UNSET; 6]);
    assert!(snap.is_virgin(2, 1));
    assert!(snap.is_placeable(0, 0));
    assert_eq!(snap.online_count(), None);
}

#[test]
fn pixel_event_sets_color_and_clears_virgin() {
    let board = BoardState::new(BoardGrid::blank(4, 4));
    board.apply_pixel_event(1, 2, 7).expect("in bounds");

    let snap = board.snapshot();
    assert_eq!(snap.pixel(1, 2), Some(7));
    assert!(!snap.is_virgin(1, 2));
    assert!(snap.is_virgin(2, 1));
}

#[test]
fn undo_unsets_cell_but_keeps_it_non_virgin() {
    let board = BoardState::new(BoardGrid::blank(2, 2));
    board.apply_pixel_event(0, 1, 3).expect("place");
    board.apply_undo(0, 1).expect("undo");

    let snap = board.snapshot();
    assert_eq!(snap.pixel(0, 1), Some(UNSET));
    assert!(!snap.is_virgin(0, 1));
}

#[test]
fn out_of_bounds_events_are_rejected_without_mutation() {
    let board = BoardState::new(BoardGrid::blank(2, 2));
    let before = board.snapshot();

    let err = board.apply_pixel_event(2, 0, 1).expect_err("x out of bounds");
    assert_eq!(err, BoardError::OutOfBounds { x: 2, y: 0, width: 2, height: 2 });
    assert_eq!(err.kind(), ErrorKind::Data);
    assert!(board.apply_undo(0, 5).is_err());

    assert_eq!(board.snapshot().pixels(), before.pixels());
}

#[test]
fn reserved_color_is_rejected() {
    let board = BoardState::new(BoardGrid::blank(1, 1));
    assert_eq!(board.apply_pixel_event(0, 0, UNSET), Err(BoardError::ReservedColor(UNSET)));
    assert!(board.snapshot().is_virgin(0, 0));
}

#[test]
fn color_above_cleared_marker_leaves_cell_untouched() {
    let board = BoardState::new(BoardGrid::blank(1, 1));
    assert!(board.apply_batch(&[change(0, 0, 3)]).is_empty());

    let errors = board.apply_batch(&[change(0, 0, 300)]);
    assert_eq!(errors, vec![BoardError::InvalidColor(300)]);
    assert_eq!(errors[0].error_code(), "E_BOARD_INVALID_COLOR");
    assert_eq!(board.snapshot().pixel(0, 0), Some(3));
}

#[test]
fn snapshot_is_unaffected_by_later_mutation() {
    let board = BoardState::new(BoardGrid::blank(2, 1));
    board.apply_pixel_event(0, 0, 1).expect("place");
    let snap = board.snapshot();

    board.apply_pixel_event(0, 0, 2).expect("place");
    board.apply_pixel_event(1, 0, 4).expect("place");

    assert_eq!(snap.pixels(), &[1, UNSET]);
    assert_eq!(board.snapshot().pixels(), &[2, 4]);
}

#[test]
fn batch_applies_in_order_and_reports_rejections() {
    let board = BoardState::new(BoardGrid::blank(3, 3));
    let errors = board.apply_batch(&[change(0, 0, 5), change(9, 9, 1), change(0, 0, 6), change(1, 1, 2), change(1, 1, -1)]);

    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], BoardError::OutOfBounds { x: 9, y: 9, .. }));

    let snap = board.snapshot();
    assert_eq!(snap.pixel(0, 0), Some(6));
    assert_eq!(snap.pixel(1, 1), Some(UNSET));
    assert!(!snap.is_virgin(1, 1));
}

#[test]
fn online_count_can_be_set_and_cleared() {
    let board = BoardState::new(BoardGrid::blank(1, 1));
    board.set_online_count(321);
    assert_eq!(board.snapshot().online_count(), Some(321));
    board.clear_online_count();
    assert_eq!(board.online_count(), None);
}

#[test]
fn from_parts_checks_buffer_sizes() {
    let err = BoardGrid::from_parts(2, 2, vec![0; 4], vec![true; 3], vec![true; 4]).expect_err("short virgin map");
    assert_eq!(err, BoardError::SizeMismatch { what: "virgin map", expected: 4, actual: 3 });

    let grid = BoardGrid::from_parts(2, 1, vec![1, 2], vec![true, false], vec![false, true]).expect("valid");
    assert!(!grid.is_placeable(0, 0));
    assert!(grid.is_placeable(1, 0));
    assert!(!grid.is_virgin(1, 0));
}

#[test]
fn negative_coordinates_are_off_board() {
    let grid = BoardGrid::blank(2, 2);
    assert_eq!(grid.offset(-1, 0), None);
    assert_eq!(grid.pixel(0, -1), None);
    assert!(!grid.is_placeable(-3, -3));
}

#[test]
fn replace_swaps_in_new_generation() {
    let board = BoardState::new(BoardGrid::blank(1, 1));
    board.replace(BoardGrid::blank(5, 4));
    assert_eq!(board.dimensions(), (5, 4));
}
