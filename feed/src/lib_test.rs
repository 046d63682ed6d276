use super::*;

#[test]
fn decodes_pixel_batch_in_order() {
    let raw = br#"{"type":"pixel","pixels":[{"x":1,"y":2,"color":3},{"x":4,"y":5,"color":6}]}"#;
    let message = decode_message(raw).expect("pixel message should decode");
    assert_eq!(
        message,
        FeedMessage::Pixel {
            pixels: vec![PixelChange { x: 1, y: 2, color: 3 }, PixelChange { x: 4, y: 5, color: 6 }],
        }
    );
}

#[test]
fn accepts_color_index_field_name() {
    let raw = br#"{"type":"pixel","pixels":[{"x":0,"y":0,"color_index":9}]}"#;
    let FeedMessage::Pixel { pixels } = decode_message(raw).expect("decode") else {
        panic!("expected pixel message");
    };
    assert_eq!(pixels[0].change(), ColorChange::Place(9));
}

#[test]
fn ignores_extra_pixel_fields() {
    let raw = br#"{"type":"pixel","pixels":[{"x":7,"y":8,"color":2,"oldColor":5}]}"#;
    let FeedMessage::Pixel { pixels } = decode_message(raw).expect("decode") else {
        panic!("expected pixel message");
    };
    assert_eq!(pixels, vec![PixelChange { x: 7, y: 8, color: 2 }]);
}

#[test]
fn decodes_users_count() {
    let message = decode_message(br#"{"type":"users","count":1234}"#).expect("decode");
    assert_eq!(message, FeedMessage::Users { count: 1234 });
}

#[test]
fn unknown_type_decodes_to_unknown() {
    let message = decode_message(br#"{"type":"chat_message","message":{"text":"hi"}}"#).expect("decode");
    assert_eq!(message, FeedMessage::Unknown);
}

#[test]
fn missing_type_is_an_error() {
    let err = decode_message(br#"{"count":3}"#).expect_err("message without type should fail");
    assert!(matches!(err, CodecError::Json(_)));
}

#[test]
fn malformed_known_message_is_an_error() {
    assert!(decode_message(br#"{"type":"users","count":"many"}"#).is_err());
    assert!(decode_message(b"not json").is_err());
}

#[test]
fn negative_or_cleared_color_clears_the_cell() {
    assert_eq!(PixelChange { x: 0, y: 0, color: -1 }.change(), ColorChange::Clear);
    assert_eq!(PixelChange { x: 0, y: 0, color: CLEARED_COLOR }.change(), ColorChange::Clear);
    assert_eq!(PixelChange { x: 0, y: 0, color: 0 }.change(), ColorChange::Place(0));
    assert_eq!(PixelChange { x: 0, y: 0, color: 254 }.change(), ColorChange::Place(254));
}

#[test]
fn color_above_cleared_marker_is_invalid() {
    assert_eq!(PixelChange { x: 0, y: 0, color: 256 }.change(), ColorChange::Invalid(256));
    assert_eq!(PixelChange { x: 0, y: 0, color: 300 }.change(), ColorChange::Invalid(300));
}

#[test]
fn encoded_message_decodes_back() {
    let message = FeedMessage::Users { count: 42 };
    let bytes = encode_message(&message);
    assert_eq!(decode_message(&bytes).expect("decode"), message);
}
