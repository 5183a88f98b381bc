//! Unit tests for the NDJSON command codec.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use peerlink::protocol::codec::{decode_frame, encode_frame, encode_frame_within, CommandCodec};
use peerlink::protocol::{Command, CommandRequest, CommandResponse, ResponseBody};
use peerlink::AppError;

#[test]
fn decodes_one_line_per_frame() {
    let mut codec = CommandCodec::new();
    let mut buf = BytesMut::from("first\nsecond\n");

    let first = codec.decode(&mut buf).expect("decode first");
    let second = codec.decode(&mut buf).expect("decode second");
    let none = codec.decode(&mut buf).expect("decode empty");

    assert_eq!(first.as_deref(), Some("first"));
    assert_eq!(second.as_deref(), Some("second"));
    assert!(none.is_none());
}

#[test]
fn partial_line_is_buffered_until_newline() {
    let mut codec = CommandCodec::new();
    let mut buf = BytesMut::from("{\"request\":");

    assert!(codec.decode(&mut buf).expect("decode partial").is_none());

    buf.extend_from_slice(b"42}\n");
    let line = codec.decode(&mut buf).expect("decode completed");
    assert_eq!(line.as_deref(), Some("{\"request\":42}"));
}

#[test]
fn line_over_limit_is_rejected() {
    let mut codec = CommandCodec::with_max_frame_bytes(8);
    let mut buf = BytesMut::from("0123456789abcdef\n");

    let err = codec.decode(&mut buf).expect_err("line should be too long");
    assert!(
        matches!(err, AppError::Codec(ref msg) if msg.contains("frame too long")),
        "unexpected error: {err}"
    );
}

#[test]
fn encoded_frame_is_one_newline_terminated_line() {
    let mut codec = CommandCodec::new();
    let command = Command::from(CommandRequest::exit());
    let mut dst = BytesMut::new();

    codec.encode(command.clone(), &mut dst).expect("encode");

    let text = std::str::from_utf8(&dst).expect("utf-8 frame");
    assert!(text.ends_with('\n'));
    assert_eq!(text.matches('\n').count(), 1);

    let decoded = decode_frame(text.trim_end()).expect("decode frame");
    assert_eq!(decoded, Some(command));
}

#[test]
fn encoder_refuses_frames_over_limit() {
    let mut codec = CommandCodec::with_max_frame_bytes(32);
    let command = Command::from(CommandRequest::exit());
    let mut dst = BytesMut::new();

    let err = codec.encode(command.clone(), &mut dst).expect_err("frame too long");
    assert!(matches!(err, AppError::Codec(_)));
    assert!(dst.is_empty());

    assert!(matches!(
        encode_frame_within(&command, 32),
        Err(AppError::Codec(_))
    ));
    let line = encode_frame_within(&command, 1024).expect("fits");
    assert_eq!(line, encode_frame(&command).expect("encode"));
}

#[test]
fn blank_line_decodes_to_nothing() {
    assert!(decode_frame("").expect("empty").is_none());
    assert!(decode_frame("   \t").expect("whitespace").is_none());
}

#[test]
fn malformed_frame_is_a_codec_error() {
    let err = decode_frame("{not json").expect_err("should fail");
    assert!(matches!(err, AppError::Codec(_)));

    let bad_id = r#"{"request":{"message_id":"nope","body":{"op":"exit"}}}"#;
    assert!(matches!(decode_frame(bad_id), Err(AppError::Codec(_))));
}

#[test]
fn response_frame_carries_request_id() {
    let request = CommandRequest::exit();
    let response = Command::from(CommandResponse::new(request.message_id, ResponseBody::Exit));

    let line = encode_frame(&response).expect("encode");
    let json: serde_json::Value = serde_json::from_str(&line).expect("valid json");

    assert_eq!(
        json["response"]["message_id"],
        serde_json::Value::String(request.message_id.to_string())
    );
    assert_eq!(json["response"]["body"]["op"], "exit");
}
