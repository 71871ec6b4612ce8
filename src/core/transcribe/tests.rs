//! Frame classification tests for the Transcribe upstream leg.
//!
//! These exercise the decode-and-classify pipeline with hand-built frames,
//! the same path the connection task runs on every inbound message.

use bytes::Bytes;

use super::client::{FrameDisposition, classify_frame};
use crate::core::eventstream::{
    self, Frame, HEADER_EVENT_TYPE, HEADER_EXCEPTION_TYPE, HEADER_MESSAGE_TYPE, HeaderValue,
    MESSAGE_TYPE_EVENT, MESSAGE_TYPE_EXCEPTION,
};
use crate::errors::RelayError;

fn transcript_frame(payload: &str) -> Frame {
    Frame::new(
        vec![
            (
                HEADER_MESSAGE_TYPE.to_string(),
                HeaderValue::String(MESSAGE_TYPE_EVENT.to_string()),
            ),
            (
                HEADER_EVENT_TYPE.to_string(),
                HeaderValue::String("TranscriptEvent".to_string()),
            ),
        ],
        Bytes::copy_from_slice(payload.as_bytes()),
    )
}

fn exception_frame(kind: &str, payload: &str) -> Frame {
    Frame::new(
        vec![
            (
                HEADER_MESSAGE_TYPE.to_string(),
                HeaderValue::String(MESSAGE_TYPE_EXCEPTION.to_string()),
            ),
            (
                HEADER_EXCEPTION_TYPE.to_string(),
                HeaderValue::String(kind.to_string()),
            ),
        ],
        Bytes::copy_from_slice(payload.as_bytes()),
    )
}

#[test]
fn test_transcript_extracted_from_event_frame() {
    let frame = transcript_frame(
        r#"{"Transcript":{"Results":[{"Alternatives":[{"Transcript":"hello"}]}]}}"#,
    );
    assert_eq!(
        classify_frame(&frame).unwrap(),
        FrameDisposition::Transcript("hello".to_string())
    );
}

#[test]
fn test_empty_results_produce_no_transcript() {
    let frame = transcript_frame(r#"{"Transcript":{"Results":[]}}"#);
    assert_eq!(classify_frame(&frame).unwrap(), FrameDisposition::Ignore);
}

#[test]
fn test_first_alternative_wins() {
    let frame = transcript_frame(
        r#"{"Transcript":{"Results":[{"Alternatives":[{"Transcript":"right"},{"Transcript":"wrong"}]}]}}"#,
    );
    assert_eq!(
        classify_frame(&frame).unwrap(),
        FrameDisposition::Transcript("right".to_string())
    );
}

#[test]
fn test_exception_frame_carries_upstream_message() {
    let frame = exception_frame(
        "BadRequestException",
        r#"{"Message":"A complete signal was sent without the preceding empty frame."}"#,
    );
    let err = classify_frame(&frame).unwrap_err();
    match err {
        RelayError::UpstreamException(msg) => {
            assert!(msg.contains("BadRequestException"));
            assert!(msg.contains("complete signal"));
        }
        other => panic!("Expected UpstreamException, got {other:?}"),
    }
}

#[test]
fn test_exception_with_unparseable_payload_falls_back_to_raw_text() {
    let frame = exception_frame("InternalFailureException", "not json at all");
    let err = classify_frame(&frame).unwrap_err();
    match err {
        RelayError::UpstreamException(msg) => {
            assert!(msg.contains("InternalFailureException"));
            assert!(msg.contains("not json at all"));
        }
        other => panic!("Expected UpstreamException, got {other:?}"),
    }
}

#[test]
fn test_malformed_transcript_json_skipped() {
    // Framing is intact, only this event's body is unusable; the session
    // keeps streaming.
    let frame = transcript_frame(r#"{"Transcript": [broken"#);
    assert_eq!(classify_frame(&frame).unwrap(), FrameDisposition::Ignore);
}

#[test]
fn test_unrecognized_message_type_ignored() {
    let frame = Frame::new(
        vec![(
            HEADER_MESSAGE_TYPE.to_string(),
            HeaderValue::String("ping".to_string()),
        )],
        Bytes::new(),
    );
    assert_eq!(classify_frame(&frame).unwrap(), FrameDisposition::Ignore);
}

#[test]
fn test_frame_without_message_type_ignored() {
    let frame = Frame::new(Vec::new(), Bytes::from_static(b"{}"));
    assert_eq!(classify_frame(&frame).unwrap(), FrameDisposition::Ignore);
}

#[test]
fn test_decode_then_classify_round_trip() {
    // The full inbound path: wire bytes through the codec, then classification.
    let frame = transcript_frame(
        r#"{"Transcript":{"Results":[{"IsPartial":true,"Alternatives":[{"Transcript":"testing one two"}]}]}}"#,
    );
    let wire = eventstream::encode(&frame);
    let decoded = eventstream::decode(&wire).unwrap();
    assert_eq!(
        classify_frame(&decoded).unwrap(),
        FrameDisposition::Transcript("testing one two".to_string())
    );
}
