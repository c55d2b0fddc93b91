//! OneBot v11 protocol types.
//!
//! - [`segment`] — typed message segments + CQ-code rendering
//! - [`event`] — message events and action (echo) responses
//! - [`action`] — outbound actions (`send_msg`, `send_group_forward_msg`, `get_msg`)

pub mod action;
pub mod event;
pub mod segment;

pub use action::{Action, ActionRequest, ForwardNode};
pub use event::{EchoResponse, MessageEvent, MessageKind, ReplyTarget, Sender};
pub use segment::Segment;

use serde_json::Value;

use crate::bus::types::InboundEvent;

/// Errors decoding a frame received from the platform.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid JSON frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed {kind} payload: {source}")]
    Payload {
        kind: &'static str,
        source: serde_json::Error,
    },
}

/// Classify a raw WebSocket frame.
///
/// Returns `Ok(None)` for frames the dispatcher has no use for (meta events,
/// notices, requests, responses to untagged actions).
pub fn parse_frame(raw: &str) -> Result<Option<InboundEvent>, FrameError> {
    let value: Value = serde_json::from_str(raw)?;

    if value.get("echo").is_some_and(|e| !e.is_null()) && value.get("status").is_some() {
        let echo = serde_json::from_value(value).map_err(|source| FrameError::Payload {
            kind: "echo",
            source,
        })?;
        return Ok(Some(InboundEvent::Echo(echo)));
    }

    match value.get("post_type").and_then(Value::as_str) {
        Some("message") => {
            let event = serde_json::from_value(value).map_err(|source| FrameError::Payload {
                kind: "message",
                source,
            })?;
            Ok(Some(InboundEvent::Message(event)))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_message_frame() {
        let raw = r#"{"post_type":"message","message_type":"private","message_id":1,
            "user_id":2,"sender":{"user_id":2,"nickname":"x"},
            "message":[{"type":"text","data":{"text":"!ask hi"}}],"raw_message":"!ask hi"}"#;
        match parse_frame(raw).unwrap() {
            Some(InboundEvent::Message(event)) => assert_eq!(event.message_id, 1),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_parse_echo_frame() {
        let raw = r#"{"status":"ok","retcode":0,"data":{"message_id":5},"echo":"gemini|1"}"#;
        match parse_frame(raw).unwrap() {
            Some(InboundEvent::Echo(echo)) => assert_eq!(echo.echo, "gemini|1"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_meta_event_ignored() {
        let raw = r#"{"post_type":"meta_event","meta_event_type":"heartbeat"}"#;
        assert!(parse_frame(raw).unwrap().is_none());
    }

    #[test]
    fn test_untagged_response_ignored() {
        let raw = r#"{"status":"ok","retcode":0,"data":{"message_id":5},"echo":null}"#;
        assert!(parse_frame(raw).unwrap().is_none());
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(parse_frame("{nope"), Err(FrameError::Json(_))));
    }

    #[test]
    fn test_malformed_message_payload() {
        let raw = r#"{"post_type":"message","message_id":"not-a-number"}"#;
        assert!(matches!(
            parse_frame(raw),
            Err(FrameError::Payload { kind: "message", .. })
        ));
    }
}
