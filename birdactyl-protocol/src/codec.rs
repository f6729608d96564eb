//! JSON codec for console frames
//!
//! Every WebSocket text message carries exactly one JSON object with a
//! `type` discriminator.

use crate::messages::{ClientFrame, ServerFrame};

/// Maximum accepted text frame (1 MB). Console lines are short; anything
/// larger is a misbehaving peer.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Frame discriminators this client understands
const KNOWN_TYPES: [&str; 4] = ["console", "stats", "status", "error"];

/// Protocol codec error
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown frame type: {0}")]
    UnknownType(String),

    #[error("Frame has no type discriminator")]
    MissingType,

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },
}

impl CodecError {
    /// Unknown frame types are expected from newer panels and are not faults
    pub fn is_forward_compatible(&self) -> bool {
        matches!(self, CodecError::UnknownType(_))
    }
}

/// Encode a client frame as a WebSocket text payload
pub fn encode_client_frame(frame: &ClientFrame) -> Result<String, CodecError> {
    Ok(serde_json::to_string(frame)?)
}

/// Decode a WebSocket text payload into a server frame
pub fn decode_server_frame(text: &str) -> Result<ServerFrame, CodecError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge {
            size: text.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    match serde_json::from_str::<ServerFrame>(text) {
        Ok(frame) => Ok(frame),
        Err(e) => {
            // Tell apart "newer frame type" from "broken frame" for logging
            let value: serde_json::Value = serde_json::from_str(text)?;
            match value.get("type").and_then(|t| t.as_str()) {
                None => Err(CodecError::MissingType),
                Some(kind) if !KNOWN_TYPES.contains(&kind) => {
                    Err(CodecError::UnknownType(kind.to_string()))
                }
                Some(_) => Err(CodecError::Json(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ServerStatus;

    #[test]
    fn test_encode_command() {
        let frame = ClientFrame::command("stop").unwrap();
        let text = encode_client_frame(&frame).unwrap();
        assert_eq!(text, r#"{"type":"command","command":"stop"}"#);
    }

    #[test]
    fn test_decode_status() {
        let frame = decode_server_frame(r#"{"type":"status","status":"running"}"#).unwrap();
        assert_eq!(
            frame,
            ServerFrame::Status {
                status: ServerStatus::Running
            }
        );
    }

    #[test]
    fn test_decode_unknown_type() {
        let err = decode_server_frame(r#"{"type":"players","online":3}"#).unwrap_err();
        assert!(matches!(err, CodecError::UnknownType(ref t) if t == "players"));
        assert!(err.is_forward_compatible());
    }

    #[test]
    fn test_decode_missing_type() {
        let err = decode_server_frame(r#"{"line":"hello"}"#).unwrap_err();
        assert!(matches!(err, CodecError::MissingType));
        assert!(!err.is_forward_compatible());
    }

    #[test]
    fn test_decode_not_json() {
        let err = decode_server_frame("[12:00:00 INFO]: plain text").unwrap_err();
        assert!(matches!(err, CodecError::Json(_)));
    }

    #[test]
    fn test_decode_known_type_bad_payload() {
        let err = decode_server_frame(r#"{"type":"status","status":"melting"}"#).unwrap_err();
        assert!(matches!(err, CodecError::Json(_)));
    }

    #[test]
    fn test_decode_too_large() {
        let text = format!(
            r#"{{"type":"console","line":"{}"}}"#,
            "x".repeat(MAX_FRAME_SIZE)
        );
        let err = decode_server_frame(&text).unwrap_err();
        assert!(matches!(err, CodecError::FrameTooLarge { .. }));
    }
}
