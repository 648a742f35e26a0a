//! Frame Codec
//!
//! Encoding and decoding between [`Frame`]s and socket text.
//!
//! Both directions use plain JSON arrays:
//!
//! ```json
//! ["subscribe", "balances"]
//! ["balances", [{"broker": "OANDA", "balance": 1000}]]
//! ["Xy3kQ/0", null, [{"broker": "OANDA"}]]
//! ```

use serde_json::Value;

use crate::domain::frame::{Frame, InboundFrame};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Inbound payload was valid JSON but not an array.
    #[error("expected JSON array, got: {0}")]
    NotAnArray(String),

    /// Inbound array had no event name.
    #[error("empty message array")]
    EmptyArray,

    /// First element was not a string.
    #[error("event name must be a string, got: {0}")]
    InvalidEventName(String),
}

/// JSON array codec for the event socket.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Encode a frame as socket text.
    ///
    /// # Errors
    ///
    /// Returns an error if a payload cannot be serialized.
    pub fn encode(&self, frame: Frame) -> Result<String, CodecError> {
        Ok(serde_json::to_string(&frame.into_values())?)
    }

    /// Decode socket text into an event name and its arguments.
    ///
    /// # Errors
    ///
    /// Returns an error unless the text is a JSON array whose first element
    /// is a string.
    pub fn decode(&self, text: &str) -> Result<InboundFrame, CodecError> {
        let value: Value = serde_json::from_str(text.trim())?;

        let Value::Array(items) = value else {
            return Err(CodecError::NotAnArray(preview(text)));
        };

        let mut items = items.into_iter();
        match items.next() {
            None => Err(CodecError::EmptyArray),
            Some(Value::String(event)) => Ok(InboundFrame {
                event,
                args: items.collect(),
            }),
            Some(other) => Err(CodecError::InvalidEventName(other.to_string())),
        }
    }
}

/// First 50 characters, with `...` only when something was cut.
fn preview(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(50) {
        Some((end, _)) => format!("{}...", &trimmed[..end]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn encode_subscribe() {
        let codec = JsonCodec::new();
        let text = codec
            .encode(Frame::Subscribe {
                topic: "balances".to_string(),
            })
            .unwrap();
        assert_eq!(text, r#"["subscribe","balances"]"#);
    }

    #[test]
    fn encode_request() {
        let codec = JsonCodec::new();
        let text = codec
            .encode(Frame::Request {
                topic: "orders".to_string(),
                request_id: "Xy3kQ/0".to_string(),
            })
            .unwrap();
        assert_eq!(text, r#"["request","orders","Xy3kQ/0"]"#);
    }

    #[test]
    fn decode_push() {
        let codec = JsonCodec::new();
        let frame = codec
            .decode(r#"["balances", [{"broker": "OANDA", "balance": 1000}]]"#)
            .unwrap();
        assert_eq!(frame.event, "balances");
        assert_eq!(frame.args, vec![json!([{"broker": "OANDA", "balance": 1000}])]);
    }

    #[test]
    fn decode_response() {
        let codec = JsonCodec::new();
        let frame = codec.decode(r#"["Xy3kQ/0", null, {"id": "o1"}]"#).unwrap();
        assert_eq!(frame.event, "Xy3kQ/0");
        assert_eq!(frame.args, vec![Value::Null, json!({"id": "o1"})]);
    }

    #[test]
    fn decode_bare_event() {
        let codec = JsonCodec::new();
        let frame = codec.decode(r#"["heartbeat"]"#).unwrap();
        assert_eq!(frame.event, "heartbeat");
        assert!(frame.args.is_empty());
    }

    #[test]
    fn decode_invalid_json() {
        let codec = JsonCodec::new();
        assert!(matches!(codec.decode("not json"), Err(CodecError::Json(_))));
    }

    #[test]
    fn decode_object_is_rejected() {
        let codec = JsonCodec::new();
        assert!(matches!(
            codec.decode(r#"{"T": "success"}"#),
            Err(CodecError::NotAnArray(_))
        ));
    }

    #[test]
    fn short_preview_is_not_marked_truncated() {
        let codec = JsonCodec::new();
        let err = codec.decode(r#"{"T": "success"}"#).unwrap_err();
        assert!(matches!(err, CodecError::NotAnArray(ref text) if text == r#"{"T": "success"}"#));
    }

    #[test]
    fn long_preview_is_cut_at_fifty_chars() {
        let long = format!("\"{}\"", "x".repeat(80));
        match JsonCodec::new().decode(&long) {
            Err(CodecError::NotAnArray(text)) => {
                assert_eq!(text.chars().count(), 53);
                assert!(text.ends_with("..."));
            }
            other => panic!("expected NotAnArray, got {other:?}"),
        }
    }

    #[test]
    fn decode_empty_array() {
        let codec = JsonCodec::new();
        assert!(matches!(codec.decode("[]"), Err(CodecError::EmptyArray)));
    }

    #[test]
    fn decode_non_string_event() {
        let codec = JsonCodec::new();
        assert!(matches!(
            codec.decode("[42, 1]"),
            Err(CodecError::InvalidEventName(_))
        ));
    }
}
